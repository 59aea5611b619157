//! Plan generation against a scripted client: event path, poll fallback,
//! timeout, and exactly-once release of the event subscription.

use std::sync::Arc;
use std::time::Duration;

use nutri_api::AgentEvent;
use nutri_api::models::{PlanTaskResponse, TaskStatus};
use nutri_core::orchestrator::{GenerationOutcome, OrchestratorConfig, PlanGenerator, Resolution};
use nutri_test_utils::{ScriptedClient, sample_profile, sample_report, task, uniform_week};

// ===========================================================================
// Helpers
// ===========================================================================

fn fast_config(max_attempts: u32) -> OrchestratorConfig {
    OrchestratorConfig {
        max_attempts,
        poll_interval: Duration::from_millis(5),
        refetch_delay: Duration::from_millis(1),
    }
}

fn generator(client: &Arc<ScriptedClient>, max_attempts: u32) -> PlanGenerator {
    PlanGenerator::with_config(client.clone(), fast_config(max_attempts))
}

fn success_with_inline(task_id: &str, plan_id: &str) -> PlanTaskResponse {
    PlanTaskResponse {
        plan: Some(uniform_week(plan_id)),
        clinical_report: Some(sample_report("inline-report")),
        ..task(task_id, TaskStatus::Success)
    }
}

/// The subscription was opened once and released once.
fn assert_released_once(client: &ScriptedClient) {
    assert_eq!(ScriptedClient::count(&client.subscribe_calls), 1);
    assert_eq!(client.bus().subscriber_count(), 0);
}

// ===========================================================================
// Event path
// ===========================================================================

#[tokio::test]
async fn completion_event_resolves_without_polling() {
    let event = AgentEvent::completed(
        "T1",
        None,
        Some(uniform_week("from-event")),
        Some(sample_report("event-report")),
    );
    let client = Arc::new(ScriptedClient::new().emit_on_enqueue(event));

    let outcome = generator(&client, 10).generate(&sample_profile()).await;

    let plan = outcome.into_plan().expect("completed");
    assert_eq!(plan.task_id, "T1");
    assert_eq!(plan.weekly_plan.id, "from-event");
    assert_eq!(plan.clinical_report.unwrap().id, "event-report");
    assert_eq!(plan.resolved_via, Resolution::Event);
    assert_eq!(ScriptedClient::count(&client.status_calls), 0);
    assert_released_once(&client);
}

#[tokio::test]
async fn events_for_other_tasks_are_ignored() {
    let foreign = AgentEvent::completed(
        "T-other",
        Some("someone-else".into()),
        Some(uniform_week("foreign")),
        None,
    );
    let mut started = AgentEvent::completed("T1", None, None, None);
    started.event = AgentEvent::STARTED.to_owned();

    let client = Arc::new(
        ScriptedClient::new()
            .emit_on_enqueue(foreign)
            .emit_on_enqueue(started)
            .with_status(task("T1", TaskStatus::Pending))
            .with_status(task("T1", TaskStatus::Success))
            .with_latest_plan(Some(uniform_week("persisted"))),
    );

    let outcome = generator(&client, 5).generate(&sample_profile()).await;

    let plan = outcome.into_plan().expect("completed");
    assert_eq!(plan.weekly_plan.id, "persisted");
    assert_eq!(plan.resolved_via, Resolution::Poll);
    assert_eq!(ScriptedClient::count(&client.status_calls), 2);
    assert_released_once(&client);
}

#[tokio::test]
async fn event_matched_by_correlation_id() {
    let client = Arc::new(
        ScriptedClient::new()
            .with_enqueue(PlanTaskResponse {
                correlation_id: Some("corr-9".into()),
                ..task("T1", TaskStatus::Queued)
            })
            .emit_on_enqueue(AgentEvent::completed(
                "worker-internal-id",
                Some("corr-9".into()),
                Some(uniform_week("by-correlation")),
                None,
            )),
    );

    let outcome = generator(&client, 5).generate(&sample_profile()).await;

    let plan = outcome.into_plan().expect("completed");
    assert_eq!(plan.weekly_plan.id, "by-correlation");
    assert_eq!(plan.resolved_via, Resolution::Event);
}

#[tokio::test]
async fn generated_correlation_id_is_sent_with_submission() {
    let client = Arc::new(ScriptedClient::new().with_status(success_with_inline("T1", "inline")));

    let _ = generator(&client, 3).generate(&sample_profile()).await;

    let sent = client.correlation_ids();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].as_deref().is_some_and(|id| !id.is_empty()));
}

#[tokio::test]
async fn event_arriving_mid_poll_wins() {
    let event = AgentEvent::completed("T1", None, Some(uniform_week("late-event")), None);
    let client = Arc::new(ScriptedClient::new().emit_on_status_call(2, event));

    let outcome = generator(&client, 10).generate(&sample_profile()).await;

    let plan = outcome.into_plan().expect("completed");
    assert_eq!(plan.weekly_plan.id, "late-event");
    assert_eq!(plan.resolved_via, Resolution::Event);
    assert_eq!(ScriptedClient::count(&client.status_calls), 2);
    assert_released_once(&client);
}

#[tokio::test]
async fn event_without_plan_reads_persisted_copy() {
    let client = Arc::new(
        ScriptedClient::new()
            .emit_on_enqueue(AgentEvent::completed("T1", None, None, None))
            .with_latest_plan(Some(uniform_week("persisted")))
            .with_latest_report(Some(sample_report("persisted-report"))),
    );

    let plan = generator(&client, 5)
        .generate(&sample_profile())
        .await
        .into_plan()
        .expect("completed");
    assert_eq!(plan.weekly_plan.id, "persisted");
    assert_eq!(plan.clinical_report.unwrap().id, "persisted-report");
    assert_eq!(plan.resolved_via, Resolution::Event);
}

#[tokio::test]
async fn both_paths_ready_resolves_once() {
    let client = Arc::new(
        ScriptedClient::new()
            .emit_on_enqueue(AgentEvent::completed("T1", None, Some(uniform_week("event")), None))
            .with_status(success_with_inline("T1", "inline"))
            .with_latest_plan(Some(uniform_week("persisted"))),
    );

    let outcome = generator(&client, 5).generate(&sample_profile()).await;

    assert!(outcome.is_completed());
    assert_released_once(&client);
}

// ===========================================================================
// Poll path
// ===========================================================================

#[tokio::test]
async fn poll_success_prefers_persisted_plan() {
    let client = Arc::new(
        ScriptedClient::new()
            .with_status(task("T1", TaskStatus::Pending))
            .with_status(success_with_inline("T1", "inline"))
            .with_latest_plan(Some(uniform_week("persisted")))
            .with_latest_report(Some(sample_report("persisted-report"))),
    );

    let plan = generator(&client, 10)
        .generate(&sample_profile())
        .await
        .into_plan()
        .expect("completed");

    assert_eq!(plan.weekly_plan.id, "persisted");
    assert_eq!(plan.clinical_report.unwrap().id, "persisted-report");
    assert_eq!(plan.resolved_via, Resolution::Poll);
    assert_eq!(ScriptedClient::count(&client.status_calls), 2);
    assert_eq!(ScriptedClient::count(&client.latest_plan_calls), 1);
    assert_released_once(&client);
}

#[tokio::test]
async fn lagging_store_is_read_twice() {
    let client = Arc::new(
        ScriptedClient::new()
            .with_status(success_with_inline("T1", "inline"))
            .with_latest_plan(None)
            .with_latest_plan(Some(uniform_week("late"))),
    );

    let plan = generator(&client, 3)
        .generate(&sample_profile())
        .await
        .into_plan()
        .expect("completed");

    assert_eq!(plan.weekly_plan.id, "late");
    assert_eq!(ScriptedClient::count(&client.latest_plan_calls), 2);
}

#[tokio::test]
async fn empty_store_falls_back_to_inline() {
    let client = Arc::new(
        ScriptedClient::new()
            .with_status(success_with_inline("T1", "inline"))
            .with_latest_plan(None),
    );

    let plan = generator(&client, 3)
        .generate(&sample_profile())
        .await
        .into_plan()
        .expect("completed");

    assert_eq!(plan.weekly_plan.id, "inline");
    assert_eq!(plan.clinical_report.unwrap().id, "inline-report");
    assert_eq!(ScriptedClient::count(&client.latest_plan_calls), 2);
}

#[tokio::test]
async fn success_without_any_plan_is_missing_plan() {
    let client = Arc::new(ScriptedClient::new().with_status(task("T1", TaskStatus::Success)));

    let outcome = generator(&client, 3).generate(&sample_profile()).await;

    assert_eq!(
        outcome,
        GenerationOutcome::MissingPlan {
            task_id: "T1".into()
        }
    );
    assert_released_once(&client);
}

#[tokio::test]
async fn failed_task_stops_polling() {
    let client = Arc::new(
        ScriptedClient::new()
            .with_status(task("T1", TaskStatus::Started))
            .with_status(task("T1", TaskStatus::Failure)),
    );

    let outcome = generator(&client, 10).generate(&sample_profile()).await;

    assert_eq!(
        outcome,
        GenerationOutcome::TaskFailed {
            task_id: "T1".into(),
            status: TaskStatus::Failure,
        }
    );
    assert_eq!(ScriptedClient::count(&client.status_calls), 2);
    assert_released_once(&client);
}

// ===========================================================================
// Failure modes
// ===========================================================================

#[tokio::test]
async fn pending_forever_times_out_after_exact_attempts() {
    let client = Arc::new(ScriptedClient::new());

    let outcome = generator(&client, 4).generate(&sample_profile()).await;

    assert_eq!(
        outcome,
        GenerationOutcome::TimedOut {
            task_id: "T1".into(),
            attempts: 4,
        }
    );
    assert_eq!(ScriptedClient::count(&client.status_calls), 4);
    assert_eq!(
        outcome.failure_message(),
        Some("Failed to generate plan. Please try again.")
    );
    assert_released_once(&client);
}

#[tokio::test]
async fn failed_polls_count_toward_budget() {
    let client = Arc::new(ScriptedClient::new().with_status_error("connection reset"));

    let outcome = generator(&client, 3).generate(&sample_profile()).await;

    assert!(matches!(outcome, GenerationOutcome::TimedOut { attempts: 3, .. }));
    assert_eq!(ScriptedClient::count(&client.status_calls), 3);
}

#[tokio::test]
async fn zero_attempt_budget_still_polls_once() {
    let client = Arc::new(
        ScriptedClient::new()
            .with_status(success_with_inline("T1", "inline"))
            .with_latest_plan(None),
    );

    let generator = generator(&client, 0);
    assert_eq!(generator.config().max_attempts, 1);

    let outcome = generator.generate(&sample_profile()).await;

    assert_eq!(outcome.into_plan().unwrap().weekly_plan.id, "inline");
    assert_eq!(ScriptedClient::count(&client.status_calls), 1);
}

#[tokio::test]
async fn transient_poll_error_does_not_abort() {
    let client = Arc::new(
        ScriptedClient::new()
            .with_status_error("502")
            .with_status(success_with_inline("T1", "inline"))
            .with_latest_plan(None),
    );

    let outcome = generator(&client, 5).generate(&sample_profile()).await;

    assert_eq!(outcome.into_plan().unwrap().weekly_plan.id, "inline");
    assert_eq!(ScriptedClient::count(&client.status_calls), 2);
}

#[tokio::test]
async fn submission_failure_is_terminal() {
    let client = Arc::new(ScriptedClient::new().failing_enqueue("HTTP 500 - boom"));

    let outcome = generator(&client, 5).generate(&sample_profile()).await;

    assert!(matches!(outcome, GenerationOutcome::SubmissionFailed { ref reason } if reason.contains("boom")));
    assert_eq!(
        outcome.failure_message(),
        Some("Failed to enqueue plan generation.")
    );
    assert_eq!(ScriptedClient::count(&client.status_calls), 0);
    assert_released_once(&client);
}
