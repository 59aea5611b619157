//! Plan generation: submit a profile, then race the shared push-event stream
//! against a bounded status poll until one of them resolves the task.
//!
//! ```text
//! subscribe ─> enqueue ──┬─ event path: completed event for our task
//!                        └─ poll path:  get_status every `poll_interval`,
//!                                       at most `max_attempts` times
//!                first to finish wins ─> unsubscribe (exactly once)
//! ```
//!
//! Transport failures never escape `generate`; they become a
//! [`GenerationOutcome`] the caller turns into a notification.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use nutri_api::models::{ClinicalReport, TaskStatus, UserProfile, WeeklyPlan};
use nutri_api::{AgentEvent, GenerationClient, Subscription};

/// Poll budget and pacing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorConfig {
    /// Status reads before giving up.
    pub max_attempts: u32,
    /// Pause between status reads.
    pub poll_interval: Duration,
    /// Pause before re-reading the persisted plan when it is not visible yet.
    pub refetch_delay: Duration,
}

impl OrchestratorConfig {
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;
    pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(2000);
    pub const DEFAULT_REFETCH_DELAY: Duration = Duration::from_millis(500);
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_attempts: Self::DEFAULT_MAX_ATTEMPTS,
            poll_interval: Self::DEFAULT_POLL_INTERVAL,
            refetch_delay: Self::DEFAULT_REFETCH_DELAY,
        }
    }
}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// Which channel resolved the task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Event,
    Poll,
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Event => f.write_str("event"),
            Self::Poll => f.write_str("poll"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedPlan {
    pub task_id: String,
    pub weekly_plan: WeeklyPlan,
    /// Absent when report generation failed but the plan succeeded.
    pub clinical_report: Option<ClinicalReport>,
    pub resolved_via: Resolution,
}

/// Result of a single `generate` call.
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationOutcome {
    Completed(GeneratedPlan),
    /// The task could not be submitted. Nothing was generated.
    SubmissionFailed { reason: String },
    /// The worker reported a failed or revoked task.
    TaskFailed { task_id: String, status: TaskStatus },
    /// The task succeeded but no plan could be obtained.
    MissingPlan { task_id: String },
    /// The poll budget ran out without a resolution.
    TimedOut { task_id: String, attempts: u32 },
}

impl GenerationOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }

    pub fn into_plan(self) -> Option<GeneratedPlan> {
        match self {
            Self::Completed(plan) => Some(plan),
            _ => None,
        }
    }

    /// Text shown to the user for a failed generation.
    pub fn failure_message(&self) -> Option<&'static str> {
        match self {
            Self::Completed(_) => None,
            Self::SubmissionFailed { .. } => Some("Failed to enqueue plan generation."),
            Self::TaskFailed { .. } | Self::MissingPlan { .. } | Self::TimedOut { .. } => {
                Some("Failed to generate plan. Please try again.")
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Event matching
// ---------------------------------------------------------------------------

/// Picks this task's completion out of the shared stream.
///
/// A completed event belongs to us when its payload names our task id, or
/// when it carries our correlation id (either as `correlation_id` or as the
/// payload task id).
#[derive(Debug, Clone, Copy)]
struct EventMatcher<'a> {
    task_id: &'a str,
    correlation_id: Option<&'a str>,
}

impl EventMatcher<'_> {
    fn matches(&self, event: &AgentEvent) -> bool {
        if !event.is_completed() {
            return false;
        }
        let payload_id = event.task_id();
        if payload_id == Some(self.task_id) {
            return true;
        }
        match self.correlation_id {
            Some(ours) => event.correlation_id.as_deref() == Some(ours) || payload_id == Some(ours),
            None => false,
        }
    }
}

/// Wait for our completion event. Never resolves if the stream closes, so
/// the poll path stays in charge.
async fn wait_for_completion(events: &mut Subscription, matcher: EventMatcher<'_>) -> AgentEvent {
    while let Some(frame) = events.next().await {
        let Some(event) = frame.agent_event() else {
            continue;
        };
        if matcher.matches(&event) {
            return event;
        }
    }
    std::future::pending().await
}

// ---------------------------------------------------------------------------
// Generator
// ---------------------------------------------------------------------------

pub struct PlanGenerator {
    client: Arc<dyn GenerationClient>,
    config: OrchestratorConfig,
}

impl fmt::Debug for PlanGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlanGenerator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl PlanGenerator {
    pub fn new(client: Arc<dyn GenerationClient>) -> Self {
        Self::with_config(client, OrchestratorConfig::default())
    }

    /// `max_attempts` is raised to 1 so the poll path always gets one read.
    pub fn with_config(client: Arc<dyn GenerationClient>, config: OrchestratorConfig) -> Self {
        let config = OrchestratorConfig {
            max_attempts: config.max_attempts.max(1),
            ..config
        };
        Self { client, config }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Generate a weekly plan and clinical report for `profile`.
    ///
    /// The event subscription is opened before submission so an early
    /// completion cannot be missed, and is released exactly once on every
    /// exit path.
    pub async fn generate(&self, profile: &UserProfile) -> GenerationOutcome {
        let correlation_id = Uuid::new_v4().to_string();
        let mut events = self.client.subscribe_events();

        let outcome = self.run(profile, &correlation_id, &mut events).await;

        events.unsubscribe();
        outcome
    }

    async fn run(
        &self,
        profile: &UserProfile,
        correlation_id: &str,
        events: &mut Subscription,
    ) -> GenerationOutcome {
        let task = match self.client.enqueue(profile, Some(correlation_id)).await {
            Ok(task) => task,
            Err(e) => {
                tracing::error!(profile_id = %profile.id, error = %e, "plan submission failed");
                return GenerationOutcome::SubmissionFailed {
                    reason: e.to_string(),
                };
            }
        };

        let task_id = task.task_id.as_str();
        let matcher = EventMatcher {
            task_id,
            correlation_id: Some(task.correlation_id.as_deref().unwrap_or(correlation_id)),
        };
        tracing::info!(
            task_id = %task_id,
            profile_id = %profile.id,
            status = %task.status,
            "plan generation submitted"
        );

        tokio::select! {
            biased;

            event = wait_for_completion(events, matcher) => {
                tracing::info!(task_id = %task_id, "plan generation completed via event");
                let payload = event.payload.unwrap_or_default();
                match payload.plan {
                    Some(plan) => GenerationOutcome::Completed(GeneratedPlan {
                        task_id: task_id.to_owned(),
                        weekly_plan: plan,
                        clinical_report: payload.clinical_report,
                        resolved_via: Resolution::Event,
                    }),
                    None => {
                        self.reconcile(task_id, &profile.id, None, payload.clinical_report, Resolution::Event)
                            .await
                    }
                }
            }

            outcome = self.poll(task_id, &profile.id) => outcome,
        }
    }

    /// Bounded status poll. Sleeps only between attempts, so a timeout
    /// happens after exactly `max_attempts` status reads.
    async fn poll(&self, task_id: &str, profile_id: &str) -> GenerationOutcome {
        let max_attempts = self.config.max_attempts;

        for attempt in 1..=max_attempts {
            match self.client.get_status(task_id).await {
                Ok(status) if status.status == TaskStatus::Success => {
                    tracing::info!(task_id = %task_id, attempt, "plan generation completed via poll");
                    return self
                        .reconcile(
                            task_id,
                            profile_id,
                            status.plan,
                            status.clinical_report,
                            Resolution::Poll,
                        )
                        .await;
                }
                Ok(status) if status.status.is_failure() => {
                    tracing::warn!(task_id = %task_id, status = %status.status, "plan generation failed");
                    return GenerationOutcome::TaskFailed {
                        task_id: task_id.to_owned(),
                        status: status.status,
                    };
                }
                Ok(status) => {
                    tracing::debug!(task_id = %task_id, attempt, status = %status.status, "plan task not ready");
                }
                Err(e) => {
                    tracing::warn!(task_id = %task_id, attempt, error = %e, "status poll failed");
                }
            }

            if attempt < max_attempts {
                tokio::time::sleep(self.config.poll_interval).await;
            }
        }

        tracing::warn!(task_id = %task_id, attempts = max_attempts, "plan generation timed out");
        GenerationOutcome::TimedOut {
            task_id: task_id.to_owned(),
            attempts: max_attempts,
        }
    }

    /// Prefer the persisted plan and report over inline values.
    ///
    /// The store may lag the task status, so a missing plan is re-read once
    /// after `refetch_delay` before falling back to the inline copy.
    async fn reconcile(
        &self,
        task_id: &str,
        profile_id: &str,
        inline_plan: Option<WeeklyPlan>,
        inline_report: Option<ClinicalReport>,
        resolved_via: Resolution,
    ) -> GenerationOutcome {
        let (mut plan, mut report) = self.fetch_persisted(profile_id).await;
        if plan.is_none() {
            tracing::debug!(task_id = %task_id, "persisted plan not visible yet, re-reading");
            tokio::time::sleep(self.config.refetch_delay).await;
            let (late_plan, late_report) = self.fetch_persisted(profile_id).await;
            plan = late_plan;
            report = late_report.or(report);
        }

        let Some(weekly_plan) = plan.or(inline_plan) else {
            tracing::warn!(task_id = %task_id, "task succeeded without a plan");
            return GenerationOutcome::MissingPlan {
                task_id: task_id.to_owned(),
            };
        };

        GenerationOutcome::Completed(GeneratedPlan {
            task_id: task_id.to_owned(),
            weekly_plan,
            clinical_report: report.or(inline_report),
            resolved_via,
        })
    }

    async fn fetch_persisted(&self, profile_id: &str) -> (Option<WeeklyPlan>, Option<ClinicalReport>) {
        let (plan, report) = tokio::join!(
            self.client.fetch_latest_plan(profile_id),
            self.client.fetch_latest_report(profile_id),
        );
        let plan = plan.unwrap_or_else(|e| {
            tracing::warn!(profile_id = %profile_id, error = %e, "failed to read latest plan");
            None
        });
        let report = report.unwrap_or_else(|e| {
            tracing::warn!(profile_id = %profile_id, error = %e, "failed to read latest report");
            None
        });
        (plan, report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nutri_api::events::EventPayload;

    fn completed(task_id: &str, correlation_id: Option<&str>) -> AgentEvent {
        AgentEvent::completed(task_id, correlation_id.map(str::to_owned), None, None)
    }

    #[test]
    fn matcher_requires_completed_event() {
        let m = EventMatcher {
            task_id: "T1",
            correlation_id: None,
        };
        let mut started = completed("T1", None);
        started.event = AgentEvent::STARTED.to_owned();
        assert!(!m.matches(&started));
        assert!(m.matches(&completed("T1", None)));
    }

    #[test]
    fn matcher_ignores_other_tasks() {
        let m = EventMatcher {
            task_id: "T1",
            correlation_id: Some("c1"),
        };
        assert!(!m.matches(&completed("T2", None)));
        assert!(!m.matches(&completed("T2", Some("c2"))));
    }

    #[test]
    fn matcher_accepts_correlation_id() {
        let m = EventMatcher {
            task_id: "T1",
            correlation_id: Some("c1"),
        };
        assert!(m.matches(&completed("celery-9", Some("c1"))));
        // Payload task id carrying the correlation id.
        assert!(m.matches(&completed("c1", None)));
    }

    #[test]
    fn matcher_tolerates_missing_payload() {
        let m = EventMatcher {
            task_id: "T1",
            correlation_id: None,
        };
        let mut event = completed("T1", None);
        event.payload = None;
        assert!(!m.matches(&event));
        event.payload = Some(EventPayload::default());
        assert!(!m.matches(&event));
    }

    #[test]
    fn failure_messages() {
        let submit = GenerationOutcome::SubmissionFailed {
            reason: "down".into(),
        };
        assert_eq!(submit.failure_message(), Some("Failed to enqueue plan generation."));
        let timeout = GenerationOutcome::TimedOut {
            task_id: "T1".into(),
            attempts: 10,
        };
        assert_eq!(
            timeout.failure_message(),
            Some("Failed to generate plan. Please try again.")
        );
        assert!(timeout.into_plan().is_none());
    }

    #[test]
    fn default_config_matches_documented_pacing() {
        let cfg = OrchestratorConfig::default();
        assert_eq!(cfg.max_attempts, 10);
        assert_eq!(cfg.poll_interval, Duration::from_secs(2));
        assert_eq!(cfg.refetch_delay, Duration::from_millis(500));
    }
}
