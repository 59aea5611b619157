//! `nutri history` command: list a profile's past plans and reports.

use std::sync::Arc;

use anyhow::Result;

use nutri_api::GenerationClient;
use nutri_core::history::{PlanHistory, PlanHistoryStore};

/// Run the history command.
pub async fn run_history(client: Arc<dyn GenerationClient>, profile_id: &str) -> Result<()> {
    let store = PlanHistoryStore::new(client);
    let mut history = store.load(profile_id).await?;
    history.sort_newest_first();

    print!("{}", render_history(profile_id, &history));
    Ok(())
}

pub fn render_history(profile_id: &str, history: &PlanHistory) -> String {
    if history.is_empty() {
        return format!("No plans or reports for profile {profile_id}.\n");
    }

    let mut out = format!("Plans ({}):\n", history.plans.len());
    for plan in &history.plans {
        out.push_str(&format!(
            "  {}  {}  {:.0} kcal/day\n",
            display_time(&plan.generated_at),
            plan.id,
            plan.average_calories
        ));
    }
    out.push_str(&format!("Reports ({}):\n", history.reports.len()));
    for report in &history.reports {
        out.push_str(&format!(
            "  {}  {}  score {:.0}\n",
            display_time(&report.generated_at),
            report.id,
            report.overall_score
        ));
    }
    out
}

fn display_time(raw: &str) -> String {
    match chrono::DateTime::parse_from_rfc3339(raw) {
        Ok(ts) => ts.format("%Y-%m-%d %H:%M").to_string(),
        Err(_) if raw.is_empty() => "-".to_owned(),
        Err(_) => raw.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nutri_test_utils::{ScriptedClient, sample_report, uniform_week};

    #[test]
    fn empty_history_says_so() {
        let text = render_history("p1", &PlanHistory::default());
        assert_eq!(text, "No plans or reports for profile p1.\n");
    }

    #[test]
    fn plans_render_with_timestamp_and_average() {
        let mut history = PlanHistory {
            plans: vec![uniform_week("w1")],
            reports: vec![sample_report("r1")],
        };
        history.plans[0].generated_at = "garbled".into();

        let text = render_history("p1", &history);
        assert!(text.contains("Plans (1):"));
        assert!(text.contains("garbled  w1  2000 kcal/day"), "{text}");
        assert!(text.contains("Reports (1):"));
    }

    #[tokio::test]
    async fn failed_load_is_an_error() {
        let client = Arc::new(
            ScriptedClient::new()
                .with_history(vec![uniform_week("w1")], Vec::new())
                .failing_reports("HTTP 500"),
        );

        let err = run_history(client, "profile-1").await.unwrap_err();
        assert!(err.to_string().contains("profile-1"), "{err}");
    }
}
