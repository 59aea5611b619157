//! Read-side plan and report history for a profile.

use std::cmp::Reverse;
use std::sync::Arc;

use chrono::{DateTime, FixedOffset};

use nutri_api::models::{ClinicalReport, WeeklyPlan};
use nutri_api::{ClientError, GenerationClient};

/// Plans and reports for one profile.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlanHistory {
    pub plans: Vec<WeeklyPlan>,
    pub reports: Vec<ClinicalReport>,
}

impl PlanHistory {
    pub fn is_empty(&self) -> bool {
        self.plans.is_empty() && self.reports.is_empty()
    }

    /// Order both lists by `generatedAt`, newest first. Entries whose
    /// timestamp does not parse as RFC 3339 go last, in their original order.
    pub fn sort_newest_first(&mut self) {
        self.plans
            .sort_by_key(|p| Reverse(parse_timestamp(&p.generated_at)));
        self.reports
            .sort_by_key(|r| Reverse(parse_timestamp(&r.generated_at)));
    }
}

fn parse_timestamp(raw: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(raw).ok()
}

/// Either collection failed to load; neither is shown.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("failed to load history for profile {profile_id}")]
pub struct HistoryLoadError {
    pub profile_id: String,
    #[source]
    pub source: ClientError,
}

pub struct PlanHistoryStore {
    client: Arc<dyn GenerationClient>,
}

impl std::fmt::Debug for PlanHistoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlanHistoryStore").finish_non_exhaustive()
    }
}

impl PlanHistoryStore {
    pub fn new(client: Arc<dyn GenerationClient>) -> Self {
        Self { client }
    }

    /// Fetch plans and reports concurrently. Both succeed or the whole load
    /// fails.
    pub async fn load(&self, profile_id: &str) -> Result<PlanHistory, HistoryLoadError> {
        let fetched = futures::try_join!(
            self.client.fetch_plans(profile_id),
            self.client.fetch_reports(profile_id),
        );

        match fetched {
            Ok((plans, reports)) => {
                tracing::debug!(
                    profile_id = %profile_id,
                    plans = plans.len(),
                    reports = reports.len(),
                    "history loaded"
                );
                Ok(PlanHistory { plans, reports })
            }
            Err(source) => {
                tracing::warn!(profile_id = %profile_id, error = %source, "history load failed");
                Err(HistoryLoadError {
                    profile_id: profile_id.to_owned(),
                    source,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan(id: &str, at: &str) -> WeeklyPlan {
        WeeklyPlan {
            id: id.into(),
            generated_at: at.into(),
            ..WeeklyPlan::default()
        }
    }

    #[test]
    fn sorts_newest_first_with_unparseable_last() {
        let mut history = PlanHistory {
            plans: vec![
                plan("old", "2026-01-01T00:00:00Z"),
                plan("junk", "last tuesday"),
                plan("new", "2026-02-01T09:30:00+01:00"),
                plan("mid", "2026-01-15T00:00:00Z"),
            ],
            reports: Vec::new(),
        };
        history.sort_newest_first();
        let ids: Vec<_> = history.plans.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, ["new", "mid", "old", "junk"]);
    }

    #[test]
    fn empty_history() {
        assert!(PlanHistory::default().is_empty());
    }
}
