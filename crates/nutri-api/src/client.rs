//! Client traits and the HTTP implementation.
//!
//! The orchestrator and history store only see [`GenerationClient`]; tests
//! substitute an in-memory implementation.

use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;

use crate::config::ApiConfig;
use crate::error::ClientError;
use crate::events::{EventBus, Subscription};
use crate::models::{
    ClinicalReport, Language, MealAnalysisRequest, MealItem, MealLogRequest, PlanRecord,
    PlanRequest, PlanTaskResponse, ReportRecord, UserProfile, WeeklyPlan,
};

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Submission, status, history, and push-event access for plan generation.
#[async_trait]
pub trait GenerationClient: Send + Sync {
    /// Submit a profile for generation.
    async fn enqueue(
        &self,
        profile: &UserProfile,
        correlation_id: Option<&str>,
    ) -> Result<PlanTaskResponse, ClientError>;

    /// Read the current state of a task. "Still pending" is a status value,
    /// not an error.
    async fn get_status(&self, task_id: &str) -> Result<PlanTaskResponse, ClientError>;

    /// Most recent persisted plan, or `None` when the profile has none yet.
    async fn fetch_latest_plan(&self, profile_id: &str)
    -> Result<Option<WeeklyPlan>, ClientError>;

    /// Most recent persisted report, or `None` when the profile has none yet.
    async fn fetch_latest_report(
        &self,
        profile_id: &str,
    ) -> Result<Option<ClinicalReport>, ClientError>;

    /// Every persisted plan for a profile, in store order.
    async fn fetch_plans(&self, profile_id: &str) -> Result<Vec<WeeklyPlan>, ClientError>;

    /// Every persisted report for a profile, in store order.
    async fn fetch_reports(&self, profile_id: &str) -> Result<Vec<ClinicalReport>, ClientError>;

    /// Join the shared push-event stream.
    fn subscribe_events(&self) -> Subscription;
}

// Compile-time check that the trait stays usable behind `Arc<dyn _>`.
const _: () = {
    fn _assert_object_safe(_: &dyn GenerationClient) {}
};

/// Free-text meal analysis collaborator.
#[async_trait]
pub trait MealAnalysisClient: Send + Sync {
    async fn analyze_meal(&self, text: &str, language: Language) -> Result<MealItem, ClientError>;
}

/// Diary persistence collaborator.
#[async_trait]
pub trait MealLogClient: Send + Sync {
    async fn log_meal(&self, profile_id: &str, meal: &MealItem) -> Result<(), ClientError>;
}

// ---------------------------------------------------------------------------
// HTTP implementation
// ---------------------------------------------------------------------------

/// [`GenerationClient`] over the HTTP API plus the WebSocket event channel.
#[derive(Debug, Clone)]
pub struct HttpApiClient {
    http: reqwest::Client,
    api_root: Url,
    config: ApiConfig,
    events: EventBus,
}

impl HttpApiClient {
    pub fn new(config: ApiConfig) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(concat!("nutri/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ClientError::Build(e.to_string()))?;
        let api_root = Url::parse(&config.api_base)
            .map_err(|e| ClientError::Build(format!("invalid API base {:?}: {e}", config.api_base)))?;
        if api_root.cannot_be_a_base() {
            return Err(ClientError::Build(format!(
                "API base {:?} cannot carry a path",
                config.api_base
            )));
        }
        let events = EventBus::websocket(config.events_url());

        Ok(Self {
            http,
            api_root,
            config,
            events,
        })
    }

    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    /// The bus backing [`GenerationClient::subscribe_events`].
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// API root plus `segments`, each percent-encoded as one path segment.
    pub fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.api_root.clone();
        // `new` rejects cannot-be-a-base roots, so this always applies.
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn get_optional<T: DeserializeOwned>(
        &self,
        url: Url,
        resource: &'static str,
        profile_id: &str,
    ) -> Result<Option<T>, ClientError> {
        let resp = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| ClientError::history(resource, profile_id, e.to_string()))?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            let message = describe_failure(resp).await;
            return Err(ClientError::history(resource, profile_id, message));
        }

        resp.json::<T>()
            .await
            .map(Some)
            .map_err(|e| ClientError::history(resource, profile_id, e.to_string()))
    }

    async fn get_list<T: DeserializeOwned>(
        &self,
        url: Url,
        resource: &'static str,
        profile_id: &str,
    ) -> Result<Vec<T>, ClientError> {
        let resp = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| ClientError::history(resource, profile_id, e.to_string()))?;

        if !resp.status().is_success() {
            let message = describe_failure(resp).await;
            return Err(ClientError::history(resource, profile_id, message));
        }

        resp.json::<Vec<T>>()
            .await
            .map_err(|e| ClientError::history(resource, profile_id, e.to_string()))
    }
}

/// `HTTP <code> - <body>` for a non-success response.
async fn describe_failure(resp: reqwest::Response) -> String {
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    format!("HTTP {} - {}", status.as_u16(), body.trim())
}

#[async_trait]
impl GenerationClient for HttpApiClient {
    async fn enqueue(
        &self,
        profile: &UserProfile,
        correlation_id: Option<&str>,
    ) -> Result<PlanTaskResponse, ClientError> {
        let body = PlanRequest {
            profile,
            correlation_id,
        };
        let resp = self
            .http
            .post(self.endpoint(&["api", "agents", "plan"]))
            .json(&body)
            .send()
            .await
            .map_err(|e| ClientError::Submission(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(ClientError::Submission(describe_failure(resp).await));
        }

        let task = resp
            .json::<PlanTaskResponse>()
            .await
            .map_err(|e| ClientError::Submission(e.to_string()))?;
        tracing::debug!(task_id = %task.task_id, status = %task.status, "plan generation enqueued");
        Ok(task)
    }

    async fn get_status(&self, task_id: &str) -> Result<PlanTaskResponse, ClientError> {
        let status_err = |message: String| ClientError::StatusFetch {
            task_id: task_id.to_owned(),
            message,
        };

        let resp = self
            .http
            .get(self.endpoint(&["api", "agents", "plan", task_id]))
            .send()
            .await
            .map_err(|e| status_err(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(status_err(describe_failure(resp).await));
        }

        resp.json::<PlanTaskResponse>()
            .await
            .map_err(|e| status_err(e.to_string()))
    }

    async fn fetch_latest_plan(
        &self,
        profile_id: &str,
    ) -> Result<Option<WeeklyPlan>, ClientError> {
        let url = self.endpoint(&["api", "profiles", profile_id, "plans", "latest"]);
        let record: Option<PlanRecord> = self.get_optional(url, "latest plan", profile_id).await?;
        Ok(record.map(|r| r.plan))
    }

    async fn fetch_latest_report(
        &self,
        profile_id: &str,
    ) -> Result<Option<ClinicalReport>, ClientError> {
        let url = self.endpoint(&["api", "profiles", profile_id, "reports", "latest"]);
        let record: Option<ReportRecord> =
            self.get_optional(url, "latest report", profile_id).await?;
        Ok(record.map(|r| r.report))
    }

    async fn fetch_plans(&self, profile_id: &str) -> Result<Vec<WeeklyPlan>, ClientError> {
        let url = self.endpoint(&["api", "profiles", profile_id, "plans"]);
        let records: Vec<PlanRecord> = self.get_list(url, "plans", profile_id).await?;
        Ok(records.into_iter().map(|r| r.plan).collect())
    }

    async fn fetch_reports(&self, profile_id: &str) -> Result<Vec<ClinicalReport>, ClientError> {
        let url = self.endpoint(&["api", "profiles", profile_id, "reports"]);
        let records: Vec<ReportRecord> = self.get_list(url, "reports", profile_id).await?;
        Ok(records.into_iter().map(|r| r.report).collect())
    }

    fn subscribe_events(&self) -> Subscription {
        self.events.subscribe()
    }
}

#[async_trait]
impl MealAnalysisClient for HttpApiClient {
    async fn analyze_meal(&self, text: &str, language: Language) -> Result<MealItem, ClientError> {
        let resp = self
            .http
            .post(self.endpoint(&["api", "analysis", "meal"]))
            .json(&MealAnalysisRequest { text, language })
            .send()
            .await
            .map_err(|e| ClientError::MealAnalysis(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(ClientError::MealAnalysis(describe_failure(resp).await));
        }

        resp.json::<MealItem>()
            .await
            .map_err(|e| ClientError::MealAnalysis(e.to_string()))
    }
}

#[async_trait]
impl MealLogClient for HttpApiClient {
    async fn log_meal(&self, profile_id: &str, meal: &MealItem) -> Result<(), ClientError> {
        let log_err = |message: String| ClientError::MealLog {
            profile_id: profile_id.to_owned(),
            message,
        };

        let resp = self
            .http
            .post(self.endpoint(&["api", "profiles", profile_id, "logs"]))
            .json(&MealLogRequest { entry: meal })
            .send()
            .await
            .map_err(|e| log_err(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(log_err(describe_failure(resp).await));
        }
        Ok(())
    }
}
