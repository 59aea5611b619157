//! Transport-level errors raised by the API clients.

/// Errors returned by [`crate::client::GenerationClient`] and the
/// collaborator clients.
///
/// Messages are captured as strings so the error stays `Clone` and can be
/// carried into domain outcomes and notifications.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    #[error("failed to submit plan generation: {0}")]
    Submission(String),

    #[error("failed to fetch status for task {task_id}: {message}")]
    StatusFetch { task_id: String, message: String },

    #[error("failed to fetch {resource} for profile {profile_id}: {message}")]
    HistoryFetch {
        resource: &'static str,
        profile_id: String,
        message: String,
    },

    #[error("meal analysis failed: {0}")]
    MealAnalysis(String),

    #[error("failed to record meal for profile {profile_id}: {message}")]
    MealLog { profile_id: String, message: String },

    #[error("failed to build HTTP client: {0}")]
    Build(String),
}

impl ClientError {
    pub fn history(resource: &'static str, profile_id: &str, message: impl Into<String>) -> Self {
        Self::HistoryFetch {
            resource,
            profile_id: profile_id.to_owned(),
            message: message.into(),
        }
    }
}
