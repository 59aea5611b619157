use std::env;
use std::time::Duration;

/// Endpoint configuration for the nutrition API.
///
/// The HTTP API and the push-event channel are addressed independently
/// because the event channel uses a different URI scheme (`ws://`/`wss://`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    /// Base URL of the HTTP API, e.g. `http://localhost:8000`.
    pub api_base: String,
    /// Base URL of the push-event channel, e.g. `ws://localhost:8000`.
    pub ws_base: String,
    /// Per-request timeout for HTTP calls.
    pub request_timeout: Duration,
}

impl ApiConfig {
    /// The default HTTP base used when no environment variable is set.
    pub const DEFAULT_API_BASE: &str = "http://localhost:8000";

    /// The default event-channel base used when no environment variable is set.
    pub const DEFAULT_WS_BASE: &str = "ws://localhost:8000";

    /// Default per-request timeout.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

    /// Build a config from the environment.
    ///
    /// Reads `NUTRI_API_BASE` and `NUTRI_WS_BASE`. When only the API base is
    /// set, the event base is derived from it by swapping the scheme.
    pub fn from_env() -> Self {
        let api_base = env::var("NUTRI_API_BASE").ok();
        let ws_base = env::var("NUTRI_WS_BASE").ok();

        match (api_base, ws_base) {
            (Some(api), Some(ws)) => Self::new(api, ws),
            (Some(api), None) => {
                let ws = ws_base_for(&api);
                Self::new(api, ws)
            }
            (None, Some(ws)) => Self::new(Self::DEFAULT_API_BASE, ws),
            (None, None) => Self::new(Self::DEFAULT_API_BASE, Self::DEFAULT_WS_BASE),
        }
    }

    /// Build a config from explicit base URLs. Trailing slashes are trimmed.
    pub fn new(api_base: impl Into<String>, ws_base: impl Into<String>) -> Self {
        Self {
            api_base: trim_base(api_base.into()),
            ws_base: trim_base(ws_base.into()),
            request_timeout: Self::DEFAULT_TIMEOUT,
        }
    }

    /// Build a config whose event base is derived from the HTTP base.
    pub fn from_api_base(api_base: impl Into<String>) -> Self {
        let api_base = api_base.into();
        let ws = ws_base_for(&api_base);
        Self::new(api_base, ws)
    }

    /// Override the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Full URL of the shared agent-event channel.
    pub fn events_url(&self) -> String {
        format!("{}/ws/agents", self.ws_base)
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

/// Convert an HTTP base URL into the matching event-channel base.
///
/// - `http://localhost:8000` -> `ws://localhost:8000`
/// - `https://api.example.com` -> `wss://api.example.com`
pub fn ws_base_for(api_base: &str) -> String {
    if let Some(rest) = api_base.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = api_base.strip_prefix("http://") {
        format!("ws://{rest}")
    } else if api_base.starts_with("ws://") || api_base.starts_with("wss://") {
        api_base.to_owned()
    } else {
        format!("ws://{api_base}")
    }
}

fn trim_base(mut base: String) -> String {
    while base.ends_with('/') {
        base.pop();
    }
    base
}
