//! Configuration file management for nutri.
//!
//! Provides a TOML-based config file at `~/.config/nutri/config.toml` and a
//! resolution chain: CLI flag > env var > config file > default.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use nutri_api::ApiConfig;
use nutri_api::config::ws_base_for;
use nutri_core::OrchestratorConfig;

// -----------------------------------------------------------------------
// Config file types
// -----------------------------------------------------------------------

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub api: ApiSection,
    #[serde(default)]
    pub generation: GenerationSection,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ApiSection {
    pub base_url: Option<String>,
    /// Event channel base, e.g. `wss://api.example.com`. Derived from
    /// `base_url` when absent.
    pub events_url: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct GenerationSection {
    pub max_attempts: Option<u32>,
    pub poll_interval_ms: Option<u64>,
}

// -----------------------------------------------------------------------
// Paths
// -----------------------------------------------------------------------

/// Return the nutri config directory.
///
/// Always uses XDG layout: `$XDG_CONFIG_HOME/nutri` or `~/.config/nutri`.
pub fn config_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("nutri");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("nutri")
}

/// Return the path to the nutri config file.
pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

// -----------------------------------------------------------------------
// Read / write
// -----------------------------------------------------------------------

/// Load and parse the config file. Returns an error if it does not exist.
pub fn load_config() -> Result<ConfigFile> {
    let path = config_path();
    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read config file at {}", path.display()))?;
    let config: ConfigFile = toml::from_str(&contents).context("failed to parse config file")?;
    Ok(config)
}

/// Serialize and write the config file, creating parent dirs as needed.
/// Sets file permissions to 0600 on Unix.
pub fn save_config(config: &ConfigFile) -> Result<PathBuf> {
    let path = config_path();
    let dir = config_dir();
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create config directory {}", dir.display()))?;

    let contents = toml::to_string_pretty(config).context("failed to serialize config")?;
    std::fs::write(&path, &contents)
        .with_context(|| format!("failed to write config file at {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(&path, perms)
            .with_context(|| format!("failed to set permissions on {}", path.display()))?;
    }

    Ok(path)
}

// -----------------------------------------------------------------------
// Resolved config
// -----------------------------------------------------------------------

/// Fully resolved configuration, ready for use.
#[derive(Debug)]
pub struct NutriConfig {
    pub api: ApiConfig,
    pub generation: OrchestratorConfig,
}

impl NutriConfig {
    /// Resolve configuration using the chain: CLI flag > env var > config file > default.
    ///
    /// - API base: `cli_api_url` > `NUTRI_API_BASE` > `api.base_url` > `ApiConfig::DEFAULT_API_BASE`
    /// - Event base: `cli_events_url` > `NUTRI_WS_BASE` > `api.events_url` > derived from the API base
    /// - Attempts: `NUTRI_MAX_ATTEMPTS` > `generation.max_attempts` > 10
    /// - Poll interval: `NUTRI_POLL_INTERVAL_MS` > `generation.poll_interval_ms` > 2000
    pub fn resolve(cli_api_url: Option<&str>, cli_events_url: Option<&str>) -> Result<Self> {
        let file = load_config().unwrap_or_default();

        let api_base = cli_api_url
            .map(str::to_owned)
            .or_else(|| std::env::var("NUTRI_API_BASE").ok())
            .or(file.api.base_url)
            .unwrap_or_else(|| ApiConfig::DEFAULT_API_BASE.to_owned());

        let ws_base = cli_events_url
            .map(str::to_owned)
            .or_else(|| std::env::var("NUTRI_WS_BASE").ok())
            .or(file.api.events_url)
            .unwrap_or_else(|| ws_base_for(&api_base));

        let max_attempts = match std::env::var("NUTRI_MAX_ATTEMPTS") {
            Ok(raw) => raw
                .parse::<u32>()
                .with_context(|| format!("NUTRI_MAX_ATTEMPTS is not a number: {raw:?}"))?,
            Err(_) => file
                .generation
                .max_attempts
                .unwrap_or(OrchestratorConfig::DEFAULT_MAX_ATTEMPTS),
        };

        let poll_interval = match std::env::var("NUTRI_POLL_INTERVAL_MS") {
            Ok(raw) => Duration::from_millis(
                raw.parse::<u64>()
                    .with_context(|| format!("NUTRI_POLL_INTERVAL_MS is not a number: {raw:?}"))?,
            ),
            Err(_) => file
                .generation
                .poll_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(OrchestratorConfig::DEFAULT_POLL_INTERVAL),
        };

        Ok(Self {
            api: ApiConfig::new(api_base, ws_base),
            generation: OrchestratorConfig {
                max_attempts: max_attempts.max(1),
                poll_interval,
                ..OrchestratorConfig::default()
            },
        })
    }
}

// -----------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------
