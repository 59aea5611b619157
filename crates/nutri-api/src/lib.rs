//! Transport boundary for the nutrition planning service: wire data model,
//! HTTP client, and the shared push-event bus.

pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod models;

pub use client::{GenerationClient, HttpApiClient, MealAnalysisClient, MealLogClient};
pub use config::ApiConfig;
pub use error::ClientError;
pub use events::{AgentEvent, EventBus, EventFrame, Subscription};
