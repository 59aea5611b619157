//! Plan generation lifecycle, plan editing, and application state for the
//! nutrition planner.
//!
//! - [`profile`]: intake validation and energy baselines.
//! - [`orchestrator`]: submit + race push events against status polling.
//! - [`history`]: per-profile plan and report history.
//! - [`editor`]: meal edits with aggregate recomputation.
//! - [`diary`], [`analysis`]: food diary and meal estimation.
//! - [`shell`]: the state holder tying it together.

pub mod analysis;
pub mod diary;
pub mod editor;
pub mod history;
pub mod orchestrator;
pub mod profile;
pub mod shell;

pub use orchestrator::{GenerationOutcome, OrchestratorConfig, PlanGenerator};
