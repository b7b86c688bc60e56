//! Shared test fixtures for the conversation workspace.
//!
//! - a Redis container, started lazily once per test process and skipped
//!   when Docker is unavailable
//! - `unique_id` for collision-free conversation keys
//! - [`ScriptedModel`], a classification model replaying canned answers

mod fixtures;
mod model;

pub use fixtures::*;
pub use model::ScriptedModel;
