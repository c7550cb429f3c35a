//! Coach context construction.

pub mod prompt_budget;
pub mod prompt_builder;

pub use prompt_budget::{CoachContextParts, enforce_budget};
pub use prompt_builder::build_coach_context;
