//! # Agent Module
//!
//! Drives the tool-calling loop: generation, routing, and folding results
//! back into the conversation until the model stops proposing calls.
//!
//! ## Key Types
//!
//! - [`Agent`] - The loop executor
//! - [`AgentOptions`] - Per-run overrides
//! - [`AgentOutcome`] - Final answer plus the full conversation
//! - [`AgentError`] - Errors that end a run

mod errors;
mod models;
mod runner;


pub use errors::AgentError;
pub use models::{AgentOptions, AgentOutcome, AgentStep};
pub use runner::{Agent, TextObserver};
