//! # Application Module
//!
//! ## Submodules
//!
//! - [`tooling`] - Tool provider sessions, retrying invoker and call router
//! - [`agent`] - The generation/tool-call loop built on top of them

pub mod agent;
pub mod tooling;
