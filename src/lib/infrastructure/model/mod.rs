//! Model infrastructure module
//!
//! Generation backends behind one dispatcher.
//!
//! # Structure
//! - `types` - Request, Result, Error types
//! - `traits` - ModelClient trait
//! - `adapter` - Message format adapters
//! - `factory` - Provider factory for creating clients
//! - `clients` - Individual client implementations
//! - `provider` - GenerationDispatcher for routing

pub mod adapter;
pub mod clients;
pub mod factory;
pub mod provider;
pub mod traits;
pub mod types;

pub use provider::{GenerationDispatcher, collect};
pub use traits::ModelClient;
pub use types::{
    GenerationResult, GenerationStream, ModelConfig, ModelError, ModelRequest,
};
