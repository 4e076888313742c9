//! Shared types and models for the marketplace inventory platform
//!
//! Pure domain types: no I/O, no persistence. The backend crate composes these
//! with a store, a cache and notification sinks.

pub mod models;
pub mod types;
pub mod validation;

pub use models::*;
pub use types::*;
pub use validation::*;
