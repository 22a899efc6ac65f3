//! mm-core: shared types, IDs, errors, and configuration.
//!
//! This crate is the foundational dependency for all other mm-* crates,
//! providing the unified error type, the run identifier, the media-domain
//! enums and records exchanged between intake, orchestration and the engine
//! wrappers, and the application configuration.

pub mod config;
pub mod error;
pub mod ids;
pub mod media;

// Re-export the most commonly used items at the crate root.
pub use error::{EngineFailure, Error, ProbeFailure, Result};
pub use ids::*;
pub use media::*;
