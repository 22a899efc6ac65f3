//! # mm-pipeline
//!
//! Orchestration of a single video/audio combination run.
//!
//! This crate provides:
//!
//! - **[`CombinationOrchestrator`]** -- validate, probe, plan, invoke and
//!   deliver, with every failure wrapped in run context.
//! - **[`TempFileSet`]** -- the per-run set of paths that is always drained
//!   when the run ends, including when its future is dropped.
//! - **[`OutputStore`]** -- listing, lookup and retention sweep over the
//!   persisted output directory.

pub mod orchestrator;
pub mod storage;
pub mod temp_files;

pub use orchestrator::{CombinationOrchestrator, CombinationResult};
pub use storage::{OutputStore, StoredFileEntry};
pub use temp_files::TempFileSet;
