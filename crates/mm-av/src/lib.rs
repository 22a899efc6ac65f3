//! # mm-av
//!
//! External media tool management and the engine-facing half of the
//! combination pipeline.
//!
//! This crate provides:
//!
//! - **Tool discovery** ([`ToolRegistry`]) -- find and cache paths to ffmpeg
//!   and ffprobe, and report their availability.
//! - **Command execution** ([`ToolCommand`]) -- async builder with timeout,
//!   cancellation and line-by-line stderr streaming.
//! - **Duration probing** ([`DurationProber`], [`FfprobeProber`]).
//! - **Filter graph building** ([`FilterGraphBuilder`]) -- the pure mapping
//!   from a [`mm_core::CombinationMode`] and two durations to a
//!   [`FilterPlan`].
//! - **Engine invocation** ([`MediaEngine`], [`FfmpegEngine`]) -- runs a plan
//!   with progress reporting.

pub mod command;
pub mod engine;
pub mod filter_graph;
pub mod probe;
pub mod tools;

// ---- Re-exports for convenience ----

pub use command::{CommandError, ToolCommand, ToolOutput};
pub use engine::{
    EngineAvailability, EngineProgress, FfmpegEngine, MediaEngine, NoopObserver,
    ProgressObserver,
};
pub use filter_graph::{EncodeProfile, FilterGraphBuilder, FilterPlan};
pub use probe::{DurationProber, FfprobeProber};
pub use tools::{ToolConfig, ToolInfo, ToolRegistry};
