//! Unified error type for mediamix.
//!
//! All crates funnel their failures into [`Error`], which carries enough context
//! for API handlers to derive an HTTP status code via [`Error::http_status`]
//! and a stable machine-readable code via [`Error::kind`].

use std::fmt;

use serde::Serialize;

use crate::ids::RunId;

/// Why a duration probe failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeFailure {
    /// The prober binary is missing, could not be spawned, or timed out.
    EngineUnavailable,
    /// The metadata document carried no usable `format.duration`.
    NoDurationField,
    /// The prober ran but exited non-zero or produced unreadable output.
    EngineReportedFailure,
}

impl fmt::Display for ProbeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EngineUnavailable => write!(f, "engine unavailable"),
            Self::NoDurationField => write!(f, "no duration field"),
            Self::EngineReportedFailure => write!(f, "engine reported failure"),
        }
    }
}

/// Why an engine invocation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineFailure {
    /// The engine binary is missing or could not be spawned.
    Unavailable,
    /// The engine exited with a non-zero status.
    NonZeroExit,
    /// The engine exited cleanly but the output file is missing or empty.
    MissingOutput,
    /// The invocation exceeded its deadline and was killed.
    Timeout,
    /// The invocation was cancelled and the child was killed.
    Cancelled,
}

impl fmt::Display for EngineFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable => write!(f, "unavailable"),
            Self::NonZeroExit => write!(f, "non-zero exit"),
            Self::MissingOutput => write!(f, "missing output"),
            Self::Timeout => write!(f, "timeout"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Unified error type covering all failure modes in mediamix.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The requested entity could not be found.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// The kind of entity (e.g. "file").
        entity: String,
        /// The identifier that was looked up.
        id: String,
    },

    /// Request data failed validation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// An upload exceeded the configured size limit.
    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    /// Reading a media file's duration failed.
    #[error("Probe error ({reason}): {message}")]
    Probe {
        /// Classified failure reason.
        reason: ProbeFailure,
        /// Human-readable error description.
        message: String,
    },

    /// The media engine failed to produce an output.
    #[error("Engine error ({reason}): {message}")]
    Engine {
        /// Classified failure reason.
        reason: EngineFailure,
        /// Human-readable error description.
        message: String,
        /// Tail of the engine's diagnostic output.
        diagnostics: String,
    },

    /// An I/O operation failed.
    #[error("IO error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// An external tool returned an error outside of probing or combining.
    #[error("Tool error [{tool}]: {message}")]
    Tool {
        /// Name of the tool that failed.
        tool: String,
        /// Human-readable error description.
        message: String,
    },

    /// A combination run failed; wraps the underlying cause with run context.
    #[error("Run {run_id} failed during {step}: {source}")]
    Orchestration {
        /// The run that failed.
        run_id: RunId,
        /// The orchestration step that failed.
        step: String,
        /// The underlying error.
        #[source]
        source: Box<Error>,
    },

    /// Catch-all for unexpected internal errors.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Map this error to an appropriate HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            Error::NotFound { .. } => 404,
            Error::Validation(_) => 400,
            Error::PayloadTooLarge(_) => 413,
            Error::Probe { .. } => 422,
            Error::Engine {
                reason: EngineFailure::Timeout,
                ..
            } => 504,
            Error::Engine { .. } => 502,
            Error::Io { .. } => 500,
            Error::Tool { .. } => 502,
            Error::Orchestration { source, .. } => source.http_status(),
            Error::Internal(_) => 500,
        }
    }

    /// Stable error code exposed to API clients.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::NotFound { .. } => "not_found",
            Error::Validation(_) => "validation_error",
            Error::PayloadTooLarge(_) => "payload_too_large",
            Error::Probe { .. } => "probe_error",
            Error::Engine { .. } => "engine_error",
            Error::Io { .. } => "io_error",
            Error::Tool { .. } => "tool_error",
            Error::Orchestration { source, .. } => source.kind(),
            Error::Internal(_) => "internal_error",
        }
    }

    /// The innermost error, looking through orchestration context.
    pub fn root(&self) -> &Error {
        match self {
            Error::Orchestration { source, .. } => source.root(),
            other => other,
        }
    }

    /// Convenience constructor for [`Error::NotFound`].
    pub fn not_found(entity: impl Into<String>, id: impl fmt::Display) -> Self {
        Error::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    /// Convenience constructor for [`Error::Tool`].
    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Tool {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Convenience constructor for [`Error::Probe`].
    pub fn probe(reason: ProbeFailure, message: impl Into<String>) -> Self {
        Error::Probe {
            reason,
            message: message.into(),
        }
    }

    /// Convenience constructor for [`Error::Engine`].
    pub fn engine(
        reason: EngineFailure,
        message: impl Into<String>,
        diagnostics: impl Into<String>,
    ) -> Self {
        Error::Engine {
            reason,
            message: message.into(),
            diagnostics: diagnostics.into(),
        }
    }

    /// Wrap this error with the context of the run and step it occurred in.
    pub fn in_run(self, run_id: RunId, step: impl Into<String>) -> Self {
        Error::Orchestration {
            run_id,
            step: step.into(),
            source: Box::new(self),
        }
    }
}

/// Result alias using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
