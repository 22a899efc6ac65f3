//! Duration probing.
//!
//! [`FfprobeProber`] shells out to
//! `ffprobe -v error -print_format json -show_format <file>` and reads
//! `format.duration` from the JSON document. Failures are classified into
//! [`ProbeFailure`] reasons so callers can tell a missing prober apart from
//! an unreadable file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use mm_core::{DurationInfo, Error, ProbeFailure};
use serde::Deserialize;

use crate::command::{CommandError, ToolCommand};

/// Default probe timeout.
const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(30);

/// Reads the duration of a staged media file.
#[async_trait]
pub trait DurationProber: Send + Sync {
    /// Backend name, for logging.
    fn name(&self) -> &'static str;

    /// Probe `path`. Must not modify the file.
    async fn probe(&self, path: &Path) -> mm_core::Result<DurationInfo>;
}

/// A prober backed by the `ffprobe` CLI.
#[derive(Debug, Clone)]
pub struct FfprobeProber {
    ffprobe_path: PathBuf,
    timeout: Duration,
}

impl FfprobeProber {
    /// Create a new prober using the given ffprobe path.
    pub fn new(ffprobe_path: PathBuf) -> Self {
        Self {
            ffprobe_path,
            timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl DurationProber for FfprobeProber {
    fn name(&self) -> &'static str {
        "ffprobe"
    }

    async fn probe(&self, path: &Path) -> mm_core::Result<DurationInfo> {
        let mut cmd = ToolCommand::new(self.ffprobe_path.clone());
        cmd.timeout(self.timeout);
        cmd.args(["-v", "error", "-print_format", "json", "-show_format"]);
        cmd.arg(path.to_string_lossy().as_ref());

        let output = cmd.execute().await.map_err(|e| classify_command_error(path, e))?;
        let info = parse_duration_document(&output.stdout)?;

        tracing::debug!("Probed {}: {:.3}s", path.display(), info.seconds);
        Ok(info)
    }
}

fn classify_command_error(path: &Path, e: CommandError) -> Error {
    let reason = match e {
        CommandError::Spawn { .. } | CommandError::Timeout { .. } | CommandError::Cancelled { .. } => {
            ProbeFailure::EngineUnavailable
        }
        CommandError::NonZeroExit { .. } | CommandError::Io { .. } => {
            ProbeFailure::EngineReportedFailure
        }
    };
    Error::probe(
        reason,
        format!("Failed to get duration of {}: {e}", path.display()),
    )
}

// ---------------------------------------------------------------------------
// JSON structures
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: Option<FfprobeFormat>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    /// ffprobe prints a string; some wrappers emit a number.
    duration: Option<serde_json::Value>,
}

/// Extract a [`DurationInfo`] from an ffprobe JSON document.
pub fn parse_duration_document(json: &str) -> mm_core::Result<DurationInfo> {
    let output: FfprobeOutput = serde_json::from_str(json).map_err(|e| {
        Error::probe(
            ProbeFailure::EngineReportedFailure,
            format!("ffprobe JSON parse error: {e}"),
        )
    })?;

    let raw = output
        .format
        .and_then(|f| f.duration)
        .ok_or_else(|| {
            Error::probe(
                ProbeFailure::NoDurationField,
                "Could not determine file duration",
            )
        })?;

    let seconds = match &raw {
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
        serde_json::Value::Number(n) => n.as_f64(),
        _ => None,
    };

    seconds.and_then(DurationInfo::new).ok_or_else(|| {
        Error::probe(
            ProbeFailure::NoDurationField,
            format!("Unusable duration value {raw}"),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_string_duration() {
        let json = r#"{"format": {"filename": "a.mp4", "duration": "10.000000"}}"#;
        assert_eq!(parse_duration_document(json).unwrap().seconds, 10.0);
    }

    #[test]
    fn parses_numeric_duration() {
        let json = r#"{"format": {"duration": 7.5}}"#;
        assert_eq!(parse_duration_document(json).unwrap().seconds, 7.5);
    }

    #[test]
    fn missing_duration_field() {
        let json = r#"{"format": {"filename": "a.mp3"}}"#;
        let err = parse_duration_document(json).unwrap_err();
        assert!(matches!(
            err,
            Error::Probe {
                reason: ProbeFailure::NoDurationField,
                ..
            }
        ));
    }

    #[test]
    fn missing_format_section() {
        let err = parse_duration_document("{}").unwrap_err();
        assert!(matches!(
            err,
            Error::Probe {
                reason: ProbeFailure::NoDurationField,
                ..
            }
        ));
    }

    #[test]
    fn unparseable_or_negative_duration() {
        for json in [
            r#"{"format": {"duration": "N/A"}}"#,
            r#"{"format": {"duration": "-3.0"}}"#,
            r#"{"format": {"duration": true}}"#,
        ] {
            let err = parse_duration_document(json).unwrap_err();
            assert!(
                matches!(
                    err,
                    Error::Probe {
                        reason: ProbeFailure::NoDurationField,
                        ..
                    }
                ),
                "unexpected error for {json}: {err}"
            );
        }
    }

    #[test]
    fn invalid_json_is_engine_failure() {
        let err = parse_duration_document("Invalid data found").unwrap_err();
        assert!(matches!(
            err,
            Error::Probe {
                reason: ProbeFailure::EngineReportedFailure,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn missing_ffprobe_is_engine_unavailable() {
        let prober = FfprobeProber::new(PathBuf::from("/nonexistent/bin/ffprobe"));
        let err = prober.probe(Path::new("/tmp/whatever.mp4")).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Probe {
                reason: ProbeFailure::EngineUnavailable,
                ..
            }
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failing_ffprobe_is_engine_reported_failure() {
        // `false` ignores its arguments and exits 1.
        let prober = FfprobeProber::new(PathBuf::from("false"));
        let err = prober.probe(Path::new("/tmp/whatever.mp4")).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Probe {
                reason: ProbeFailure::EngineReportedFailure,
                ..
            }
        ));
    }
}
