//! The media engine: runs ffmpeg over a staged pair with a [`FilterPlan`].
//!
//! Invocation form:
//!
//! ```text
//! ffmpeg -y -progress pipe:2 -nostats [video input options] -i <video> -i <audio> \
//!        -filter_complex <stages joined by ';'> <output options...> <output>
//! ```
//!
//! Progress blocks are read from stderr and forwarded to a
//! [`ProgressObserver`]; every other stderr line is kept as diagnostics for
//! error reports.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use mm_core::{EngineFailure, Error, StagedFiles};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::command::{CommandError, ToolCommand};
use crate::filter_graph::FilterPlan;
use crate::tools::VERSION_CHECK_TIMEOUT;

/// Default engine deadline: 1 hour.
const DEFAULT_ENGINE_TIMEOUT: Duration = Duration::from_secs(3600);

/// Number of diagnostic lines carried in an engine error.
const DIAGNOSTIC_TAIL_LINES: usize = 40;

/// Keys ffmpeg writes in `-progress` blocks.
const PROGRESS_KEYS: &[&str] = &[
    "frame",
    "fps",
    "bitrate",
    "total_size",
    "out_time_us",
    "out_time_ms",
    "out_time",
    "dup_frames",
    "drop_frames",
    "speed",
    "progress",
];

/// A progress update from a running engine invocation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineProgress {
    /// Completion estimate, `0.0..=100.0`.
    pub percent: f64,
    /// Output position as `HH:MM:SS.ffffff`.
    pub timemark: String,
}

/// Receives progress updates. Purely informational.
pub trait ProgressObserver: Send + Sync {
    fn on_progress(&self, progress: &EngineProgress);
}

impl<F> ProgressObserver for F
where
    F: Fn(&EngineProgress) + Send + Sync,
{
    fn on_progress(&self, progress: &EngineProgress) {
        self(progress)
    }
}

/// Observer that ignores every update.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl ProgressObserver for NoopObserver {
    fn on_progress(&self, _progress: &EngineProgress) {}
}

/// Result of an availability check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, utoipa::ToSchema)]
pub struct EngineAvailability {
    pub available: bool,
    /// First line of the `-version` output.
    pub version: Option<String>,
    #[schema(value_type = String)]
    pub path: PathBuf,
}

/// Runs a [`FilterPlan`] over a staged video/audio pair.
#[async_trait]
pub trait MediaEngine: Send + Sync {
    /// Check whether the engine can be run. Never errors.
    async fn availability(&self) -> EngineAvailability;

    /// Produce `output` from `inputs`. Succeeds only when the engine exits
    /// cleanly and `output` exists and is non-empty.
    async fn run(
        &self,
        inputs: &StagedFiles,
        plan: &FilterPlan,
        output: &Path,
        observer: &dyn ProgressObserver,
        cancel: &CancellationToken,
    ) -> mm_core::Result<()>;
}

/// An engine backed by the `ffmpeg` CLI.
#[derive(Debug, Clone)]
pub struct FfmpegEngine {
    ffmpeg_path: PathBuf,
    timeout: Duration,
}

impl FfmpegEngine {
    pub fn new(ffmpeg_path: PathBuf) -> Self {
        Self {
            ffmpeg_path,
            timeout: DEFAULT_ENGINE_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn path(&self) -> &Path {
        &self.ffmpeg_path
    }
}

#[async_trait]
impl MediaEngine for FfmpegEngine {
    async fn availability(&self) -> EngineAvailability {
        let mut cmd = ToolCommand::new(self.ffmpeg_path.clone());
        cmd.arg("-version").timeout(VERSION_CHECK_TIMEOUT);

        match cmd.execute().await {
            Ok(output) => EngineAvailability {
                available: true,
                version: output.stdout.lines().next().map(str::to_string),
                path: self.ffmpeg_path.clone(),
            },
            Err(e) => {
                tracing::debug!("ffmpeg availability check failed: {e}");
                EngineAvailability {
                    available: false,
                    version: None,
                    path: self.ffmpeg_path.clone(),
                }
            }
        }
    }

    async fn run(
        &self,
        inputs: &StagedFiles,
        plan: &FilterPlan,
        output: &Path,
        observer: &dyn ProgressObserver,
        cancel: &CancellationToken,
    ) -> mm_core::Result<()> {
        let mut cmd = ToolCommand::new(self.ffmpeg_path.clone());
        cmd.args(build_args(inputs, plan, output));
        cmd.timeout(self.timeout);

        tracing::info!("Running engine: {}", cmd.command_line());

        let mut parser = ProgressParser::new(plan.final_duration_secs);
        let result = cmd
            .execute_with_stderr_callback(
                |line| {
                    if let Some(progress) = parser.feed(line) {
                        tracing::debug!(
                            "Processing: {:.0}% done ({})",
                            progress.percent,
                            progress.timemark
                        );
                        observer.on_progress(&progress);
                    }
                },
                Some(cancel.clone()),
            )
            .await;

        if let Err(e) = result {
            return Err(classify_command_error(e));
        }

        match tokio::fs::metadata(output).await {
            Ok(meta) if meta.len() > 0 => {
                tracing::info!(
                    "Engine produced {} ({} bytes)",
                    output.display(),
                    meta.len()
                );
                Ok(())
            }
            Ok(_) => Err(Error::engine(
                EngineFailure::MissingOutput,
                format!("Engine produced an empty file at {}", output.display()),
                "",
            )),
            Err(_) => Err(Error::engine(
                EngineFailure::MissingOutput,
                format!("Engine produced no file at {}", output.display()),
                "",
            )),
        }
    }
}

/// Full ffmpeg argument list, excluding the program itself.
pub fn build_args(inputs: &StagedFiles, plan: &FilterPlan, output: &Path) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "-y".into(),
        "-progress".into(),
        "pipe:2".into(),
        "-nostats".into(),
    ];
    args.extend(plan.video_input_options.iter().cloned());
    args.push("-i".into());
    args.push(inputs.video.path.to_string_lossy().into_owned());
    args.push("-i".into());
    args.push(inputs.audio.path.to_string_lossy().into_owned());
    args.push("-filter_complex".into());
    args.push(plan.filter_complex());
    args.extend(plan.output_options.iter().cloned());
    args.push(output.to_string_lossy().into_owned());
    args
}

fn classify_command_error(e: CommandError) -> Error {
    let diagnostics = diagnostics_tail(e.stderr());
    let (reason, message) = match &e {
        CommandError::Spawn { source, .. } => (
            EngineFailure::Unavailable,
            format!("Video processing failed: could not start ffmpeg: {source}"),
        ),
        CommandError::Io { source, .. } => (
            EngineFailure::Unavailable,
            format!("Video processing failed: lost contact with ffmpeg: {source}"),
        ),
        CommandError::NonZeroExit { status, .. } => (
            EngineFailure::NonZeroExit,
            format!("Video processing failed: ffmpeg exited with {status}"),
        ),
        CommandError::Timeout { timeout, .. } => (
            EngineFailure::Timeout,
            format!("Video processing failed: ffmpeg timed out after {timeout:?}"),
        ),
        CommandError::Cancelled { .. } => (
            EngineFailure::Cancelled,
            "Video processing cancelled".to_string(),
        ),
    };
    tracing::warn!("{message}");
    Error::engine(reason, message, diagnostics)
}

fn is_progress_line(line: &str) -> bool {
    let Some((key, _)) = line.split_once('=') else {
        return false;
    };
    let key = key.trim();
    PROGRESS_KEYS.contains(&key) || (key.starts_with("stream_") && !key.contains(' '))
}

/// The last non-progress stderr lines, joined with newlines.
pub fn diagnostics_tail(stderr: &str) -> String {
    let lines: Vec<&str> = stderr
        .lines()
        .filter(|l| !l.trim().is_empty() && !is_progress_line(l))
        .collect();
    let start = lines.len().saturating_sub(DIAGNOSTIC_TAIL_LINES);
    lines[start..].join("\n")
}

/// Incremental parser for `-progress` key/value blocks.
#[derive(Debug)]
pub struct ProgressParser {
    total_secs: f64,
    out_time_us: Option<u64>,
    out_time: Option<String>,
}

impl ProgressParser {
    pub fn new(total_secs: f64) -> Self {
        Self {
            total_secs,
            out_time_us: None,
            out_time: None,
        }
    }

    /// Feed one stderr line. Returns an update when a block completes.
    pub fn feed(&mut self, line: &str) -> Option<EngineProgress> {
        let (key, value) = line.trim().split_once('=')?;
        match key {
            "out_time_us" | "out_time_ms" => {
                // Both keys carry microseconds.
                if let Ok(us) = value.trim().parse::<u64>() {
                    self.out_time_us = Some(us);
                }
                None
            }
            "out_time" => {
                self.out_time = Some(value.trim().to_string());
                None
            }
            "progress" => {
                let done = value.trim() == "end";
                Some(self.snapshot(done))
            }
            _ => None,
        }
    }

    fn snapshot(&self, done: bool) -> EngineProgress {
        let elapsed = match (self.out_time_us, &self.out_time) {
            (Some(us), _) => us as f64 / 1_000_000.0,
            (None, Some(mark)) => parse_timemark(mark).unwrap_or(0.0),
            (None, None) => 0.0,
        };

        let percent = if done {
            100.0
        } else if self.total_secs > 0.0 {
            (elapsed / self.total_secs * 100.0).clamp(0.0, 100.0)
        } else {
            0.0
        };

        let timemark = self
            .out_time
            .clone()
            .unwrap_or_else(|| format_timemark(elapsed));

        EngineProgress { percent, timemark }
    }
}

/// Parse `HH:MM:SS(.fraction)` into seconds.
fn parse_timemark(mark: &str) -> Option<f64> {
    let mut parts = mark.split(':');
    let h: f64 = parts.next()?.parse().ok()?;
    let m: f64 = parts.next()?.parse().ok()?;
    let s: f64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some(h * 3600.0 + m * 60.0 + s)
}

fn format_timemark(secs: f64) -> String {
    let total_us = (secs.max(0.0) * 1_000_000.0).round() as u64;
    let h = total_us / 3_600_000_000;
    let m = (total_us / 60_000_000) % 60;
    let s = (total_us / 1_000_000) % 60;
    let us = total_us % 1_000_000;
    format!("{h:02}:{m:02}:{s:02}.{us:06}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter_graph::FilterGraphBuilder;
    use mm_core::{CombinationMode, MediaAsset, MediaKind};
    use std::sync::Mutex;

    fn staged(dir: &Path) -> StagedFiles {
        StagedFiles {
            video: MediaAsset::new(dir.join("v.mp4"), MediaKind::Video, "clip.mp4", 1),
            audio: MediaAsset::new(dir.join("a.mp3"), MediaKind::Audio, "song.mp3", 1),
        }
    }

    #[test]
    fn args_keep_input_order() {
        let dir = Path::new("/stage");
        let plan = FilterGraphBuilder::default().build(CombinationMode::StandardSync, 10.0, 7.0);
        let args = build_args(&staged(dir), &plan, Path::new("/out/x.mp4"));

        assert_eq!(&args[..4], ["-y", "-progress", "pipe:2", "-nostats"]);
        assert_eq!(&args[4..8], ["-i", "/stage/v.mp4", "-i", "/stage/a.mp3"]);
        assert_eq!(args[8], "-filter_complex");
        assert_eq!(args[9], plan.filter_complex());
        assert_eq!(args.last().map(String::as_str), Some("/out/x.mp4"));

        let t = args.iter().position(|a| a == "-t").unwrap();
        assert_eq!(args[t + 1], "7.0");
    }

    #[test]
    fn stream_loop_precedes_video_input() {
        let dir = Path::new("/stage");
        let plan = FilterGraphBuilder::default().build(CombinationMode::LoopOrTrim, 3.0, 10.0);
        let args = build_args(&staged(dir), &plan, Path::new("/out/x.mp4"));

        assert_eq!(
            &args[4..10],
            ["-stream_loop", "3", "-i", "/stage/v.mp4", "-i", "/stage/a.mp3"]
        );
        assert!(args.iter().any(|a| a == "-shortest"));
        assert!(!args.iter().any(|a| a == "-t"));
    }

    #[test]
    fn progress_blocks_emit_updates() {
        let mut parser = ProgressParser::new(10.0);
        assert!(parser.feed("frame=25").is_none());
        assert!(parser.feed("out_time_us=2500000").is_none());
        assert!(parser.feed("out_time=00:00:02.500000").is_none());
        let p = parser.feed("progress=continue").unwrap();
        assert_eq!(p.percent, 25.0);
        assert_eq!(p.timemark, "00:00:02.500000");

        parser.feed("out_time_us=9000000");
        parser.feed("out_time=00:00:09.000000");
        let p = parser.feed("progress=end").unwrap();
        assert_eq!(p.percent, 100.0);
    }

    #[test]
    fn progress_is_clamped() {
        let mut parser = ProgressParser::new(2.0);
        parser.feed("out_time_us=5000000");
        let p = parser.feed("progress=continue").unwrap();
        assert_eq!(p.percent, 100.0);
        assert_eq!(p.timemark, "00:00:05.000000");

        // ffmpeg reports negative positions before the first frame.
        let mut parser = ProgressParser::new(2.0);
        parser.feed("out_time=-00:00:00.023220");
        let p = parser.feed("progress=continue").unwrap();
        assert_eq!(p.percent, 0.0);
    }

    #[test]
    fn unknown_total_reports_zero() {
        let mut parser = ProgressParser::new(0.0);
        parser.feed("out_time_us=1000000");
        assert_eq!(parser.feed("progress=continue").unwrap().percent, 0.0);
    }

    #[test]
    fn timemark_round_trip() {
        assert_eq!(format_timemark(3723.5), "01:02:03.500000");
        assert_eq!(parse_timemark("01:02:03.500000"), Some(3723.5));
        assert_eq!(parse_timemark("garbage"), None);
    }

    #[test]
    fn diagnostics_skip_progress_lines() {
        let stderr = "frame=10\nout_time=00:00:01.000000\nstream_0_0_q=28.0\n\
                      [AVFilterGraph] No such filter: 'bogus'\nprogress=end\n\
                      Error initializing complex filters.";
        assert_eq!(
            diagnostics_tail(stderr),
            "[AVFilterGraph] No such filter: 'bogus'\nError initializing complex filters."
        );
    }

    #[tokio::test]
    async fn missing_engine_is_unavailable() {
        let engine = FfmpegEngine::new(PathBuf::from("/nonexistent/bin/ffmpeg"));
        let availability = engine.availability().await;
        assert!(!availability.available);
        assert!(availability.version.is_none());

        let dir = tempfile::tempdir().unwrap();
        let plan = FilterGraphBuilder::default().build(CombinationMode::InvertedColor, 1.0, 1.0);
        let err = engine
            .run(
                &staged(dir.path()),
                &plan,
                &dir.path().join("out.mp4"),
                &NoopObserver,
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Engine {
                reason: EngineFailure::Unavailable,
                ..
            }
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn clean_exit_without_output_is_missing_output() {
        // `true` accepts any arguments, writes nothing and exits 0.
        let engine = FfmpegEngine::new(PathBuf::from("true"));
        let dir = tempfile::tempdir().unwrap();
        let plan = FilterGraphBuilder::default().build(CombinationMode::InvertedColor, 1.0, 1.0);
        let err = engine
            .run(
                &staged(dir.path()),
                &plan,
                &dir.path().join("out.mp4"),
                &NoopObserver,
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Engine {
                reason: EngineFailure::MissingOutput,
                ..
            }
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failing_engine_is_non_zero_exit() {
        let engine = FfmpegEngine::new(PathBuf::from("false"));
        let dir = tempfile::tempdir().unwrap();
        let plan = FilterGraphBuilder::default().build(CombinationMode::InvertedColor, 1.0, 1.0);
        let err = engine
            .run(
                &staged(dir.path()),
                &plan,
                &dir.path().join("out.mp4"),
                &NoopObserver,
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Engine {
                reason: EngineFailure::NonZeroExit,
                ..
            }
        ));
        assert_eq!(err.http_status(), 502);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn scripted_engine_reports_progress() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("fake-ffmpeg");
        std::fs::write(
            &script,
            "#!/bin/sh\n\
             for last; do :; done\n\
             echo out_time_us=1000000 >&2\n\
             echo out_time=00:00:01.000000 >&2\n\
             echo progress=continue >&2\n\
             echo out_time_us=2000000 >&2\n\
             echo out_time=00:00:02.000000 >&2\n\
             echo progress=end >&2\n\
             printf fakevideo > \"$last\"\n",
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let seen = Mutex::new(Vec::new());
        let observer = |p: &EngineProgress| seen.lock().unwrap().push(p.percent);

        let plan = FilterGraphBuilder::default().build(CombinationMode::StandardSync, 4.0, 2.0);
        let output = dir.path().join("out.mp4");
        FfmpegEngine::new(script)
            .run(
                &staged(dir.path()),
                &plan,
                &output,
                &observer,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(std::fs::read(&output).unwrap(), b"fakevideo");
        assert_eq!(*seen.lock().unwrap(), vec![50.0, 100.0]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn latin1_metadata_on_stderr_does_not_fail_run() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("fake-ffmpeg");
        std::fs::write(
            &script,
            "#!/bin/sh\n\
             for last; do :; done\n\
             printf '    title           : Caf\\351\\n' >&2\n\
             echo progress=end >&2\n\
             printf fakevideo > \"$last\"\n",
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let plan = FilterGraphBuilder::default().build(CombinationMode::InvertedColor, 2.0, 2.0);
        let output = dir.path().join("out.mp4");
        FfmpegEngine::new(script)
            .run(
                &staged(dir.path()),
                &plan,
                &output,
                &NoopObserver,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(std::fs::read(&output).unwrap(), b"fakevideo");
    }
}
