//! Shared test harness for integration tests.
//!
//! Provides [`TestHarness`] which creates scratch storage directories, a
//! default config and a full [`AppContext`] backed by fake probe/engine
//! implementations that count their calls. The [`TestHarness::with_server`]
//! constructor starts Axum on a random port for HTTP-level testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mm_av::{
    DurationProber, EngineAvailability, FilterPlan, MediaEngine, ProgressObserver, ToolRegistry,
};
use mm_core::config::Config;
use mm_core::{DurationInfo, EngineFailure, Error, StagedFiles};
use mm_server::context::AppContext;
use mm_server::router::build_router;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

/// Bytes the fake engine writes as its "rendered" output.
pub const FAKE_OUTPUT: &[u8] = b"fake combined mp4";

/// Prober returning fixed durations: `.mp4` paths get the video duration,
/// everything else the audio duration.
pub struct FakeProber {
    pub video_secs: f64,
    pub audio_secs: f64,
    pub calls: AtomicUsize,
}

#[async_trait]
impl DurationProber for FakeProber {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn probe(&self, path: &Path) -> mm_core::Result<DurationInfo> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let seconds = if path.extension().is_some_and(|e| e == "mp4") {
            self.video_secs
        } else {
            self.audio_secs
        };
        Ok(DurationInfo { seconds })
    }
}

/// Engine that writes [`FAKE_OUTPUT`] to the requested output path, then
/// keeps "rendering" for `linger` before returning.
#[derive(Default)]
pub struct FakeEngine {
    pub fail: bool,
    pub linger: Duration,
    pub calls: AtomicUsize,
}

#[async_trait]
impl MediaEngine for FakeEngine {
    async fn availability(&self) -> EngineAvailability {
        EngineAvailability {
            available: true,
            version: Some("ffmpeg version fake".into()),
            path: PathBuf::from("/fake/ffmpeg"),
        }
    }

    async fn run(
        &self,
        _inputs: &StagedFiles,
        _plan: &FilterPlan,
        output: &Path,
        _observer: &dyn ProgressObserver,
        _cancel: &CancellationToken,
    ) -> mm_core::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(Error::engine(
                EngineFailure::NonZeroExit,
                "ffmpeg exited with status 1",
                "Invalid data found when processing input",
            ));
        }
        tokio::fs::write(output, FAKE_OUTPUT).await?;
        tokio::time::sleep(self.linger).await;
        Ok(())
    }
}

/// Test harness wrapping a fully-constructed [`AppContext`] over scratch
/// directories.
pub struct TestHarness {
    pub ctx: AppContext,
    pub prober: Arc<FakeProber>,
    pub engine: Arc<FakeEngine>,
    root: TempDir,
}

impl TestHarness {
    /// Harness with a 10s video, a 5s audio track and a working engine.
    pub fn new() -> Self {
        Self::with_engine(FakeEngine::default())
    }

    pub fn with_engine(engine: FakeEngine) -> Self {
        Self::build(engine, |_| {})
    }

    /// Harness whose default config is adjusted by `configure` before the
    /// context is built. Storage paths are set afterwards.
    pub fn build(engine: FakeEngine, configure: impl FnOnce(&mut Config)) -> Self {
        let root = tempfile::tempdir().expect("failed to create temp dir");
        let mut config = Config::default();
        config.server.static_dir = None;
        config.storage.sweep_interval_secs = 0;
        configure(&mut config);
        config.storage.upload_dir = root.path().join("uploads");
        config.storage.temp_dir = root.path().join("temp");
        config.storage.output_dir = root.path().join("output");
        config
            .storage
            .ensure_dirs()
            .expect("failed to create storage dirs");

        let prober = Arc::new(FakeProber {
            video_secs: 10.0,
            audio_secs: 5.0,
            calls: AtomicUsize::new(0),
        });
        let engine = Arc::new(engine);
        let tools = ToolRegistry::with_paths([
            ("ffmpeg", PathBuf::from("/fake/ffmpeg")),
            ("ffprobe", PathBuf::from("/fake/ffprobe")),
        ]);

        let ctx = AppContext::with_backends(config, tools, prober.clone(), engine.clone());
        Self {
            ctx,
            prober,
            engine,
            root,
        }
    }

    /// Start an Axum server on a random port and return the harness together
    /// with the bound socket address.
    pub async fn with_server() -> (Self, SocketAddr) {
        Self::new().serve().await
    }

    /// Start this harness's router on a random port.
    pub async fn serve(self) -> (Self, SocketAddr) {
        let app = build_router(self.ctx.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind random port");
        let addr = listener.local_addr().expect("failed to get local addr");

        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        (self, addr)
    }

    pub fn root(&self) -> &Path {
        self.root.path()
    }

    pub fn upload_dir(&self) -> &Path {
        &self.ctx.config.storage.upload_dir
    }

    pub fn temp_dir(&self) -> &Path {
        &self.ctx.config.storage.temp_dir
    }

    pub fn output_dir(&self) -> &Path {
        &self.ctx.config.storage.output_dir
    }

    pub fn engine_calls(&self) -> usize {
        self.engine.calls.load(Ordering::SeqCst)
    }

    pub fn probe_calls(&self) -> usize {
        self.prober.calls.load(Ordering::SeqCst)
    }
}

/// Number of entries in a directory.
pub fn file_count(dir: &Path) -> usize {
    std::fs::read_dir(dir)
        .map(|entries| entries.count())
        .unwrap_or(0)
}

/// A multipart part carrying a file with the given name and content type.
pub fn file_part(name: &str, content_type: &str, bytes: &[u8]) -> reqwest::multipart::Part {
    reqwest::multipart::Part::bytes(bytes.to_vec())
        .file_name(name.to_string())
        .mime_str(content_type)
        .expect("valid mime type")
}

/// The standard valid upload: an MP4 video and an MP3 audio track.
pub fn valid_form() -> reqwest::multipart::Form {
    reqwest::multipart::Form::new()
        .part("video", file_part("clip.mp4", "video/mp4", b"video bytes"))
        .part("audio", file_part("track.mp3", "audio/mpeg", b"audio bytes"))
}
