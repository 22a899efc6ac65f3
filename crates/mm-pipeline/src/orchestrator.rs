//! The combination orchestrator: one run from staged inputs to a delivered
//! result.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use mm_av::{DurationProber, FilterGraphBuilder, MediaEngine, ProgressObserver};
use mm_core::{CombinationMode, DeliveryMode, Error, MediaAsset, MediaKind, RunId, StagedFiles};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::temp_files::TempFileSet;

/// What a successful run hands back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CombinationResult {
    /// The produced file, read fully into memory. Nothing is left on disk.
    BinaryPayload { bytes: Bytes, public_name: String },
    /// The produced file, kept in the output directory.
    StoredFile { path: PathBuf, public_name: String },
}

impl CombinationResult {
    pub fn public_name(&self) -> &str {
        match self {
            Self::BinaryPayload { public_name, .. } | Self::StoredFile { public_name, .. } => {
                public_name
            }
        }
    }
}

/// Drives probe, plan, engine and delivery for a staged pair.
///
/// Holds no per-run state, so one instance serves any number of concurrent
/// runs.
pub struct CombinationOrchestrator {
    prober: Arc<dyn DurationProber>,
    engine: Arc<dyn MediaEngine>,
    builder: FilterGraphBuilder,
    temp_dir: PathBuf,
    output_dir: PathBuf,
}

impl CombinationOrchestrator {
    pub fn new(
        prober: Arc<dyn DurationProber>,
        engine: Arc<dyn MediaEngine>,
        builder: FilterGraphBuilder,
        temp_dir: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            prober,
            engine,
            builder,
            temp_dir: temp_dir.into(),
            output_dir: output_dir.into(),
        }
    }

    pub fn engine(&self) -> &Arc<dyn MediaEngine> {
        &self.engine
    }

    /// Combine a staged video/audio pair.
    ///
    /// Takes ownership of `staged`: both staged files are deleted when the
    /// run ends, whatever the outcome. The engine always renders into the
    /// temp directory; a [`DeliveryMode::Deferred`] run moves the finished
    /// file into the output directory, so stored outputs are never partial.
    pub async fn combine(
        &self,
        staged: StagedFiles,
        mode: CombinationMode,
        delivery: DeliveryMode,
        observer: &dyn ProgressObserver,
        cancel: &CancellationToken,
    ) -> mm_core::Result<CombinationResult> {
        let run_id = RunId::new();
        let span = tracing::info_span!("combine", %run_id, %mode, %delivery);

        let mut temp = TempFileSet::new();
        for path in staged.paths() {
            temp.register(path);
        }

        let result = self
            .run_steps(run_id, &staged, mode, delivery, observer, cancel, &mut temp)
            .instrument(span.clone())
            .await;

        let removed = temp.drain();
        span.in_scope(|| match &result {
            Ok(r) => tracing::info!(
                "Run complete: {} ({removed} temporary file(s) removed)",
                r.public_name()
            ),
            Err(e) => tracing::error!("Run failed: {e} ({removed} temporary file(s) removed)"),
        });

        result
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_steps(
        &self,
        run_id: RunId,
        staged: &StagedFiles,
        mode: CombinationMode,
        delivery: DeliveryMode,
        observer: &dyn ProgressObserver,
        cancel: &CancellationToken,
        temp: &mut TempFileSet,
    ) -> mm_core::Result<CombinationResult> {
        tracing::info!(
            "Processing files: {} + {}",
            staged.video.original_name,
            staged.audio.original_name
        );

        validate_asset(&staged.video, MediaKind::Video)
            .and_then(|()| validate_asset(&staged.audio, MediaKind::Audio))
            .map_err(|e| e.in_run(run_id, "validate"))?;

        let video_secs = self.probe_nonzero(&staged.video, run_id, "probe_video").await?;
        let audio_secs = self.probe_nonzero(&staged.audio, run_id, "probe_audio").await?;
        tracing::info!("Video duration: {video_secs}s, audio duration: {audio_secs}s");

        let plan = self.builder.build(mode, video_secs, audio_secs);
        tracing::info!(
            "Final video duration will be {}s{}",
            plan.final_duration_secs,
            plan.loop_count
                .map(|n| format!(" (video looped {n} times)"))
                .unwrap_or_default()
        );

        let stem = unique_stem();
        let output = self.temp_dir.join(format!("temp_{stem}.mp4"));
        temp.register(&output);

        self.engine
            .run(staged, &plan, &output, observer, cancel)
            .await
            .map_err(|e| e.in_run(run_id, "engine"))?;

        match delivery {
            DeliveryMode::Immediate => {
                let bytes = tokio::fs::read(&output)
                    .await
                    .map_err(|e| Error::from(e).in_run(run_id, "deliver"))?;
                Ok(CombinationResult::BinaryPayload {
                    bytes: Bytes::from(bytes),
                    public_name: format!("processed_{}", staged.video.original_basename()),
                })
            }
            DeliveryMode::Deferred => {
                let public_name = format!("combined_{stem}.mp4");
                let stored = self.output_dir.join(&public_name);
                let partial = stored.with_extension("mp4.part");
                temp.register(&stored);
                temp.register(&partial);

                publish(&output, &stored, &partial)
                    .await
                    .map_err(|e| Error::from(e).in_run(run_id, "store"))?;
                temp.retain(&stored);
                tracing::info!("Stored output at {}", stored.display());

                Ok(CombinationResult::StoredFile {
                    path: stored,
                    public_name,
                })
            }
        }
    }

    async fn probe_nonzero(
        &self,
        asset: &MediaAsset,
        run_id: RunId,
        step: &'static str,
    ) -> mm_core::Result<f64> {
        let info = self
            .prober
            .probe(&asset.path)
            .await
            .map_err(|e| e.in_run(run_id, step))?;

        if info.seconds <= 0.0 {
            return Err(Error::Validation(format!(
                "{} file {} has zero duration; nothing to combine",
                asset.kind.format_label(),
                asset.original_basename()
            ))
            .in_run(run_id, step));
        }
        Ok(info.seconds)
    }
}

/// A file stem no other run can share.
fn unique_stem() -> String {
    format!(
        "{}_{}",
        chrono::Utc::now().timestamp_millis(),
        uuid::Uuid::new_v4()
    )
}

/// Move a finished render to `stored`. When a plain rename is not possible
/// (temp and output on different filesystems) the copy is written to
/// `partial`, which the output listing ignores, and renamed into place.
async fn publish(rendered: &Path, stored: &Path, partial: &Path) -> std::io::Result<()> {
    if let Err(e) = tokio::fs::rename(rendered, stored).await {
        tracing::debug!("Rename into output dir failed ({e}); copying instead");
        tokio::fs::copy(rendered, partial).await?;
        tokio::fs::rename(partial, stored).await?;
    }
    Ok(())
}

fn validate_asset(asset: &MediaAsset, expected: MediaKind) -> mm_core::Result<()> {
    if asset.kind != expected || !expected.matches_extension(&asset.original_name) {
        return Err(Error::Validation(format!(
            "{} file must be in {} format",
            match expected {
                MediaKind::Video => "Video",
                MediaKind::Audio => "Audio",
            },
            expected.format_label()
        )));
    }
    Ok(())
}
