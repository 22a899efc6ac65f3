//! Multipart upload intake for `POST /api/process`.
//!
//! File fields are streamed chunk by chunk into the upload directory under
//! collision-free names. Every file staged so far is deleted if the request
//! is rejected partway through.

use std::path::{Path, PathBuf};

use axum::extract::multipart::{Field, Multipart, MultipartError};
use axum::http::StatusCode;
use mm_core::config::StorageConfig;
use mm_core::{
    CombinationMode, DeliveryMode, Error, MediaAsset, MediaKind, StagedFiles, UploadId,
};
use mm_pipeline::TempFileSet;
use tokio::io::AsyncWriteExt;

/// A fully received `process` form.
#[derive(Debug)]
pub struct ProcessForm {
    pub staged: StagedFiles,
    pub mode: Option<CombinationMode>,
    pub delivery: Option<DeliveryMode>,
    /// Legacy flag selecting portrait padding when no mode was sent.
    pub portrait: bool,
}

impl ProcessForm {
    pub fn resolve_mode(&self, default: CombinationMode) -> CombinationMode {
        match (self.mode, self.portrait) {
            (Some(mode), _) => mode,
            (None, true) => CombinationMode::PortraitPad,
            (None, false) => default,
        }
    }

    pub fn resolve_delivery(&self, default: DeliveryMode) -> DeliveryMode {
        self.delivery.unwrap_or(default)
    }
}

/// Receive the multipart body, staging both files under `storage.upload_dir`.
pub async fn receive(storage: &StorageConfig, mut multipart: Multipart) -> mm_core::Result<ProcessForm> {
    let mut staged_paths = TempFileSet::new();
    let mut video: Option<MediaAsset> = None;
    let mut audio: Option<MediaAsset> = None;
    let mut mode = None;
    let mut delivery = None;
    let mut portrait = false;

    while let Some(mut field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();

        match name.as_str() {
            "video" | "audio" => {
                let kind = if name == "video" {
                    MediaKind::Video
                } else {
                    MediaKind::Audio
                };
                let slot = match kind {
                    MediaKind::Video => &mut video,
                    MediaKind::Audio => &mut audio,
                };
                if slot.is_some() {
                    return Err(Error::Validation(format!("Only one {kind} file is allowed")));
                }

                let original_name = field.file_name().unwrap_or_default().to_string();
                let content_type = field.content_type().map(str::to_string);
                if !accepts(kind, content_type.as_deref(), &original_name) {
                    return Err(Error::Validation(format!(
                        "Only {} files are allowed for {kind}",
                        kind.format_label()
                    )));
                }

                let path = staging_path(&storage.upload_dir, kind, &original_name);
                staged_paths.register(&path);
                let size = stage_field(&mut field, &path, kind, storage.max_upload_bytes).await?;

                tracing::debug!(
                    "Staged {kind} upload {original_name} ({size} bytes) at {}",
                    path.display()
                );
                *slot = Some(MediaAsset::new(path, kind, original_name, size));
            }
            "mode" => {
                let text = field.text().await.map_err(multipart_error)?;
                if !text.trim().is_empty() {
                    mode = Some(text.parse::<CombinationMode>()?);
                }
            }
            "delivery" => {
                let text = field.text().await.map_err(multipart_error)?;
                if !text.trim().is_empty() {
                    delivery = Some(text.parse::<DeliveryMode>()?);
                }
            }
            "portrait" => {
                let text = field.text().await.map_err(multipart_error)?;
                portrait = parse_flag(&text);
            }
            other if field.file_name().is_some() => {
                return Err(Error::Validation(format!("Unexpected field '{other}'")));
            }
            other => {
                tracing::debug!("Ignoring form field '{other}'");
            }
        }
    }

    let (Some(video), Some(audio)) = (video, audio) else {
        return Err(Error::Validation(
            "Both video (MP4) and audio (MP3) files are required".into(),
        ));
    };

    // Ownership of the staged files moves to the caller.
    staged_paths.release();

    Ok(ProcessForm {
        staged: StagedFiles { video, audio },
        mode,
        delivery,
        portrait,
    })
}

/// Whether a file field is acceptable for `kind`, by content type or by
/// file extension.
fn accepts(kind: MediaKind, content_type: Option<&str>, file_name: &str) -> bool {
    let by_type = content_type
        .map(|ct| ct.split(';').next().unwrap_or(ct).trim().to_ascii_lowercase())
        .is_some_and(|ct| kind.accepted_content_types().contains(&ct.as_str()));
    by_type || kind.matches_extension(file_name)
}

/// `<upload_dir>/<uuid><ext>`, keeping the client's extension when it has one.
fn staging_path(upload_dir: &Path, kind: MediaKind, original_name: &str) -> PathBuf {
    let ext = Path::new(original_name)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty() && e.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_else(|| kind.expected_extension().to_string());
    upload_dir.join(format!("{}.{ext}", UploadId::new()))
}

async fn stage_field(
    field: &mut Field<'_>,
    path: &Path,
    kind: MediaKind,
    limit: u64,
) -> mm_core::Result<u64> {
    let mut file = tokio::fs::File::create(path).await?;
    let mut written: u64 = 0;

    while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
        written += chunk.len() as u64;
        if written > limit {
            return Err(Error::PayloadTooLarge(format!(
                "{} file exceeds the maximum upload size of {} MB",
                kind.format_label(),
                limit / 1024 / 1024
            )));
        }
        file.write_all(&chunk).await?;
    }
    file.flush().await?;
    Ok(written)
}

fn parse_flag(text: &str) -> bool {
    let text = text.trim();
    !text.is_empty() && !text.eq_ignore_ascii_case("false") && text != "0"
}

fn multipart_error(e: MultipartError) -> Error {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        Error::PayloadTooLarge(e.body_text())
    } else {
        Error::Validation(format!("Failed to read multipart body: {}", e.body_text()))
    }
}
