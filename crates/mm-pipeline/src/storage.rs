//! The persisted output directory: listing, lookup by name and the retention
//! sweep.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};
use mm_core::Error;
use serde::Serialize;

/// One stored output, as exposed by the listing endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, utoipa::ToSchema)]
pub struct StoredFileEntry {
    pub filename: String,
    pub size: u64,
    #[schema(value_type = String, format = DateTime)]
    pub created: DateTime<Utc>,
    pub download_url: String,
}

/// Flat directory of combined outputs.
#[derive(Debug, Clone)]
pub struct OutputStore {
    dir: PathBuf,
}

impl OutputStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Every stored `.mp4`, newest first.
    pub async fn list(&self) -> mm_core::Result<Vec<StoredFileEntry>> {
        let mut entries = Vec::new();
        let mut dir = tokio::fs::read_dir(&self.dir).await?;

        while let Some(entry) = dir.next_entry().await? {
            let filename = entry.file_name().to_string_lossy().into_owned();
            if !is_mp4(&filename) {
                continue;
            }
            let meta = match entry.metadata().await {
                Ok(meta) if meta.is_file() => meta,
                Ok(_) => continue,
                Err(e) => {
                    tracing::warn!("Skipping {filename}: {e}");
                    continue;
                }
            };

            let created = meta
                .created()
                .or_else(|_| meta.modified())
                .map(DateTime::<Utc>::from)
                .unwrap_or_else(|_| Utc::now());

            entries.push(StoredFileEntry {
                download_url: download_url(&filename),
                filename,
                size: meta.len(),
                created,
            });
        }

        entries.sort_by(|a, b| b.created.cmp(&a.created).then_with(|| a.filename.cmp(&b.filename)));
        Ok(entries)
    }

    /// Path of the stored file `name`.
    ///
    /// `name` must be a bare file name; separators and `..` are rejected with
    /// [`Error::Validation`]. A name with no matching file is
    /// [`Error::NotFound`].
    pub async fn resolve(&self, name: &str) -> mm_core::Result<PathBuf> {
        if name.is_empty()
            || name == "."
            || name == ".."
            || name.contains(['/', '\\', '\0'])
            || name.contains("..")
        {
            return Err(Error::Validation(format!("Invalid filename '{name}'")));
        }

        let path = self.dir.join(name);
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Ok(path),
            Ok(_) => Err(Error::not_found("file", name)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::not_found("file", name))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Delete stored files last modified more than `max_age` ago. Returns
    /// the number deleted; individual failures are logged and skipped.
    pub async fn sweep(&self, max_age: Duration) -> mm_core::Result<usize> {
        let cutoff = SystemTime::now()
            .checked_sub(max_age)
            .unwrap_or(SystemTime::UNIX_EPOCH);

        let mut deleted = 0;
        let mut dir = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            let Ok(meta) = entry.metadata().await else {
                continue;
            };
            if !meta.is_file() {
                continue;
            }
            let Ok(modified) = meta.modified() else {
                continue;
            };
            if modified >= cutoff {
                continue;
            }

            match tokio::fs::remove_file(&path).await {
                Ok(()) => {
                    tracing::info!("Deleted old file: {}", path.display());
                    deleted += 1;
                }
                Err(e) => tracing::warn!("Failed to delete {}: {e}", path.display()),
            }
        }
        Ok(deleted)
    }
}

fn is_mp4(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("mp4"))
}

/// Public download route for a stored file.
pub fn download_url(filename: &str) -> String {
    format!("/api/download/{filename}")
}
