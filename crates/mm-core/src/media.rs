//! Media-domain enums and records shared by intake, orchestration and the
//! engine wrappers.
//!
//! Enums serialize in kebab-case and implement `Display` manually so that
//! the wire names used by the HTTP form fields, the CLI and the JSON config
//! are all the same string.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::Error;

// ---------------------------------------------------------------------------
// MediaKind
// ---------------------------------------------------------------------------

/// Declared role of a staged file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Video,
    Audio,
}

impl MediaKind {
    /// File extension (without the dot) a file of this kind must carry.
    pub fn expected_extension(self) -> &'static str {
        match self {
            Self::Video => "mp4",
            Self::Audio => "mp3",
        }
    }

    /// Content types accepted at intake for this kind.
    pub fn accepted_content_types(self) -> &'static [&'static str] {
        match self {
            Self::Video => &["video/mp4"],
            Self::Audio => &["audio/mpeg", "audio/mp3"],
        }
    }

    /// Whether `file_name` ends in this kind's extension (case-insensitive).
    pub fn matches_extension(self, file_name: &str) -> bool {
        Path::new(file_name)
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case(self.expected_extension()))
    }

    /// Human-readable format label used in user-facing messages.
    pub fn format_label(self) -> &'static str {
        match self {
            Self::Video => "MP4",
            Self::Audio => "MP3",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Video => write!(f, "video"),
            Self::Audio => write!(f, "audio"),
        }
    }
}

// ---------------------------------------------------------------------------
// CombinationMode
// ---------------------------------------------------------------------------

/// How the two streams are reconciled and which visual treatment is applied.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, utoipa::ToSchema,
)]
#[serde(rename_all = "kebab-case")]
pub enum CombinationMode {
    /// Trim to the shorter stream; bouncing video with a spectrum strip.
    #[default]
    StandardSync,
    /// Trim to the shorter stream; scrolling spectrum band along the bottom.
    SpectrumOverlay,
    /// Trim to the shorter stream; frequency bar graph along the bottom.
    FrequencyBarsOverlay,
    /// Trim to the shorter stream; colour-inverted video.
    InvertedColor,
    /// Loop a short video up to the audio length, or trim a long one to it.
    LoopOrTrim,
    /// Trim to the shorter stream; letterbox into a 9:16 frame.
    PortraitPad,
}

impl CombinationMode {
    /// Every mode, in declaration order.
    pub const ALL: [CombinationMode; 6] = [
        Self::StandardSync,
        Self::SpectrumOverlay,
        Self::FrequencyBarsOverlay,
        Self::InvertedColor,
        Self::LoopOrTrim,
        Self::PortraitPad,
    ];

    /// Wire name of the mode.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::StandardSync => "standard-sync",
            Self::SpectrumOverlay => "spectrum-overlay",
            Self::FrequencyBarsOverlay => "frequency-bars-overlay",
            Self::InvertedColor => "inverted-color",
            Self::LoopOrTrim => "loop-or-trim",
            Self::PortraitPad => "portrait-pad",
        }
    }
}

impl fmt::Display for CombinationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CombinationMode {
    type Err = Error;

    /// Accepts kebab-case, snake_case and CamelCase spellings.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .map(|c| c.to_ascii_lowercase())
            .collect();

        Self::ALL
            .into_iter()
            .find(|mode| mode.as_str().replace('-', "") == normalized)
            .ok_or_else(|| {
                let valid: Vec<&str> = Self::ALL.iter().map(|m| m.as_str()).collect();
                Error::Validation(format!(
                    "unknown combination mode '{}' (valid: {})",
                    s.trim(),
                    valid.join(", ")
                ))
            })
    }
}

// ---------------------------------------------------------------------------
// DeliveryMode
// ---------------------------------------------------------------------------

/// Whether a run's output is returned inline or kept on disk.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, utoipa::ToSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryMode {
    /// Read the output into memory and return the bytes.
    #[default]
    Immediate,
    /// Leave the output in storage and return a reference to it.
    Deferred,
}

impl fmt::Display for DeliveryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Immediate => write!(f, "immediate"),
            Self::Deferred => write!(f, "deferred"),
        }
    }
}

impl FromStr for DeliveryMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "immediate" => Ok(Self::Immediate),
            "deferred" => Ok(Self::Deferred),
            other => Err(Error::Validation(format!(
                "unknown delivery mode '{other}' (valid: immediate, deferred)"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// A file staged on local storage for exactly one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MediaAsset {
    /// Unique location of the staged bytes.
    pub path: PathBuf,
    /// Role the uploader declared for this file.
    pub kind: MediaKind,
    /// File name as supplied by the client.
    pub original_name: String,
    /// Staged size in bytes.
    pub size: u64,
}

impl MediaAsset {
    pub fn new(
        path: impl Into<PathBuf>,
        kind: MediaKind,
        original_name: impl Into<String>,
        size: u64,
    ) -> Self {
        Self {
            path: path.into(),
            kind,
            original_name: original_name.into(),
            size,
        }
    }

    /// Base name of the client-supplied file name, with any directory
    /// components the client sent stripped off.
    pub fn original_basename(&self) -> &str {
        self.original_name
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or(&self.original_name)
    }
}

/// Probed duration of a media file.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize)]
pub struct DurationInfo {
    pub seconds: f64,
}

impl DurationInfo {
    /// Returns `None` unless `seconds` is finite and non-negative.
    pub fn new(seconds: f64) -> Option<Self> {
        (seconds.is_finite() && seconds >= 0.0).then_some(Self { seconds })
    }
}

/// The pair of staged uploads handed from intake to the orchestrator.
///
/// Ownership of both staged paths travels with this value: whoever holds it
/// is responsible for deleting the files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedFiles {
    pub video: MediaAsset,
    pub audio: MediaAsset,
}

impl StagedFiles {
    /// Staged paths in engine input order (video first).
    pub fn paths(&self) -> [&Path; 2] {
        [self.video.path.as_path(), self.audio.path.as_path()]
    }
}
