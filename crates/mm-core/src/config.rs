//! JSON configuration.
//!
//! Five sections (`server`, `storage`, `tools`, `engine`, `combine`), each
//! `#[serde(default)]`, so `{}` is a complete configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Result;
use crate::media::{CombinationMode, DeliveryMode};
use crate::Error;

/// Default per-file upload limit: 500 MiB.
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 500 * 1024 * 1024;

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub tools: ToolsConfig,
    pub engine: EngineConfig,
    pub combine: CombineConfig,
}

impl Config {
    /// Parse a JSON document. Malformed input is a validation error.
    pub fn from_json(json_str: &str) -> Result<Self> {
        serde_json::from_str(json_str)
            .map_err(|e| Error::Validation(format!("invalid config JSON: {e}")))
    }

    /// Best-effort load used by the server and CLI: any problem with the
    /// file is logged and the defaults are used instead.
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };

        let loaded = std::fs::read_to_string(path)
            .map_err(Error::from)
            .and_then(|contents| Self::from_json(&contents));

        match loaded {
            Ok(config) => {
                tracing::info!("Loaded config from {}", path.display());
                config
            }
            Err(Error::Io { source }) if source.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("Config file {} not found; using defaults", path.display());
                Self::default()
            }
            Err(e) => {
                tracing::warn!("Ignoring config file {}: {e}", path.display());
                Self::default()
            }
        }
    }

    /// Load configuration strictly: a missing or malformed file is an error.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    /// Settings that load fine but will misbehave at runtime.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.server.port == 0 {
            warnings.push("server.port is 0; the OS will pick a port".into());
        }

        if self.storage.max_upload_bytes == 0 {
            warnings.push("storage.max_upload_bytes is 0; every upload will be rejected".into());
        }

        if self.storage.retention_hours == 0 {
            warnings.push(
                "storage.retention_hours is 0; the sweep will delete every stored file".into(),
            );
        }

        if self.engine.timeout_secs == 0 {
            warnings.push("engine.timeout_secs is 0; every combination will time out".into());
        }

        if self.engine.probe_timeout_secs == 0 {
            warnings.push("engine.probe_timeout_secs is 0; every probe will time out".into());
        }

        if self.engine.video_crf > 51 {
            warnings.push(format!(
                "engine.video_crf {} is outside the x264 range 0-51",
                self.engine.video_crf
            ));
        }

        let presets = [
            "ultrafast",
            "superfast",
            "veryfast",
            "faster",
            "fast",
            "medium",
            "slow",
            "slower",
            "veryslow",
        ];
        if !presets.contains(&self.engine.video_preset.as_str()) {
            warnings.push(format!(
                "engine.video_preset '{}' is not a recognized x264 preset (valid: {})",
                self.engine.video_preset,
                presets.join(", ")
            ));
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Directory of static UI assets served as the router fallback.
    pub static_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 5001,
            static_dir: Some(PathBuf::from("public")),
        }
    }
}

/// Upload staging, intermediate output and persisted output locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub upload_dir: PathBuf,
    pub temp_dir: PathBuf,
    pub output_dir: PathBuf,
    pub max_upload_bytes: u64,
    /// Stored outputs older than this are removed by the sweep.
    pub retention_hours: u64,
    /// Background sweep period; `0` disables the sweeper task.
    pub sweep_interval_secs: u64,
}

impl StorageConfig {
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_hours * 3600)
    }

    /// Create every storage directory that does not exist yet.
    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [&self.upload_dir, &self.temp_dir, &self.output_dir] {
            if !dir.exists() {
                std::fs::create_dir_all(dir)?;
                tracing::info!("Created directory {}", dir.display());
            }
        }
        Ok(())
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            upload_dir: PathBuf::from("uploads"),
            temp_dir: PathBuf::from("temp"),
            output_dir: PathBuf::from("output"),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            retention_hours: 24,
            sweep_interval_secs: 3600,
        }
    }
}

/// Paths to external CLI tools.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub ffmpeg_path: Option<PathBuf>,
    pub ffprobe_path: Option<PathBuf>,
}

/// Engine invocation limits and encoding defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub timeout_secs: u64,
    pub probe_timeout_secs: u64,
    pub video_preset: String,
    pub video_crf: u32,
    pub audio_codec: String,
}

impl EngineConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 3600,
            probe_timeout_secs: 30,
            video_preset: "fast".into(),
            video_crf: 23,
            audio_codec: "aac".into(),
        }
    }
}

/// Defaults applied when a request does not choose explicitly.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CombineConfig {
    pub default_mode: CombinationMode,
    pub default_delivery: DeliveryMode,
}
