//! Locating ffmpeg and ffprobe.
//!
//! [`ToolRegistry`] resolves where the two binaries live once at startup and
//! hands out probers and engines pointed at them.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use mm_core::config::ToolsConfig;
use serde::{Deserialize, Serialize};

use crate::command::ToolCommand;
use crate::engine::FfmpegEngine;
use crate::probe::FfprobeProber;

/// Binaries the combination pipeline drives.
pub const KNOWN_TOOLS: &[&str] = &["ffmpeg", "ffprobe"];

/// Deadline for a `-version` check.
pub(crate) const VERSION_CHECK_TIMEOUT: Duration = Duration::from_secs(10);

/// A resolved binary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolConfig {
    pub name: String,
    pub path: PathBuf,
}

/// Availability report for one binary, as served by `GET /api/tools`.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct ToolInfo {
    pub name: String,
    /// True when `<tool> -version` exits cleanly.
    pub available: bool,
    /// First line printed by `-version`.
    pub version: Option<String>,
    #[schema(value_type = Option<String>)]
    pub path: Option<PathBuf>,
}

/// Resolved ffmpeg/ffprobe locations keyed by tool name.
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, ToolConfig>,
}

impl ToolRegistry {
    /// Resolve every known tool. A configured override wins when it points
    /// at an existing file; otherwise `PATH` is searched. Unresolved tools
    /// are left out.
    pub fn discover(tools_config: &ToolsConfig) -> Self {
        let tools = KNOWN_TOOLS
            .iter()
            .filter_map(|&name| {
                let configured = match name {
                    "ffmpeg" => tools_config.ffmpeg_path.as_deref(),
                    _ => tools_config.ffprobe_path.as_deref(),
                };
                resolve_tool(name, configured).map(|path| {
                    tracing::debug!("Resolved {name} at {}", path.display());
                    (
                        name.to_string(),
                        ToolConfig {
                            name: name.to_string(),
                            path,
                        },
                    )
                })
            })
            .collect();

        Self { tools }
    }

    /// Build a registry from explicit paths, skipping discovery.
    pub fn with_paths(entries: impl IntoIterator<Item = (&'static str, PathBuf)>) -> Self {
        let tools = entries
            .into_iter()
            .map(|(name, path)| {
                (
                    name.to_string(),
                    ToolConfig {
                        name: name.to_string(),
                        path,
                    },
                )
            })
            .collect();
        Self { tools }
    }

    /// The resolved entry for `name`, or [`mm_core::Error::Tool`] when
    /// discovery did not find it.
    pub fn require(&self, name: &str) -> mm_core::Result<&ToolConfig> {
        self.tools.get(name).ok_or_else(|| {
            mm_core::Error::tool(name, format!("{name} not found; is it installed and in PATH?"))
        })
    }

    /// Resolved path for `name`, or the bare name so that a later spawn
    /// fails (and is classified) at the point of use.
    pub fn path_or_name(&self, name: &str) -> PathBuf {
        self.tools
            .get(name)
            .map(|cfg| cfg.path.clone())
            .unwrap_or_else(|| PathBuf::from(name))
    }

    /// An ffprobe-backed duration prober.
    pub fn prober(&self, timeout: Duration) -> FfprobeProber {
        FfprobeProber::new(self.path_or_name("ffprobe")).with_timeout(timeout)
    }

    /// An ffmpeg-backed engine.
    pub fn engine(&self, timeout: Duration) -> FfmpegEngine {
        FfmpegEngine::new(self.path_or_name("ffmpeg")).with_timeout(timeout)
    }

    /// Run `-version` against every known tool, one after the other.
    pub async fn check_all(&self) -> Vec<ToolInfo> {
        let mut infos = Vec::with_capacity(KNOWN_TOOLS.len());
        for &name in KNOWN_TOOLS {
            let info = match self.tools.get(name) {
                Some(cfg) => {
                    let version = detect_version(&cfg.path, VERSION_CHECK_TIMEOUT).await;
                    ToolInfo {
                        name: name.to_string(),
                        available: version.is_some(),
                        version,
                        path: Some(cfg.path.clone()),
                    }
                }
                None => ToolInfo {
                    name: name.to_string(),
                    available: false,
                    version: None,
                    path: None,
                },
            };
            infos.push(info);
        }
        infos
    }
}

fn resolve_tool(name: &str, configured: Option<&Path>) -> Option<PathBuf> {
    match configured {
        Some(p) if p.exists() => Some(p.to_path_buf()),
        Some(p) => {
            tracing::warn!(
                "Configured {name} path {} does not exist; searching PATH",
                p.display()
            );
            which::which(name).ok()
        }
        None => which::which(name).ok(),
    }
}

/// First stdout line of `<tool> -version`; `None` on spawn failure, a
/// non-zero exit or a hung binary.
async fn detect_version(path: &Path, timeout: Duration) -> Option<String> {
    let mut cmd = ToolCommand::new(path.to_path_buf());
    cmd.arg("-version").timeout(timeout);

    match cmd.execute().await {
        Ok(output) => output.stdout.lines().next().map(str::to_string),
        Err(e) => {
            tracing::debug!("{} -version failed: {e}", path.display());
            None
        }
    }
}
