mod cli;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use mm_av::{
    DurationProber, EncodeProfile, EngineProgress, FilterGraphBuilder, MediaEngine, ToolRegistry,
};
use mm_core::config::Config;
use mm_core::{CombinationMode, DeliveryMode, MediaAsset, MediaKind, StagedFiles};
use mm_pipeline::{CombinationOrchestrator, CombinationResult, OutputStore};
use tokio_util::sync::CancellationToken;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG if set, otherwise pick defaults based on --verbose.
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "mediamix=trace,mm_core=trace,mm_av=trace,mm_pipeline=trace,mm_server=trace,tower_http=debug"
                .to_string()
        } else {
            "mediamix=debug,mm_core=debug,mm_av=debug,mm_pipeline=debug,mm_server=debug,tower_http=info"
                .to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .init();

    match cli.command {
        Commands::Start { host, port } => {
            let mut config = Config::load_or_default(cli.config.as_deref());
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(mm_server::start(config))?;
            Ok(())
        }
        Commands::Combine {
            video,
            audio,
            mode,
            output,
        } => {
            let config = Config::load_or_default(cli.config.as_deref());
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(combine_files(config, &video, &audio, mode, output))
        }
        Commands::Probe { file, json } => {
            let config = Config::load_or_default(cli.config.as_deref());
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(probe_file(config, &file, json))
        }
        Commands::CheckTools => {
            let config = Config::load_or_default(cli.config.as_deref());
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(check_tools(&config))
        }
        Commands::Sweep => {
            let config = Config::load_or_default(cli.config.as_deref());
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(sweep_outputs(config))
        }
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("mediamix {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

/// Copy a local input into the upload directory so the run may delete it.
async fn stage_copy(upload_dir: &Path, source: &Path, kind: MediaKind) -> Result<MediaAsset> {
    if !source.is_file() {
        anyhow::bail!("Input file does not exist: {}", source.display());
    }
    if !kind.matches_extension(&source.to_string_lossy()) {
        anyhow::bail!(
            "Only {} files are allowed for {kind}: {}",
            kind.format_label(),
            source.display()
        );
    }

    let staged = upload_dir.join(format!(
        "{}.{}",
        mm_core::UploadId::new(),
        kind.expected_extension()
    ));
    let size = tokio::fs::copy(source, &staged)
        .await
        .with_context(|| format!("Failed to stage {}", source.display()))?;

    let original_name = source
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    Ok(MediaAsset::new(staged, kind, original_name, size))
}

async fn combine_files(
    config: Config,
    video: &Path,
    audio: &Path,
    mode: Option<CombinationMode>,
    output: Option<PathBuf>,
) -> Result<()> {
    config.storage.ensure_dirs()?;

    let tools = ToolRegistry::discover(&config.tools);
    tools.require("ffmpeg")?;
    tools.require("ffprobe")?;

    let prober: Arc<dyn DurationProber> = Arc::new(tools.prober(config.engine.probe_timeout()));
    let engine: Arc<dyn MediaEngine> = Arc::new(tools.engine(config.engine.timeout()));
    let orchestrator = CombinationOrchestrator::new(
        prober,
        engine,
        FilterGraphBuilder::new(EncodeProfile::from(&config.engine)),
        config.storage.temp_dir.clone(),
        config.storage.output_dir.clone(),
    );

    let video_asset = stage_copy(&config.storage.upload_dir, video, MediaKind::Video).await?;
    let audio_asset = match stage_copy(&config.storage.upload_dir, audio, MediaKind::Audio).await {
        Ok(asset) => asset,
        Err(e) => {
            let _ = tokio::fs::remove_file(&video_asset.path).await;
            return Err(e);
        }
    };
    let staged = StagedFiles {
        video: video_asset,
        audio: audio_asset,
    };

    let mode = mode.unwrap_or(config.combine.default_mode);
    println!("Combining {} + {} ({mode})", video.display(), audio.display());

    let cancel = CancellationToken::new();
    let ctrl_c_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted; cancelling run");
            ctrl_c_cancel.cancel();
        }
    });

    let observer = |p: &EngineProgress| {
        tracing::info!("Progress: {:.1}% ({})", p.percent, p.timemark);
    };

    let result = orchestrator
        .combine(staged, mode, DeliveryMode::Immediate, &observer, &cancel)
        .await?;

    match result {
        CombinationResult::BinaryPayload { bytes, public_name } => {
            let target = output.unwrap_or_else(|| PathBuf::from(&public_name));
            tokio::fs::write(&target, &bytes)
                .await
                .with_context(|| format!("Failed to write {}", target.display()))?;
            println!("Wrote {} ({} bytes)", target.display(), bytes.len());
        }
        CombinationResult::StoredFile { path, .. } => {
            println!("Output stored at {}", path.display());
        }
    }

    Ok(())
}

async fn probe_file(config: Config, file: &Path, json: bool) -> Result<()> {
    if !file.exists() {
        anyhow::bail!("File does not exist: {}", file.display());
    }

    let tools = ToolRegistry::discover(&config.tools);
    tools.require("ffprobe")?;
    let prober = tools.prober(config.engine.probe_timeout());
    let info = prober.probe(file).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&info)?);
    } else {
        let total = info.seconds;
        let whole = total as u64;
        println!("File: {}", file.display());
        println!(
            "Duration: {:02}:{:02}:{:02} ({total:.3}s)",
            whole / 3600,
            (whole / 60) % 60,
            whole % 60
        );
    }

    Ok(())
}

async fn check_tools(config: &Config) -> Result<()> {
    let tools = ToolRegistry::discover(&config.tools);
    let mut missing = 0;

    println!("Checking external tools...\n");
    for info in tools.check_all().await {
        if info.available {
            println!(
                "  [OK] {} - {}",
                info.name,
                info.version.as_deref().unwrap_or("unknown version")
            );
            if let Some(path) = &info.path {
                println!("       {}", path.display());
            }
        } else {
            missing += 1;
            println!("  [MISSING] {}", info.name);
        }
    }

    println!();
    if missing > 0 {
        anyhow::bail!("{missing} required tool(s) not found");
    }
    println!("All tools available.");
    Ok(())
}

async fn sweep_outputs(config: Config) -> Result<()> {
    let store = OutputStore::new(config.storage.output_dir.clone());
    let deleted = store.sweep(config.storage.retention()).await?;
    println!(
        "Cleaned up {deleted} old files from {}",
        config.storage.output_dir.display()
    );
    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    let config = match path {
        Some(path) => {
            println!("Validating {}", path.display());
            Config::load(path)?
        }
        None => {
            println!("No config file given; validating defaults");
            Config::default()
        }
    };

    let warnings = config.validate();
    if warnings.is_empty() {
        println!("Configuration is valid.");
    } else {
        for warning in &warnings {
            println!("  warning: {warning}");
        }
        println!("Configuration loaded with {} warning(s).", warnings.len());
    }
    Ok(())
}
