use clap::{Parser, Subcommand};
use mm_core::CombinationMode;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "mediamix")]
#[command(author, version, about = "Combine a video and an audio track into an audio-reactive MP4")]
pub struct Cli {
    /// Path to config file (JSON)
    #[arg(short, long, global = true, env = "MEDIAMIX_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP server
    Start {
        /// Host to bind to (overrides config)
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on (overrides config)
        #[arg(short, long, env = "PORT")]
        port: Option<u16>,
    },

    /// Combine a local video and audio file
    Combine {
        /// MP4 video input
        #[arg(required = true)]
        video: PathBuf,

        /// MP3 audio input
        #[arg(required = true)]
        audio: PathBuf,

        /// Combination mode (defaults to the configured mode)
        #[arg(short, long)]
        mode: Option<CombinationMode>,

        /// Output file (defaults to processed_<video name> in the current directory)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the duration of a media file
    Probe {
        /// File to probe
        #[arg(required = true)]
        file: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check that ffmpeg and ffprobe are available
    CheckTools,

    /// Delete stored outputs older than the retention window
    Sweep,

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses --config if not specified)
        config: Option<PathBuf>,
    },

    /// Display version information
    Version,
}
