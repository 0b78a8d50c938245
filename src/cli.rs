//! Command-line interface for stemwerk
//!
//! Provides argument parsing using clap derive macros.

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

/// Split songs into stems
#[derive(Parser, Debug)]
#[command(name = "stemwerk", version, about = "Split songs into stems")]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Suppress output (quiet mode)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose output (-v: info logs, -vv: debug logs)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Parse a duration into seconds.
///
/// Accepts bare numbers (seconds, fractions allowed) and any format
/// `humantime` understands (`10s`, `500ms`, `1m30s`).
fn parse_secs(s: &str) -> Result<f64, String> {
    let s = s.trim();
    if let Ok(secs) = s.parse::<f64>() {
        return Ok(secs);
    }
    humantime::parse_duration(s)
        .map(|d| d.as_secs_f64())
        .map_err(|e| e.to_string())
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Separate a WAV file into stems
    Separate {
        /// Input WAV file, or - to read from stdin
        #[arg(value_name = "INPUT")]
        input: String,

        /// Number of stems the model produces (2 or 4)
        #[arg(long, short = 's', value_name = "N")]
        stems: Option<u32>,

        /// Stems to write, comma-separated (default: all)
        #[arg(long, value_name = "STEMS", value_delimiter = ',')]
        select: Vec<String>,

        /// Directory to write stems into (default: ./<input>_stems)
        #[arg(long, short = 'o', value_name = "DIR", conflicts_with = "tree")]
        output_dir: Option<PathBuf>,

        /// Write through a storage tree rooted at DIR (replace-by-recreate)
        #[arg(long, value_name = "DIR")]
        tree: Option<PathBuf>,

        /// Skip model download and run the passthrough separator
        #[arg(long)]
        no_model: bool,

        /// Inference segment length (default: 10s). Examples: 10, 7.5s, 8000ms
        #[arg(long, value_name = "DURATION", value_parser = parse_secs)]
        segment: Option<f64>,

        /// Overlap between segments (default: 1s)
        #[arg(long, value_name = "DURATION", value_parser = parse_secs)]
        overlap: Option<f64>,
    },

    /// Manage separation models
    Models {
        /// Action to perform
        #[command(subcommand)]
        action: ModelsAction,
    },

    /// Show configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}

/// Configuration actions
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show the effective configuration (file + environment)
    Show,
    /// Print the configuration file path
    Path,
    /// Dump the default configuration as TOML
    Dump,
}

/// Model management actions
#[derive(Subcommand, Debug)]
pub enum ModelsAction {
    /// List installed model files
    List,
    /// Download and verify the model for a stem count
    Install {
        /// Number of stems (default: from config)
        #[arg(long, short = 's', value_name = "N")]
        stems: Option<u32>,
    },
    /// Show the published model manifest
    Manifest,
    /// Delete all downloaded models
    Clear,
}
