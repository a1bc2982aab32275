//! CLI parse: clap types for tabrelay. No behavior; definitions only.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Tabrelay CLI - agent injection and content relay
#[derive(Parser)]
#[command(name = "tabrelay")]
#[command(about = "Inject agents into execution contexts and relay their content")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file path (layered over defaults and the global file)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging (default: off)
    #[arg(long, default_value = "false")]
    pub verbose: bool,

    /// Disable logging entirely
    #[arg(long, default_value = "false")]
    pub quiet: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    pub log_format: Option<String>,

    /// Log output (stdout, stderr, file)
    #[arg(long)]
    pub log_output: Option<String>,

    /// Log file path (if output is "file")
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print the effective configuration as TOML
    Config,
    /// Report which URLs the denylist excludes
    Check {
        /// URLs to check
        #[arg(required = true)]
        urls: Vec<String>,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Run a sweep, a scrape and a URL listing against an in-memory host
    Demo,
}
