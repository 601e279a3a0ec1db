//! Command-line argument parsing.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use uuid::Uuid;

/// limiquantix prlprobe - Parallels adapter inspection tool
#[derive(Parser, Debug)]
#[command(name = "prlprobe")]
#[command(about = "limiquantix prlprobe - Parallels adapter inspection tool")]
#[command(version)]
pub struct Args {
    /// Path to configuration file (optional, defaults used if not found)
    #[arg(short, long, env = "PRLPROBE_CONFIG")]
    pub config: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, env = "PRLPROBE_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Log output format (pretty, json)
    #[arg(long)]
    pub log_format: Option<String>,

    /// Job wait timeout in milliseconds
    #[arg(long, env = "PRLPROBE_JOB_TIMEOUT_MS")]
    pub job_timeout_ms: Option<u64>,

    /// Domain inventory loaded into the mock SDK
    #[arg(short, long)]
    pub inventory: Option<PathBuf>,

    /// Override the detected host logical CPU count
    #[arg(long)]
    pub host_cpus: Option<usize>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Load every domain and print a summary line for each
    List,
    /// Load one domain and print its record as JSON
    Show {
        uuid: Uuid,
    },
    /// Load one domain, refresh it in place and print the refreshed record
    Refresh {
        uuid: Uuid,
    },
}
