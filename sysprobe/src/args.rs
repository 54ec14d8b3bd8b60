//! CLI argument parsing.

use std::path::PathBuf;

use clap::Parser;

/// Command line arguments of the `sysprobe` binary.
#[derive(Parser, Debug, Clone)]
#[command(name = "sysprobe", version, about = "Host metric sources agent")]
pub struct AgentArgs {
    /// Path to configuration file.
    #[arg(short, long, default_value = "sysprobe.json5")]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Run a single collection round and exit.
    #[arg(long)]
    pub once: bool,
}
