//! sysprobe agent.
//!
//! Runs the configured metric sources every poll interval and writes the
//! resulting envelopes to stdout.

use anyhow::{Context, Result};
use clap::Parser;
use sysprobe::{AgentArgs, AgentRunner, SysprobeConfig};
use sysprobe_common::init_tracing;

#[tokio::main]
async fn main() -> Result<()> {
    let args = AgentArgs::parse();

    let config = SysprobeConfig::load_from_file(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;

    // CLI log level wins over the file
    let mut logging = config.base.logging.clone();
    if let Some(level) = &args.log_level {
        logging.level = level.clone();
    }
    init_tracing(&logging)?;

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting sysprobe");

    let mut runner = AgentRunner::new(config);

    if args.once {
        let report = runner.run_once().await?;
        tracing::info!(
            sources = report.launched,
            envelopes = report.envelopes.len(),
            cancelled = report.cancelled,
            "Single round complete"
        );
        return Ok(());
    }

    runner.run().await?;
    Ok(())
}
