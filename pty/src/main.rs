mod core;
mod utils;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use xsh_core::{AiClient, Config};

use crate::core::Session;
use crate::utils::logging;

/// Blocking tasks parked in a FIFO open must not hold up process exit.
const SHUTDOWN_GRACE: Duration = Duration::from_millis(100);

#[derive(Parser)]
#[command(name = "xsh")]
#[command(about = "Runs your shell inside a PTY with an AI command assistant on a key binding", long_about = None)]
#[command(version)]
struct Cli {}

fn main() -> Result<()> {
    Cli::parse();

    let config = Config::from_env().context("Failed to load config")?;
    logging::init(&config.log);

    let assistant = AiClient::new(&config).context("Failed to create AI client")?;
    let session = Session::new(config, Arc::new(assistant))?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start runtime")?;

    let result = runtime.block_on(session.run());
    runtime.shutdown_timeout(SHUTDOWN_GRACE);

    result?;
    Ok(())
}
