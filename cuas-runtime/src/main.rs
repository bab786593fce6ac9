use std::time::Duration;

use clap::Parser;
use cuas_runtime::{Cli, Session};
use miette::{IntoDiagnostic, Result};
use tokio_graceful_shutdown::Toplevel;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    env_logger::Builder::new().filter_level(args.verbose.log_level_filter()).init();

    log::info!("cuas-runtime {} starting", cuas_runtime::VERSION);

    Toplevel::new(|s| async move {
        if let Err(e) = Session::new(&s, args).await {
            log::error!("failed to start session: {e}");
        }
    })
    .catch_signals()
    .handle_shutdown_requests(Duration::from_secs(5))
    .await
    .into_diagnostic()?;

    Ok(())
}
