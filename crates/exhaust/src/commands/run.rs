//! `exhaust run`: the long-lived scheduler.

use exhaust_core::Controller;
use tracing::{info, warn};

use crate::cli::GlobalOpts;
use crate::config;
use crate::error::CliError;

pub async fn handle(global: &GlobalOpts) -> Result<(), CliError> {
    let runtime = config::runtime(global)?;
    let controller = Controller::new(runtime)?;

    let report = controller.start().await;
    if !report.init_failed.is_empty() {
        warn!(modules = ?report.init_failed, "some modules failed initialization, retrying every tick");
    }
    info!(
        state = ?controller.store().path(),
        tracked = controller.store().len().await,
        "exhaust controller running, Ctrl-C to stop"
    );

    tokio::signal::ctrl_c().await?;

    info!("shutting down");
    controller.shutdown().await;
    Ok(())
}
