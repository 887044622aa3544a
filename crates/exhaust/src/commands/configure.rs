//! `exhaust configure`: raw command passthrough to one module.

use exhaust_core::Controller;

use crate::cli::{ConfigureArgs, GlobalOpts};
use crate::config;
use crate::error::CliError;
use crate::output;

pub async fn handle(args: ConfigureArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let controller = Controller::read_only(config::runtime(global)?)?;
    let response = controller
        .configure_module(&args.module, &args.command)
        .await?;

    // The device reply is free-form JSON; table mode shows it pretty-printed.
    let out = output::render_single(
        &global.output,
        &response,
        |v| serde_json::to_string_pretty(v).unwrap_or_else(|_| v.to_string()),
        ToString::to_string,
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}
