//! Command dispatch: bridges CLI args -> controller operations -> output formatting.

pub mod config_cmd;
pub mod configure;
pub mod run;
pub mod units;

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Dispatch a command to its handler.
pub async fn dispatch(cmd: Command, global: &GlobalOpts) -> Result<(), CliError> {
    match cmd {
        Command::Run => run::handle(global).await,
        Command::On(args) => units::turn_on(args, global).await,
        Command::Off(args) => units::turn_off(args, global).await,
        Command::Status(args) => units::status(args, global).await,
        Command::Process => units::process(global).await,
        Command::Parse(args) => units::parse(&args, global),
        Command::Configure(args) => configure::handle(args, global).await,
        Command::Config(args) => config_cmd::handle(&args, global),
        // Completions are handled before dispatch
        Command::Completions(_) => Ok(()),
    }
}
