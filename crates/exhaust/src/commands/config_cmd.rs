//! Config subcommand handlers.

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts, OutputFormat};
use crate::config;
use crate::error::CliError;
use crate::output;

pub fn handle(args: &ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Path => {
            let path = config::config_path(global);
            output::print_output(&path.display().to_string(), global.quiet);
            Ok(())
        }

        ConfigCommand::Show => {
            let cfg = config::load(global)?;
            // Validate host names even though nothing connects.
            cfg.module_hosts()?;

            let out = match global.output {
                OutputFormat::Table | OutputFormat::Plain => cfg.to_toml()?,
                ref structured => output::render_single(
                    structured,
                    &cfg,
                    |_| String::new(),
                    |_| String::new(),
                )?,
            };
            output::print_output(out.trim_end(), global.quiet);
            Ok(())
        }
    }
}
