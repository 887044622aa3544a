//! Clap derive structures for the `exhaust` CLI.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// exhaust -- drive the building's exhaust-fan relay fleet
#[derive(Debug, Parser)]
#[command(
    name = "exhaust",
    version,
    about = "Control exhaust fans through their relay modules",
    long_about = "Turns apartment exhaust fans on and off through pulse relay modules.\n\n\
        `exhaust run` keeps the fleet initialized and switches fans off when their\n\
        time is up. The other commands act once and exit.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Config file (defaults to the platform config directory)
    #[arg(long, short = 'c', env = "EXHAUST_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "EXHAUST_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
    /// Plain text, one value per line (scripting)
    Plain,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the scheduler: initialize modules, retry failures, expire fans
    Run,

    /// Turn an exhaust fan on
    ///
    /// Writes the state file, so it is refused (exit 6) while a running
    /// `exhaust run` holds it.
    On(OnArgs),

    /// Turn an exhaust fan off (cuts the group branch, re-arms neighbours)
    ///
    /// Writes the state file, so it is refused (exit 6) while a running
    /// `exhaust run` holds it.
    Off(UnitArgs),

    /// Show one unit, or every module and active fan
    #[command(alias = "st")]
    Status(StatusArgs),

    /// List every tracked activation
    #[command(alias = "ps")]
    Process,

    /// Send a raw command to a module
    Configure(ConfigureArgs),

    /// Show how a unit id maps onto modules and relays
    Parse(UnitArgs),

    /// Inspect CLI configuration
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Unit commands ────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct UnitArgs {
    /// Unit id: tower letter and final digit (A1, a-1, A_1)
    pub id: String,
}

#[derive(Debug, Args)]
pub struct OnArgs {
    /// Unit id: tower letter and final digit (A1, a-1, A_1)
    pub id: String,

    /// Switch off automatically after this many minutes (0 = never)
    #[arg(long, short = 'm')]
    pub minutes: Option<u32>,
}

#[derive(Debug, Args)]
pub struct StatusArgs {
    /// Unit id; omit for the whole fleet
    pub id: Option<String>,

    /// Probe the modules before reporting
    #[arg(long)]
    pub probe: bool,
}

#[derive(Debug, Args)]
pub struct ConfigureArgs {
    /// Module name (PWR_14), 1-8 slot index or IPv4 address
    pub module: String,

    /// Command, already URL-encoded (Backlog%20PulseTime1%205)
    pub command: String,
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the config file path in use
    Path,

    /// Show the effective configuration (file + environment)
    Show,
}

// ── Completions ──────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
