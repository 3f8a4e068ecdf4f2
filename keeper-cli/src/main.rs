//! Keeper: sync daemon supervisor CLI.
//!
//! # Usage
//!
//! ```text
//! keeper run [--in-process] [--json]
//! keeper daemon start|stop|status
//! keeper status [--json]
//! keeper pause | resume
//! keeper errors [--json] [--clear]
//! keeper check-updates
//! keeper config get <section> <key>
//! keeper config set <section> <key> <value>
//! keeper link <token> | unlink
//! ```
//!
//! Every command addresses one daemon identity: `--config-name`, else
//! `KEEPER_CONFIG`, else `keeper`.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{
    config::ConfigCommand, daemon::DaemonCommand, errors::ErrorsArgs, link::LinkArgs,
    run::RunArgs, status::StatusArgs,
};
use keeper_core::{DaemonIdentity, DEFAULT_IDENTITY, IDENTITY_ENV};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "keeper",
    version,
    about = "Supervise the keeper sync daemon",
    long_about = None,
)]
struct Cli {
    /// Configuration identity selecting which daemon to address.
    #[arg(
        long = "config-name",
        global = true,
        env = IDENTITY_ENV,
        default_value = DEFAULT_IDENTITY,
    )]
    config_name: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the front-end: supervise the daemon and print its state.
    Run(RunArgs),

    /// Manage the background daemon process.
    Daemon {
        #[command(subcommand)]
        command: DaemonCommand,
    },

    /// Show the daemon's sync status.
    Status(StatusArgs),

    /// Pause syncing.
    Pause,

    /// Resume syncing.
    Resume,

    /// List errors the daemon has queued.
    Errors(ErrorsArgs),

    /// Ask the daemon whether a newer release exists.
    CheckUpdates,

    /// Read or write daemon configuration values.
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },

    /// Store an access token for this identity.
    Link(LinkArgs),

    /// Remove the stored access token.
    Unlink,
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    keeper_daemon::init_tracing();

    let identity = DaemonIdentity::from(cli.config_name.trim());
    match cli.command {
        Commands::Run(args) => args.run(&identity),
        Commands::Daemon { command } => commands::daemon::run(command, &identity),
        Commands::Status(args) => args.run(&identity),
        Commands::Pause => commands::control::pause(&identity),
        Commands::Resume => commands::control::resume(&identity),
        Commands::Errors(args) => args.run(&identity),
        Commands::CheckUpdates => commands::control::check_updates(&identity),
        Commands::Config { command } => commands::config::run(command, &identity),
        Commands::Link(args) => args.run(&identity),
        Commands::Unlink => commands::link::unlink(&identity),
    }
}
