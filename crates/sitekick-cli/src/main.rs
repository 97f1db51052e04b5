mod cmd;
mod output;

use clap::{Parser, Subcommand};
use cmd::{config::ConfigSubcommand, notify::NotifySubcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "sitekick",
    about = "Lifecycle emails and Stripe payment reconciliation for sitekick",
    version,
    propagate_version = true
)]
struct Cli {
    /// Path to the YAML config file
    #[arg(
        long,
        global = true,
        env = "SITEKICK_CONFIG",
        default_value = sitekick_core::config::DEFAULT_CONFIG_FILE
    )]
    config: PathBuf,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server
    Serve {
        /// Port to listen on (overrides server.port)
        #[arg(long)]
        port: Option<u16>,

        /// Use the process-local in-memory store instead of Postgres
        #[arg(long)]
        memory: bool,
    },

    /// Apply database migrations
    Migrate,

    /// Inspect and validate the config file
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },

    /// Check, send and audit lifecycle emails
    Notify {
        #[command(subcommand)]
        subcommand: NotifySubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Serve { .. } => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .init();

    let result = match cli.command {
        Commands::Serve { port, memory } => cmd::serve::run(&cli.config, port, memory),
        Commands::Migrate => cmd::migrate::run(&cli.config),
        Commands::Config { subcommand } => cmd::config::run(&cli.config, subcommand, cli.json),
        Commands::Notify { subcommand } => cmd::notify::run(&cli.config, subcommand, cli.json),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
