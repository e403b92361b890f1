//! vmfactory CLI entry point.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use vmfactory::FactoryConfig;

mod cli;

/// vmfactory - inspect and clean up VM templates
#[derive(Parser, Debug)]
#[command(name = "vmfactory")]
#[command(about = "VM template factory")]
#[command(version)]
struct Cli {
    /// Factory configuration file (TOML).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Report whether a VM template is established.
    Status(cli::status::StatusCmd),

    /// Unmount and remove a VM template.
    #[command(alias = "rm")]
    Destroy(cli::destroy::DestroyCmd),

    /// Print the effective configuration.
    Config(cli::config::ConfigCmd),
}

fn main() {
    let cli = Cli::parse();

    init_logging(cli.log_json);

    tracing::debug!(version = vmfactory::VERSION, "starting vmfactory");

    let config = match FactoryConfig::load_or_default(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "failed to load config");
            eprintln!("Error: {}", e);
            std::process::exit(2);
        }
    };

    let result = match cli.command {
        Commands::Status(cmd) => cmd.run(&config),
        Commands::Destroy(cmd) => cmd.run(&config),
        Commands::Config(cmd) => cmd.run(&config),
    };

    if let Err(e) = result {
        tracing::error!(error = %e, "command failed");
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Initialize the tracing subscriber.
fn init_logging(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("vmfactory=warn"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}
