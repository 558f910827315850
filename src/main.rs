use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use walink_lib::bootstrap::{self, tracing::init_tracing_subscriber};
use walink_lib::commands;
use wl_core::OwnerId;

#[derive(Parser)]
#[command(name = "walink")]
#[command(about = "Link a messaging account by scanning a QR pairing code", long_about = None)]
struct Cli {
    /// Config file path (defaults to the per-user config dir)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a pairing session and wait until it is scanned
    Pair {
        /// Phone number of the account to link
        #[arg(short, long)]
        phone: String,
        /// Address to receive gateway webhooks on, e.g. 0.0.0.0:8787
        #[arg(short, long)]
        listen: Option<SocketAddr>,
    },
    /// Delete the remote session left for a phone number
    Unpair {
        /// Phone number of the linked account
        #[arg(short, long)]
        phone: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = bootstrap::resolve_config(cli.config.as_deref())?;
    if let Err(err) = init_tracing_subscriber(&bootstrap::logs_dir(&config)) {
        eprintln!("Failed to initialize tracing: {err}");
    }

    let runtime = bootstrap::wire_dependencies(config)?;

    match cli.command {
        Commands::Pair { phone, listen } => {
            commands::run_pair(&runtime, OwnerId::from(phone), listen).await?;
        }
        Commands::Unpair { phone } => {
            commands::run_unpair(&runtime, OwnerId::from(phone)).await?;
        }
    }

    Ok(())
}
