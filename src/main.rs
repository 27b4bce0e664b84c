use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cmd;

#[derive(Parser)]
#[command(name = "shutterboard")]
#[command(version, about = "Conflict-aware booking board for a photo studio")]
pub struct Cli {
    /// Verbose logging (debug level)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to a board.toml config file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the record store server
    Serve {
        #[arg(short, long)]
        port: Option<u16>,

        /// SQLite database path
        #[arg(long)]
        db: Option<PathBuf>,

        /// Dev mode: permissive CORS, bind all interfaces
        #[arg(long)]
        dev: bool,
    },
    /// Fetch the board once and print it (runs a full sync cycle,
    /// including the auto-expiry sweep)
    Board {
        /// Server base URL
        #[arg(long)]
        url: Option<String>,

        /// Search query
        #[arg(short, long, default_value = "")]
        query: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = shutterboard::config::BoardConfig::load(cli.config.as_deref())?;

    match &cli.command {
        Commands::Serve { port, db, dev } => {
            cmd::cmd_serve(&config, *port, db.clone(), *dev).await
        }
        Commands::Board { url, query } => cmd::cmd_board(&config, url.as_deref(), query).await,
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "shutterboard=debug"
    } else {
        "shutterboard=info"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
