use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use issue_tracker::config::{StorageBackend, TrackerConfig};

mod cmd;

#[derive(Parser)]
#[command(name = "issue-tracker")]
#[command(version, about = "Per-project issue tracking HTTP API")]
pub struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Path to the configuration file (default: ./issue-tracker.toml if present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP server
    Serve {
        /// Interface to bind
        #[arg(long)]
        host: Option<String>,

        /// Port to serve on
        #[arg(short, long)]
        port: Option<u16>,

        /// Storage backend: memory or sqlite
        #[arg(long)]
        backend: Option<StorageBackend>,

        /// SQLite database path
        #[arg(long)]
        db_path: Option<PathBuf>,

        /// Enable dev mode (CORS permissive for a local front-end dev server)
        #[arg(long)]
        dev: bool,
    },
    /// Initialize the SQLite database only (don't start the server)
    Init {
        /// Database path
        #[arg(long)]
        db_path: Option<PathBuf>,
    },
}

fn init_tracing(verbose: u8, json: bool) {
    use tracing_subscriber::EnvFilter;

    // Honor RUST_LOG if set, otherwise use verbosity flag
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        match verbose {
            0 => EnvFilter::new("warn"),
            1 => EnvFilter::new("info"),
            2 => EnvFilter::new("debug,rusqlite=info"),
            _ => EnvFilter::new("trace"),
        }
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_json);

    let mut config = TrackerConfig::load_or_default(cli.config.as_deref())?;
    config
        .apply_env()
        .context("Invalid configuration in environment")?;

    match cli.command {
        Commands::Serve {
            host,
            port,
            backend,
            db_path,
            dev,
        } => {
            let overrides = cmd::serve::ServeOverrides {
                host,
                port,
                backend,
                db_path,
                dev,
            };
            cmd::cmd_serve(config, overrides).await?;
        }
        Commands::Init { db_path } => {
            cmd::cmd_init(&config, db_path)?;
        }
    }

    Ok(())
}
