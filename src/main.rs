//! Signify Keystrokes Daemon
//!
//! ## Usage
//!
//! ```bash
//! # Start the HTTP API with defaults
//! signify-keystrokes
//!
//! # Start with custom config, storage directory or port
//! signify-keystrokes --config /path/to/config.toml serve
//! signify-keystrokes --storage-dir /data/signify --http-port 9000
//!
//! # Create an author and print its API token
//! signify-keystrokes create-user --name "Ada Lovelace"
//!
//! # Print row counts
//! signify-keystrokes stats
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use signify_keystrokes::services::events::spawn_logging_listener;
use signify_keystrokes::{Config, HttpServer, KeystrokeDb, ServiceLimits, Services};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "signify-keystrokes")]
#[command(about = "Keystroke provenance storage for Signify")]
struct Args {
    /// Path to config file
    #[arg(short, long, env = "SIGNIFY_CONFIG")]
    config: Option<PathBuf>,

    /// Storage directory
    #[arg(long, env = "SIGNIFY_STORAGE_DIR")]
    storage_dir: Option<PathBuf>,

    /// HTTP API port
    #[arg(long, env = "SIGNIFY_HTTP_PORT")]
    http_port: Option<u16>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP API (default)
    Serve,
    /// Create an author and print its API token once
    CreateUser {
        /// Display name shown on published posts
        #[arg(long)]
        name: String,
    },
    /// Print table row counts as JSON
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("signify_keystrokes=info".parse()?),
        )
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => Config::default(),
    };

    if let Some(dir) = args.storage_dir {
        config.storage_dir = dir;
    }
    if let Some(port) = args.http_port {
        config.http_port = port;
    }
    config.validate()?;

    tokio::fs::create_dir_all(&config.storage_dir)
        .await
        .with_context(|| format!("creating {}", config.storage_dir.display()))?;

    let config_path = config.config_path();
    if !config_path.exists() {
        config.save(&config_path)?;
        info!(path = %config_path.display(), "Created default config");
    }

    let db = Arc::new(KeystrokeDb::open(&config.database_path(), config.pool_size)?);
    let services = Arc::new(Services::new(db.clone(), ServiceLimits::from(&config)));

    match args.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config, services, db).await,
        Command::CreateUser { name } => {
            let (user, token) = services.auth.create_user(&name)?;
            println!("user id:   {}", user.id);
            println!("api token: {}", token);
            println!("Store the token now; it cannot be shown again.");
            Ok(())
        }
        Command::Stats => {
            let stats = db.stats()?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
            Ok(())
        }
    }
}

async fn serve(config: Config, services: Arc<Services>, db: Arc<KeystrokeDb>) -> anyhow::Result<()> {
    info!(
        storage_dir = %config.storage_dir.display(),
        http_port = config.http_port,
        "Starting signify-keystrokes"
    );

    let listener = spawn_logging_listener(services.events.clone());

    let http_addr: SocketAddr = format!("{}:{}", config.bind_address, config.http_port)
        .parse()
        .with_context(|| format!("invalid bind address {}", config.bind_address))?;
    let http_server = Arc::new(HttpServer::new(services, http_addr));

    info!("HTTP API available at http://{}", http_addr);
    info!("Press Ctrl+C to stop.");

    let shutdown = async {
        tokio::signal::ctrl_c().await.ok();
        info!("Shutting down...");
    };

    tokio::select! {
        result = http_server.run() => {
            if let Err(e) = result {
                error!(error = %e, "HTTP server error");
            }
        }
        _ = shutdown => {}
    }

    listener.abort();

    if let Ok(stats) = db.stats() {
        info!(
            documents = stats.documents,
            verifications = stats.verifications,
            keystroke_events = stats.keystroke_events,
            "Final storage stats"
        );
    }

    Ok(())
}
