//! Fanout server daemon
//!
//! Run with: fanoutd [--config fanoutd.toml] [--bind 0.0.0.0:9710]
//!
//! Publish:  `printf 'demo:secret\n'; cat video.ts` piped into `nc localhost 9710`
//! Watch:    `printf 'demo\n'` piped into `nc localhost 9710`
//!
//! Hash a password for the basic backend:
//!   fanoutd hash-password 'secret'

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};

use fanout_rs::auth::hash_password;
use fanout_rs::{FanoutServer, FileConfig, Forwarder, StreamRegistry};

#[derive(Parser, Debug)]
#[command(version, about = "Live byte-stream fanout server")]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, env = "FANOUT_CONFIG")]
    config: Option<PathBuf>,

    /// Override the listening address
    #[arg(short, long, env = "FANOUT_BIND")]
    bind: Option<SocketAddr>,

    /// Log filter directives, e.g. "info" or "fanout_rs=debug"
    #[arg(long, env = "FANOUT_LOG", default_value = "info")]
    log: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print an Argon2 hash for the basic auth backend
    HashPassword { password: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Some(Command::HashPassword { password }) = cli.command {
        println!("{}", hash_password(&password)?);
        return Ok(());
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .or_else(|_| tracing_subscriber::EnvFilter::try_new(&cli.log))
                .context("invalid log filter")?,
        )
        .init();

    let file = match cli.config {
        Some(ref path) => FileConfig::load(path)?,
        None => FileConfig::default(),
    };

    let mut config = file.server_config();
    if let Some(addr) = cli.bind {
        config = config.bind(addr);
    }

    let auth = file.auth.init().context("failed to initialize authentication")?;
    let registry = Arc::new(StreamRegistry::with_config(file.registry_config()));

    let forwarder = Forwarder::new(Arc::clone(&registry), file.forwarding.clone())
        .queue_capacity(config.viewer_queue_capacity)
        .spawn();

    let server = FanoutServer::with_registry(config, registry, auth.clone());
    let result = server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
        })
        .await;

    if let Some(handle) = forwarder {
        handle.abort();
    }
    if let Some(auth) = auth {
        auth.close().await;
    }

    tracing::info!("Server stopped");
    result.context("server failed")
}
