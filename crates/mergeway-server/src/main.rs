//! mergeway: pull request server for bare git repositories.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use mergeway_core::{Config, Engine, GitRepositories, State};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "mergeway", version, about = "Serve pull requests over HTTP")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "mergeway.toml")]
    config: PathBuf,

    /// Address to listen on, overriding the configuration.
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            "mergeway=info,mergeway_core=info,mergeway_server=info,tower_http=info".into()
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = run(Cli::parse()).await {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    config.apply_env();
    if let Some(bind) = cli.bind {
        config.server.bind = bind;
    }
    let addr = config.server.bind_addr()?;

    let engine = Engine::new(
        GitRepositories::new(&config.storage.repos_dir),
        State::new(&config.storage.state_dir),
        config.merge,
    );
    let app = mergeway_server::router(Arc::new(engine));

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!(
        %addr,
        repos = %config.storage.repos_dir.display(),
        "mergeway listening"
    );
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
