//! feedgate server binary.
//!
//! # Usage
//!
//! ```bash
//! # With config file
//! feedgate --config config.yaml
//!
//! # With environment variables only
//! FEEDGATE_AUTHN__MODE=admin feedgate
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::signal;
use tracing::{error, info};

use feedgate_api::auth::Authenticator;
use feedgate_api::config::FeedgateConfig;
use feedgate_api::observability::{init_logging, parse_log_level, LoggingConfig};
use feedgate_api::routes::create_router;
use feedgate_api::state::AppState;
use feedgate_authn::{HttpIdentityClient, IdentityClient, StaticIdentityClient};
use feedgate_policy::{
    CheckerConfig, EntityDb, MemoryEntityDb, PostgresEntityDb,
};
use feedgate_storage::{MemoryTupleStore, PostgresConfig, PostgresTupleStore, TupleStore};

/// feedgate - fine-grained authorization core for transit data
#[derive(Parser, Debug)]
#[command(name = "feedgate")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file (YAML)
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = if let Some(config_path) = args.config {
        FeedgateConfig::load(&config_path)?
    } else {
        FeedgateConfig::from_env()?
    };

    init_logging(LoggingConfig {
        json_format: config.logging.json,
        default_level: parse_log_level(&config.logging.level),
    });

    info!(version = env!("CARGO_PKG_VERSION"), "starting feedgate server");

    // Identity client: external endpoint when configured, otherwise an
    // empty in-process directory (header/admin modes).
    let identity: Arc<dyn IdentityClient> = match config
        .authn
        .identity_endpoint
        .as_deref()
        .filter(|s| !s.is_empty())
    {
        Some(endpoint) => {
            info!(%endpoint, "using external identity endpoint");
            Arc::new(HttpIdentityClient::new(
                endpoint,
                Duration::from_millis(config.authn.identity_timeout_ms),
            ))
        }
        None => {
            info!("no identity endpoint configured, users will not be enriched");
            Arc::new(StaticIdentityClient::new())
        }
    };

    let authenticator = Authenticator::from_settings(&config.authn, Arc::clone(&identity))
        .ok_or_else(|| anyhow::anyhow!("unknown authn.mode: {}", config.authn.mode))?;
    // Background refresh of identity cache entries past their recheck
    // horizon; independent of request deadlines.
    let _sweeper = authenticator.gatekeeper().spawn_sweeper();

    let checker_config = CheckerConfig {
        global_admins: config.authz.global_admins.clone(),
        ..Default::default()
    };

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;

    match (config.engine.backend.as_str(), config.database.url.clone()) {
        ("memory", None) => {
            info!("using in-memory tuple store and entity db");
            let store = MemoryTupleStore::new_shared();
            let db = Arc::new(MemoryEntityDb::new());
            serve(store, db, identity, authenticator, checker_config, addr, &config).await
        }
        ("memory", Some(url)) => {
            info!("using in-memory tuple store with postgres entity db");
            let store = MemoryTupleStore::new_shared();
            let db = Arc::new(PostgresEntityDb::connect(&url, config.database.pool_size).await?);
            serve(store, db, identity, authenticator, checker_config, addr, &config).await
        }
        ("postgres", db_url) => {
            let database_url = config.engine.database_url.clone().ok_or_else(|| {
                anyhow::anyhow!("engine.database_url is required for the postgres backend")
            })?;
            info!("connecting tuple store to postgres");
            let store = PostgresTupleStore::from_config(&PostgresConfig {
                database_url,
                max_connections: config.engine.pool_size,
                ..Default::default()
            })
            .await?;
            store.ensure_schema().await?;
            let store = Arc::new(store);
            match db_url {
                Some(url) => {
                    let db =
                        Arc::new(PostgresEntityDb::connect(&url, config.database.pool_size).await?);
                    serve(store, db, identity, authenticator, checker_config, addr, &config).await
                }
                None => {
                    let db = Arc::new(MemoryEntityDb::new());
                    serve(store, db, identity, authenticator, checker_config, addr, &config).await
                }
            }
        }
        (backend, _) => {
            error!("unknown engine backend: {backend}");
            anyhow::bail!("unknown engine backend: {backend}");
        }
    }
}

async fn serve<S, D>(
    store: Arc<S>,
    db: Arc<D>,
    identity: Arc<dyn IdentityClient>,
    authenticator: Authenticator,
    checker_config: CheckerConfig,
    addr: SocketAddr,
    config: &FeedgateConfig,
) -> anyhow::Result<()>
where
    S: TupleStore,
    D: EntityDb,
{
    let state = AppState::new(store, db, identity, authenticator, checker_config);
    let router = create_router(state, config.server.body_limit);

    info!(%addr, "HTTP server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("HTTP server shutdown complete");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("received Ctrl+C, shutting down");
        }
        _ = terminate => {
            info!("received SIGTERM, shutting down");
        }
    }
}
