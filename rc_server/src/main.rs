//! Race Cup tournament server.
//!
//! Serves the tournament API over HTTP and live updates over WebSocket,
//! with tournaments coordinated by one actor per tournament.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Error};
use pico_args::Arguments;
use race_cup::{
    accounts::{AccountLedger, MemoryAccountLedger, PgAccountLedger},
    db::{Database, MemoryTournamentStore, PgTournamentStore, TournamentStore},
    events::EventHub,
    tournament::TournamentManager,
};
use rc_server::{
    api::{self, auth::TokenVerifier},
    config::{ServerConfig, StorageBackend},
    logging,
};
use tracing::{error, info};

const HELP: &str = "\
Run the Race Cup tournament server

USAGE:
  rc_server [OPTIONS]

OPTIONS:
  --bind       IP:PORT     Server socket bind address  [default: env SERVER_BIND or 127.0.0.1:7070]
  --storage    BACKEND     memory or postgres          [default: env STORAGE_BACKEND or memory]

FLAGS:
  -h, --help               Print help information

ENVIRONMENT:
  SERVER_BIND              Server bind address (e.g., 0.0.0.0:8080)
  STORAGE_BACKEND          memory | postgres
  DATABASE_URL             PostgreSQL connection string (postgres backend)
  JWT_SECRET               Secret shared with the auth service (required)
  OPENING_BALANCE          Coins for a player the ledger has not seen [default: 1000]
  SEEDING                  shuffled | join_order [default: shuffled]
  EXTERNAL_TIMEOUT_MS      Ledger and storage call timeout [default: 5000]
  TOURNAMENT_RETENTION_DAYS  Days finished tournaments are kept [default: 7]
  CLEANUP_INTERVAL_SECS    Cleanup sweep interval [default: 3600]
";

struct Args {
    bind: Option<SocketAddr>,
    storage: Option<StorageBackend>,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    // Load .env file if it exists
    let _ = dotenvy::dotenv();

    let mut pargs = Arguments::from_env();

    // Help has a higher priority and should be handled separately.
    if pargs.contains(["-h", "--help"]) {
        print!("{HELP}");
        std::process::exit(0);
    }

    let args = Args {
        bind: pargs.opt_value_from_str("--bind")?,
        storage: pargs.opt_value_from_str("--storage")?,
    };

    logging::init();

    let config = ServerConfig::from_env(args.bind, args.storage)?;
    config.validate()?;

    info!(
        "Starting tournament server at {} ({:?} storage)",
        config.bind, config.storage
    );

    let database = match &config.database {
        Some(db_config) => {
            let db = Database::new(db_config)
                .await
                .context("Failed to connect to database")?;
            db.run_migrations()
                .await
                .context("Failed to run migrations")?;
            info!("Database connected successfully");
            Some(db)
        }
        None => None,
    };

    let (store, ledger): (Arc<dyn TournamentStore>, Arc<dyn AccountLedger>) = match &database {
        Some(db) => {
            let pool = Arc::new(db.pool().clone());
            (
                Arc::new(PgTournamentStore::new(pool.clone())),
                Arc::new(PgAccountLedger::new(pool, config.opening_balance)),
            )
        }
        None => (
            Arc::new(MemoryTournamentStore::new()),
            Arc::new(MemoryAccountLedger::new(config.opening_balance)),
        ),
    };

    let hub = EventHub::new(config.event_capacity);
    let manager = TournamentManager::new(
        store,
        ledger,
        Arc::new(hub.clone()),
        config.coordinator.clone(),
    );

    spawn_cleanup(manager.clone(), config.cleanup_interval);

    let state = api::AppState {
        manager,
        hub,
        verifier: Arc::new(TokenVerifier::new(&config.jwt_secret)),
        database: database.clone(),
    };
    let app = api::create_router(state);

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind))?;

    info!("Server listening on {}", config.bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

    info!("Shutting down server...");
    if let Some(db) = database {
        db.close().await;
    }

    Ok(())
}

/// Periodically delete finished tournaments past the retention window
fn spawn_cleanup(manager: TournamentManager, every: std::time::Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            if let Err(e) = manager.cleanup_completed().await {
                error!("Tournament cleanup failed: {}", e);
            }
        }
    });
}

/// Graceful shutdown signal
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
