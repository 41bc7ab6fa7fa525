//! Maintenance Store - Main entry point.
//!
//! Operational commands for the store layer: verify the deployment, create
//! the tables, issue a sequence number or report pool usage.

use clap::Parser;
use maintenance_store::config::{Command, Config};
use maintenance_store::db::{ConnectionPool, QueryExecutor, ensure_schema, seed_maintenance_types};
use maintenance_store::{LocationGuard, SequenceGenerator, StoreResult};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber for logging.
fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber.with(fmt::layer().json()).init();
    } else {
        subscriber
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }
}

async fn run(command: &Command, pool: &ConnectionPool) -> StoreResult<()> {
    let executor = QueryExecutor::new(pool.clone());

    match command {
        Command::Check => {
            pool.ping().await?;
            println!("ok: {} reachable", pool.db_type());
        }
        Command::InitSchema => {
            ensure_schema(&executor).await?;
            let seeded = seed_maintenance_types(&executor).await?;
            println!("schema ready ({} maintenance types seeded)", seeded);
        }
        Command::NextNumber { entity_type } => {
            let generator = SequenceGenerator::new(executor);
            let number = generator.next_number(entity_type.as_str()).await?;
            println!("{}", number);
        }
        Command::Status => {
            pool.ping().await?;
            let status = pool.status()?;
            let rendered = serde_json::to_string_pretty(&status)
                .unwrap_or_else(|_| format!("{:?}", status));
            println!("{}", rendered);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse configuration from command line and environment
    let config = Config::parse();

    // Initialize logging
    init_tracing(&config);

    info!("Starting maintenance-store v{}", env!("CARGO_PKG_VERSION"));

    // Refuse to start when the data directory lives inside the application tree
    let store_config = config.store_config()?;
    LocationGuard::check_current_dir(store_config.data_dir.as_deref())?;

    let pool = ConnectionPool::new(store_config)?;
    let result = run(&config.command, &pool).await;
    pool.close().await;

    if let Err(e) = result {
        match e.suggestion() {
            Some(suggestion) => error!(error = %e, suggestion, "Command failed"),
            None => error!(error = %e, "Command failed"),
        }
        return Err(e.into());
    }

    Ok(())
}
