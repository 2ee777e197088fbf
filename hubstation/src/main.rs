use std::path::PathBuf;

use anyhow::Context;
use hubstation::constants::{CONFIG_PATH_ENV, LOG_DIR_ENV};
use hubstation::services::{ContainerOptions, ServiceContainer};
use hubstation::{database, logging, utils};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config_path = std::env::var(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .with_context(|| format!("{CONFIG_PATH_ENV} is not set"))?;
    let config_dir = config_path
        .parent()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));

    let log_dir = std::env::var(LOG_DIR_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| config_dir.join("logs"));
    let (logging_config, _guard) = logging::init_logging(&log_dir)?;

    utils::http_client::install_rustls_provider();

    // Initialize database
    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| format!("sqlite:{}?mode=rwc", config_dir.join("user.db").display()));
    let pool = database::init_pool(&database_url).await?;
    database::run_migrations(&pool).await?;

    let container =
        ServiceContainer::with_pool(pool, ContainerOptions::new(config_path), Some(logging_config))
            .await?;
    container.start()?;
    tracing::info!("hubstation started");

    tokio::signal::ctrl_c().await?;
    container.shutdown().await;

    Ok(())
}
