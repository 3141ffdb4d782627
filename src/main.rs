// src/main.rs

use std::time::Duration;

use lastbench::config::Config;
use lastbench::error::AppError;
use lastbench::gateway::{Gateway, postgres::PgGateway};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const MAX_CONNECT_RETRIES: u32 = 5;

/// Operations entry point: applies migrations and seeds reference data.
#[tokio::main]
async fn main() -> Result<(), AppError> {
    // Load configuration from environment (.env included)
    let config = Config::from_env()?;

    let file_appender = tracing_appender::rolling::daily("logs", "lastbench.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let env_filter = EnvFilter::new(&config.rust_log);
    let stdout_layer = fmt::layer().with_writer(std::io::stdout).with_target(false);
    let file_layer = fmt::layer().with_writer(non_blocking).with_ansi(false);

    // Initialize Tracing (Logging)
    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .init();

    let database_url = config
        .database_url
        .clone()
        .ok_or(AppError::Config("DATABASE_URL must be set".to_string()))?;

    let pool = connect(&database_url).await?;
    tracing::info!("Database connected...");

    let gateway = PgGateway::new(pool, &config);

    tracing::info!("Running migrations...");
    gateway.migrate().await?;
    tracing::info!("Migrations applied successfully.");

    match &config.seed {
        Some(seed) => {
            let college = gateway.seed(seed).await?;
            tracing::info!(
                "Seeded {} ({}) with {} department(s)",
                college.name,
                college.email_domain,
                seed.departments.len()
            );
        }
        None => tracing::info!("No seed college configured, skipping reference data."),
    }

    let colleges = gateway.colleges().await?;
    tracing::info!("{} college(s) available for sign-up", colleges.len());
    Ok(())
}

async fn connect(database_url: &str) -> Result<PgPool, AppError> {
    let mut retry_count = 0;
    loop {
        match PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(3))
            .connect(database_url)
            .await
        {
            Ok(pool) => return Ok(pool),
            Err(e) => {
                retry_count += 1;
                if retry_count > MAX_CONNECT_RETRIES {
                    tracing::error!(
                        "Failed to connect to database after {} retries: {}",
                        MAX_CONNECT_RETRIES,
                        e
                    );
                    return Err(e.into());
                }
                tracing::warn!(
                    "Database not ready, retrying in 2s... (Attempt {})",
                    retry_count
                );
                tokio::time::sleep(Duration::from_secs(2)).await;
            }
        }
    }
}
