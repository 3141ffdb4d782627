// src/config.rs

use std::env;
use std::path::PathBuf;

use dotenvy::dotenv;
use url::Url;

use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct Config {
    /// Only the operations binary and the Postgres gateway need it.
    pub database_url: Option<String>,
    pub jwt_secret: String,
    /// Access token lifetime in seconds.
    pub jwt_expiration: u64,
    pub rust_log: String,
    pub storage_root: PathBuf,
    pub storage_public_url: Url,
    pub share_base_url: Url,
    pub feed_page_size: i64,
    pub seed: Option<SeedConfig>,
}

/// Reference data inserted by the operations binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedConfig {
    pub college_name: String,
    pub college_domain: String,
    pub departments: Vec<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        dotenv().ok();

        let database_url = env::var("DATABASE_URL").ok();

        let jwt_secret = env::var("JWT_SECRET")
            .map_err(|_| AppError::Config("JWT_SECRET must be set".to_string()))?;

        let jwt_expiration = parse_or("JWT_EXPIRATION", 86_400)?;

        let rust_log = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        let storage_root =
            PathBuf::from(env::var("STORAGE_ROOT").unwrap_or_else(|_| "storage".to_string()));

        let storage_public_url = parse_url(
            "STORAGE_PUBLIC_URL",
            env::var("STORAGE_PUBLIC_URL")
                .unwrap_or_else(|_| "http://localhost:8080/storage/".to_string()),
        )?;

        let share_base_url = parse_url(
            "SHARE_BASE_URL",
            env::var("SHARE_BASE_URL").unwrap_or_else(|_| "https://lastbench.app/".to_string()),
        )?;

        let feed_page_size = parse_or("FEED_PAGE_SIZE", 20)?;

        let seed = match (env::var("SEED_COLLEGE_NAME"), env::var("SEED_COLLEGE_DOMAIN")) {
            (Ok(college_name), Ok(college_domain)) => Some(SeedConfig {
                college_name,
                college_domain,
                departments: env::var("SEED_DEPARTMENTS")
                    .map(|raw| split_list(&raw))
                    .unwrap_or_default(),
            }),
            _ => None,
        };

        Ok(Self {
            database_url,
            jwt_secret,
            jwt_expiration,
            rust_log,
            storage_root,
            storage_public_url,
            share_base_url,
            feed_page_size,
            seed,
        })
    }

    /// Configuration for tests and local tooling; no environment access.
    pub fn for_tests() -> Self {
        Self {
            database_url: None,
            jwt_secret: "lastbench_test_secret".to_string(),
            jwt_expiration: 600,
            rust_log: "error".to_string(),
            storage_root: PathBuf::from("storage"),
            storage_public_url: Url::parse("http://localhost:8080/storage/")
                .expect("static url is valid"),
            share_base_url: Url::parse("https://lastbench.app/")
                .expect("static url is valid"),
            feed_page_size: 20,
            seed: None,
        }
    }
}

fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> Result<T, AppError> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| AppError::Config(format!("{key} has an invalid value: {raw}"))),
        Err(_) => Ok(default),
    }
}

/// Base URLs must end with a slash, otherwise `Url::join` drops the last segment.
fn parse_url(key: &str, raw: String) -> Result<Url, AppError> {
    let normalized = if raw.ends_with('/') { raw } else { format!("{raw}/") };
    Url::parse(&normalized).map_err(|e| AppError::Config(format!("{key}: {e}")))
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
