use anyhow::Context;
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::analytics::{BaselineSet, BaselineTargets};
use crate::models::DateRange;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub api_server: ServerConfig,
    pub baseline: BaselineConfig,
    pub dashboard: DashboardConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub backend: DatabaseBackend,
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseBackend {
    Sqlite,
    Postgres,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Allow cross-origin requests from anywhere (for a separately hosted site)
    pub cors_allow_any_origin: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaselineConfig {
    pub annual_visitors: u64,
    pub annual_clicks: u64,
    pub annual_downloads: u64,
    pub avg_session_seconds: u64,
    /// Seed for the session-time jitter; random when unset
    #[serde(default)]
    pub seed: Option<u64>,
}

impl BaselineConfig {
    pub fn targets(&self) -> BaselineTargets {
        BaselineTargets {
            annual_visitors: self.annual_visitors,
            annual_clicks: self.annual_clicks,
            annual_downloads: self.annual_downloads,
            avg_session_seconds: self.avg_session_seconds,
        }
    }

    /// Generate the baseline year ending at `now`, seeded when configured
    pub fn generate(&self, now: DateTime<Utc>) -> BaselineSet {
        match self.seed {
            Some(seed) => {
                BaselineSet::generate(self.targets(), now, &mut StdRng::seed_from_u64(seed))
            }
            None => BaselineSet::generate(self.targets(), now, &mut rand::rng()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardConfig {
    pub default_range: DateRange,
    /// Buffered change notifications before the feed lags
    pub change_feed_capacity: usize,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Build the config from any variable source; used by `from_env` and tests
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let backend_str = var("DATABASE_BACKEND").unwrap_or_else(|| "sqlite".to_string());

        let backend = match backend_str.to_lowercase().as_str() {
            "postgres" | "postgresql" => DatabaseBackend::Postgres,
            _ => DatabaseBackend::Sqlite,
        };

        let database_url =
            var("DATABASE_URL").unwrap_or_else(|| "sqlite://./folio.db?mode=rwc".to_string());
        let max_connections = parse_or(&var, "DATABASE_MAX_CONNECTIONS", 5u32)?;

        let api_host = var("API_HOST").unwrap_or_else(|| "127.0.0.1".to_string());
        let api_port = parse_or(&var, "API_PORT", 8080u16)?;

        let cors_allow_any_origin = var("CORS_ALLOW_ANY_ORIGIN")
            .map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"))
            .unwrap_or(false);

        let defaults = BaselineTargets::default();
        let baseline = BaselineConfig {
            annual_visitors: parse_or(&var, "BASELINE_ANNUAL_VISITORS", defaults.annual_visitors)?,
            annual_clicks: parse_or(&var, "BASELINE_ANNUAL_CLICKS", defaults.annual_clicks)?,
            annual_downloads: parse_or(
                &var,
                "BASELINE_ANNUAL_DOWNLOADS",
                defaults.annual_downloads,
            )?,
            avg_session_seconds: parse_or(
                &var,
                "BASELINE_AVG_SESSION_SECS",
                defaults.avg_session_seconds,
            )?,
            seed: var("BASELINE_SEED")
                .map(|v| v.parse::<u64>())
                .transpose()
                .context("BASELINE_SEED must be an unsigned integer")?,
        };

        let default_range = match var("DASHBOARD_DEFAULT_RANGE") {
            None => DateRange::default(),
            Some(raw) => DateRange::from_str(&raw).unwrap_or_else(|e| {
                tracing::warn!(
                    "Invalid DASHBOARD_DEFAULT_RANGE '{raw}' ({e}), falling back to '{}'",
                    DateRange::default()
                );
                DateRange::default()
            }),
        };
        let change_feed_capacity = parse_or(&var, "CHANGE_FEED_CAPACITY", 256usize)?;

        Ok(Config {
            database: DatabaseConfig {
                backend,
                url: database_url,
                max_connections,
            },
            api_server: ServerConfig {
                host: api_host,
                port: api_port,
                cors_allow_any_origin,
            },
            baseline,
            dashboard: DashboardConfig {
                default_range,
                change_feed_capacity,
            },
        })
    }
}

fn parse_or<T>(var: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match var(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("{key} has invalid value '{raw}'")),
        None => Ok(default),
    }
}
