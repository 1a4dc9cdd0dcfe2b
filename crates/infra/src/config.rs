//! Engine configuration loaded from environment variables.
//!
//! 12-factor style: every setting comes from the environment, optionally
//! seeded from a `.env` file via `dotenvy`. Missing or unparsable values
//! fall back to defaults, except `LISTEN_ADDR`, which must parse when set.

use std::net::SocketAddr;

use thiserror::Error;

use eventcrm_quota::policy::{DEFAULT_BASIC_LIMIT, DEFAULT_PRO_LIMIT, DEFAULT_WINDOW_DAYS};
use eventcrm_quota::QuotaPolicy;
use eventcrm_reports::Benchmarks;

const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8080";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("LISTEN_ADDR '{value}' is not a socket address: {source}")]
    ListenAddr {
        value: String,
        #[source]
        source: std::net::AddrParseError,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub listen_addr: SocketAddr,

    /// When set, quota reservations live in Postgres.
    pub database_url: Option<String>,

    pub database_max_connections: u32,

    pub quota_window_days: i64,
    pub quota_limit_basic: u32,
    pub quota_limit_pro: u32,

    /// Concurrent sends per campaign.
    pub delivery_workers: usize,

    pub benchmark_open_rate: f64,
    pub benchmark_click_rate: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let benchmarks = Benchmarks::default();
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            database_url: None,
            database_max_connections: 10,
            quota_window_days: DEFAULT_WINDOW_DAYS,
            quota_limit_basic: DEFAULT_BASIC_LIMIT,
            quota_limit_pro: DEFAULT_PRO_LIMIT,
            delivery_workers: 4,
            benchmark_open_rate: benchmarks.open_rate,
            benchmark_click_rate: benchmarks.click_rate,
        }
    }
}

impl EngineConfig {
    /// Load from the process environment (and `.env`, if present).
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let raw_addr = lookup("LISTEN_ADDR").unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_string());
        let listen_addr = raw_addr.parse().map_err(|source| ConfigError::ListenAddr {
            value: raw_addr.clone(),
            source,
        })?;

        let database_url = lookup("DATABASE_URL").filter(|url| !url.trim().is_empty());

        Ok(Self {
            listen_addr,
            database_url,
            database_max_connections: parse_or(
                &lookup,
                "DATABASE_MAX_CONNECTIONS",
                defaults.database_max_connections,
            ),
            quota_window_days: parse_or(&lookup, "QUOTA_WINDOW_DAYS", defaults.quota_window_days),
            quota_limit_basic: parse_or(&lookup, "QUOTA_LIMIT_BASIC", defaults.quota_limit_basic),
            quota_limit_pro: parse_or(&lookup, "QUOTA_LIMIT_PRO", defaults.quota_limit_pro),
            delivery_workers: parse_or(&lookup, "DELIVERY_WORKERS", defaults.delivery_workers)
                .max(1),
            benchmark_open_rate: parse_or(
                &lookup,
                "BENCHMARK_OPEN_RATE",
                defaults.benchmark_open_rate,
            ),
            benchmark_click_rate: parse_or(
                &lookup,
                "BENCHMARK_CLICK_RATE",
                defaults.benchmark_click_rate,
            ),
        })
    }

    pub fn quota_policy(&self) -> QuotaPolicy {
        QuotaPolicy {
            window_days: self.quota_window_days,
            basic_limit: self.quota_limit_basic,
            pro_limit: self.quota_limit_pro,
        }
    }

    pub fn benchmarks(&self) -> Benchmarks {
        Benchmarks {
            open_rate: self.benchmark_open_rate,
            click_rate: self.benchmark_click_rate,
        }
    }
}

/// Parse `key` as `T`, returning `default` when missing or invalid.
fn parse_or<T, F>(lookup: &F, key: &str, default: T) -> T
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_pairs(pairs: &[(&str, &str)]) -> Result<EngineConfig, ConfigError> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        EngineConfig::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn empty_environment_gives_defaults() {
        let config = from_pairs(&[]).unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.quota_policy(), QuotaPolicy::default());
    }

    #[test]
    fn values_are_read_and_bad_ones_fall_back() {
        let config = from_pairs(&[
            ("LISTEN_ADDR", "127.0.0.1:9000"),
            ("DATABASE_URL", "postgres://localhost/crm"),
            ("QUOTA_LIMIT_BASIC", "250"),
            ("QUOTA_LIMIT_PRO", "lots"),
            ("DELIVERY_WORKERS", "0"),
            ("BENCHMARK_OPEN_RATE", "0.3"),
        ])
        .unwrap();

        assert_eq!(config.listen_addr.port(), 9000);
        assert_eq!(config.database_url.as_deref(), Some("postgres://localhost/crm"));
        assert_eq!(config.quota_limit_basic, 250);
        assert_eq!(config.quota_limit_pro, DEFAULT_PRO_LIMIT);
        assert_eq!(config.delivery_workers, 1);
        assert_eq!(config.benchmarks().open_rate, 0.3);
    }

    #[test]
    fn unparsable_listen_addr_is_an_error() {
        assert!(matches!(
            from_pairs(&[("LISTEN_ADDR", "not-an-address")]),
            Err(ConfigError::ListenAddr { .. })
        ));
    }
}
