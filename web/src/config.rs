//! Server configuration.
//!
//! Loads configuration from environment variables with sensible defaults.
//! A `.env` file is read first if present.

use std::env;
use std::time::Duration;
use stockhold_engine::config::DEFAULT_NAMESPACE;
use stockhold_engine::{EngineConfig, KeySpace, ReservationPolicy, SweepSettings};
use stockhold_redis::RedisStoreConfig;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Redis connection settings
    pub redis: RedisStoreConfig,
    /// Key layout, hold limits and sweep interval
    pub engine: EngineConfig,
    /// HTTP listener
    pub server: ListenConfig,
    /// Prometheus exporter listener
    pub metrics: ListenConfig,
}

/// Host and port to bind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenConfig {
    /// Bind host (default: 0.0.0.0)
    pub host: String,
    /// Bind port
    pub port: u16,
}

impl ListenConfig {
    /// `host:port`.
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Config {
    /// Load configuration from the process environment.
    ///
    /// # Environment Variables
    ///
    /// - `REDIS_URL`: Redis URL (default: `redis://127.0.0.1:6379`)
    /// - `REDIS_CONNECT_TIMEOUT_MS`: connect timeout (default: 5000)
    /// - `REDIS_COMMAND_TIMEOUT_MS`: per-command timeout (default: 2000)
    /// - `STOCKHOLD_KEY_PREFIX`: key namespace (default: `stockhold:`)
    /// - `RESERVATION_TTL_SECS`: hold lifetime (default: 600)
    /// - `MAX_RESERVATIONS_PER_ITEM`: reserved units per item (default: 25)
    /// - `MAX_RESERVATIONS_PER_IP`: holds per client address (default: 5)
    /// - `MAX_HOLD_QUANTITY`: units per hold (default: 10)
    /// - `SWEEP_INTERVAL_SECS`: scheduled sweep interval, 0 disables (default: 300)
    /// - `HOST` / `PORT`: HTTP listener (default: 0.0.0.0:8080)
    /// - `METRICS_HOST` / `METRICS_PORT`: Prometheus listener (default: 0.0.0.0:9000)
    #[must_use]
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration from an arbitrary variable source.
    ///
    /// Unset or unparsable values fall back to their defaults.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let parsed = |name: &str| lookup(name).and_then(|s| s.trim().parse::<u64>().ok());
        let parsed_u32 = |name: &str, default: u32| {
            parsed(name)
                .and_then(|v| u32::try_from(v).ok())
                .unwrap_or(default)
        };
        let parsed_port = |name: &str, default: u16| {
            parsed(name)
                .and_then(|v| u16::try_from(v).ok())
                .unwrap_or(default)
        };

        let policy_defaults = ReservationPolicy::default();
        let sweep_defaults = SweepSettings::default();

        let mut redis = RedisStoreConfig::new(
            lookup("REDIS_URL").unwrap_or_else(|| "redis://127.0.0.1:6379".to_string()),
        );
        if let Some(ms) = parsed("REDIS_CONNECT_TIMEOUT_MS") {
            redis.connect_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = parsed("REDIS_COMMAND_TIMEOUT_MS") {
            redis.command_timeout = Duration::from_millis(ms);
        }

        Self {
            redis,
            engine: EngineConfig {
                keys: KeySpace::new(
                    lookup("STOCKHOLD_KEY_PREFIX")
                        .filter(|prefix| !prefix.trim().is_empty())
                        .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string()),
                ),
                policy: ReservationPolicy {
                    ttl: parsed("RESERVATION_TTL_SECS")
                        .filter(|secs| *secs > 0)
                        .map_or(policy_defaults.ttl, Duration::from_secs),
                    max_per_item: parsed_u32("MAX_RESERVATIONS_PER_ITEM", policy_defaults.max_per_item),
                    max_per_ip: parsed_u32("MAX_RESERVATIONS_PER_IP", policy_defaults.max_per_ip),
                    max_quantity: parsed_u32("MAX_HOLD_QUANTITY", policy_defaults.max_quantity),
                },
                sweep: SweepSettings {
                    interval: parsed("SWEEP_INTERVAL_SECS")
                        .map_or(sweep_defaults.interval, Duration::from_secs),
                },
            },
            server: ListenConfig {
                host: lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
                port: parsed_port("PORT", 8080),
            },
            metrics: ListenConfig {
                host: lookup("METRICS_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
                port: parsed_port("METRICS_PORT", 9000),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]);
        assert_eq!(config.redis.url, "redis://127.0.0.1:6379");
        assert_eq!(config.engine.keys.namespace(), "stockhold:");
        assert_eq!(config.engine.policy.ttl, Duration::from_secs(600));
        assert_eq!(config.engine.policy.max_per_item, 25);
        assert_eq!(config.engine.policy.max_per_ip, 5);
        assert_eq!(config.engine.policy.max_quantity, 10);
        assert_eq!(config.engine.sweep.interval, Duration::from_secs(300));
        assert_eq!(config.server.address(), "0.0.0.0:8080");
        assert_eq!(config.metrics.port, 9000);
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("REDIS_URL", "redis://cache:6379/2"),
            ("REDIS_COMMAND_TIMEOUT_MS", "250"),
            ("STOCKHOLD_KEY_PREFIX", "shop:"),
            ("RESERVATION_TTL_SECS", "120"),
            ("MAX_RESERVATIONS_PER_IP", "2"),
            ("SWEEP_INTERVAL_SECS", "0"),
            ("PORT", "3000"),
        ]);
        assert_eq!(config.redis.url, "redis://cache:6379/2");
        assert_eq!(config.redis.command_timeout, Duration::from_millis(250));
        assert_eq!(config.engine.keys.namespace(), "shop:");
        assert_eq!(config.engine.policy.ttl, Duration::from_secs(120));
        assert_eq!(config.engine.policy.max_per_ip, 2);
        assert!(config.engine.sweep.interval.is_zero());
        assert_eq!(config.server.port, 3000);
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = config_from(&[
            ("PORT", "not-a-port"),
            ("RESERVATION_TTL_SECS", "0"),
            ("MAX_HOLD_QUANTITY", "-1"),
        ]);
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.engine.policy.ttl, Duration::from_secs(600));
        assert_eq!(config.engine.policy.max_quantity, 10);
    }
}
