//! Loading, validation and derived accessors for `Config`

use std::path::Path;
use std::time::Duration;

use super::errors::ConfigError;
use super::types::{BackfillConfig, BrokerConfig, BrokerEndpoint, Config, WaterLevel};
use crate::document::EntityType;

impl Config {
    /// Parse a JSON configuration document
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a JSON configuration file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    /// Check cross-field invariants
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.broker.endpoints()?;
        if self.broker.buffer_size == 0 {
            return Err(ConfigError::Invalid("broker.buffer_size must be at least 1".into()));
        }
        if self.broker.send_attempts == 0 {
            return Err(ConfigError::Invalid("broker.send_attempts must be at least 1".into()));
        }
        if self.broker.keepalive_poll_secs == 0 || self.broker.keepalive_backoff_secs == 0 {
            return Err(ConfigError::Invalid(
                "broker keep-alive poll and backoff must be at least 1 second".into(),
            ));
        }
        if self.backfill.container_listing_count == 0 {
            return Err(ConfigError::Invalid(
                "backfill.container_listing_count must be at least 1".into(),
            ));
        }
        for (name, level) in [
            ("river", &self.backfill.water_levels.river),
            ("object", &self.backfill.water_levels.object),
            ("container", &self.backfill.water_levels.container),
        ] {
            if level.interval_secs == 0 {
                return Err(ConfigError::Invalid(format!(
                    "water_levels.{name}.interval_secs must be at least 1"
                )));
            }
            if level.highwater_ok > level.highwater {
                return Err(ConfigError::Invalid(format!(
                    "water_levels.{name}: highwater_ok ({}) exceeds highwater ({})",
                    level.highwater_ok, level.highwater
                )));
            }
        }
        if self.index.elastic_hosts.is_empty() {
            return Err(ConfigError::Invalid("index.elastic_hosts is empty".into()));
        }
        Ok(())
    }
}

impl BrokerConfig {
    /// Parsed candidate endpoints
    pub fn endpoints(&self) -> Result<Vec<BrokerEndpoint>, ConfigError> {
        if self.hosts.is_empty() {
            return Err(ConfigError::Invalid("broker.hosts is empty".into()));
        }
        self.hosts.iter().map(|h| h.parse()).collect()
    }

    #[must_use]
    pub fn keepalive_poll(&self) -> Duration {
        Duration::from_secs(self.keepalive_poll_secs)
    }

    #[must_use]
    pub fn keepalive_backoff(&self) -> Duration {
        Duration::from_secs(self.keepalive_backoff_secs)
    }
}

impl BackfillConfig {
    /// Batch size for the given backfill queue
    #[must_use]
    pub fn prefetch_for(&self, queue: EntityType) -> u16 {
        match queue {
            EntityType::Account => self.prefetch.account,
            EntityType::Container => self.prefetch.container,
            EntityType::Object => self.prefetch.object,
        }
    }
}

impl WaterLevel {
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = Config::default();
        config.validate().expect("defaults are valid");
        assert_eq!(config.broker.send_attempts, 2);
        assert_eq!(config.broker.buffer_size, 50_000);
        assert_eq!(config.backfill.container_listing_count, 5000);
        assert_eq!(config.backfill.water_levels.river.highwater, 500_000);
        assert_eq!(config.backfill.water_levels.river.highwater_ok, 10_000);
        assert_eq!(config.index.search_index_name, "os_default");
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = Config::from_json_str(
            r#"{
                "broker": { "hosts": ["10.0.0.1:5672", "10.0.0.2:5673"], "send_attempts": 5 },
                "backfill": { "prefetch": { "object": 250 } }
            }"#,
        )
        .expect("valid config");

        assert_eq!(config.broker.send_attempts, 5);
        assert_eq!(config.broker.vhost, "swift");
        assert_eq!(config.backfill.prefetch_for(EntityType::Object), 250);
        assert_eq!(config.backfill.prefetch_for(EntityType::Container), 100);

        let endpoints = config.broker.endpoints().expect("endpoints parse");
        assert_eq!(endpoints[1], BrokerEndpoint { host: "10.0.0.2".into(), port: 5673 });
    }

    #[test]
    fn test_bad_endpoint_is_rejected() {
        let err = Config::from_json_str(r#"{ "broker": { "hosts": ["rabbit"] } }"#).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEndpoint(_)));

        let err = Config::from_json_str(r#"{ "broker": { "hosts": ["rabbit:amqp"] } }"#).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEndpoint(_)));
    }

    #[test]
    fn test_inverted_water_levels_are_rejected() {
        let err = Config::from_json_str(
            r#"{ "backfill": { "water_levels": { "object": { "highwater": 10, "highwater_ok": 20 } } } }"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(msg) if msg.contains("object")));
    }

    #[test]
    fn test_zero_intervals_are_rejected() {
        let err = Config::from_json_str(r#"{ "broker": { "keepalive_poll_secs": 0 } }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(msg) if msg.contains("keep-alive")));

        let err = Config::from_json_str(
            r#"{ "backfill": { "water_levels": { "container": { "interval_secs": 0 } } } }"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(msg) if msg.contains("container.interval_secs")));
    }

    #[test]
    fn test_zero_send_attempts_is_rejected() {
        let err = Config::from_json_str(r#"{ "broker": { "send_attempts": 0 } }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }
}
