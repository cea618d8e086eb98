//! Core configuration types
//!
//! One `Config` value is built at startup and handed to each component
//! constructor. Every section deserializes with per-field defaults, so a
//! configuration file only needs to name the values it overrides.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::errors::ConfigError;

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub broker: BrokerConfig,
    pub backfill: BackfillConfig,
    pub index: IndexConfig,
    pub storage: StorageConfig,
}

/// Message broker connection, topology and reliability settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Candidate broker endpoints as `host:port`
    ///
    /// The list is shuffled on every (re)connect and tried in turn.
    pub hosts: Vec<String>,
    pub user: String,
    pub password: String,
    pub vhost: String,

    /// Capacity of the in-process publish buffer
    ///
    /// A non-blocking publish into a full buffer fails fast and the message
    /// is lost.
    ///
    /// Default: 50 000
    pub buffer_size: usize,

    /// Put the publishing channel into confirm mode
    ///
    /// Default: false
    pub require_confirmations: bool,

    /// Delivery attempts per buffered message before it is dropped
    ///
    /// Default: 2
    pub send_attempts: u32,

    /// Connection attempts per endpoint before moving on to the next one
    pub connection_attempts: u32,

    /// Heartbeat interval negotiated with the broker, in seconds
    pub heartbeat_secs: u16,

    /// Keep-alive poll interval while the connection is healthy
    ///
    /// Default: 4 seconds
    pub keepalive_poll_secs: u64,

    /// Keep-alive back-off after a failed heartbeat
    ///
    /// Default: 60 seconds
    pub keepalive_backoff_secs: u64,

    /// A consume batch ends early once the queue has been idle this long
    ///
    /// Default: 2000 ms
    pub consume_idle_ms: u64,

    /// River exchange, queue and routing key
    pub exchange: String,
    pub queue: String,
    pub routing_key: String,

    /// Backfill exchange and queue-name prefix
    ///
    /// Per-entity queues are named `<backfill_queue>.<entity type>`.
    pub backfill_exchange: String,
    pub backfill_queue: String,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            hosts: vec!["127.0.0.1:5672".to_string()],
            user: "elasticsearch".to_string(),
            password: "elasticsearch".to_string(),
            vhost: "swift".to_string(),
            buffer_size: 50_000,
            require_confirmations: false,
            send_attempts: 2,
            connection_attempts: 2,
            heartbeat_secs: 20,
            keepalive_poll_secs: 4,
            keepalive_backoff_secs: 60,
            consume_idle_ms: 2000,
            exchange: "search.exchange".to_string(),
            queue: "elasticsearch".to_string(),
            routing_key: "search".to_string(),
            backfill_exchange: "search.backfill".to_string(),
            backfill_queue: "search.backfill".to_string(),
        }
    }
}

/// Backfill crawler settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackfillConfig {
    /// Object listing page size for `index_container`
    ///
    /// A page of exactly this many objects schedules a continuation task.
    ///
    /// Default: 5000
    pub container_listing_count: usize,
    pub prefetch: PrefetchConfig,
    pub water_levels: WaterLevels,
}

impl Default for BackfillConfig {
    fn default() -> Self {
        Self {
            container_listing_count: 5000,
            prefetch: PrefetchConfig::default(),
            water_levels: WaterLevels::default(),
        }
    }
}

/// Messages consumed per batch, per backfill queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrefetchConfig {
    pub account: u16,
    pub container: u16,
    pub object: u16,
}

impl Default for PrefetchConfig {
    fn default() -> Self {
        Self {
            account: 100,
            container: 100,
            object: 100,
        }
    }
}

/// High-water thresholds for each watched queue
///
/// `river` gates object backfill, `object` gates container backfill and
/// `container` gates account backfill.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WaterLevels {
    pub river: WaterLevel,
    pub object: WaterLevel,
    pub container: WaterLevel,
}

/// Hysteresis thresholds for one watched queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WaterLevel {
    /// Depth above which the dependent producer is suspended
    pub highwater: u64,
    /// Depth at or below which a suspended producer resumes
    pub highwater_ok: u64,
    /// Sleep between depth checks while suspended, in seconds
    pub interval_secs: u64,
}

impl Default for WaterLevel {
    fn default() -> Self {
        Self {
            highwater: 500_000,
            highwater_ok: 10_000,
            interval_secs: 3,
        }
    }
}

/// Search index settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    pub search_index_name: String,
    /// Search engine endpoints as `host:port` or full URLs, tried in order
    pub elastic_hosts: Vec<String>,
    pub request_timeout_secs: u64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            search_index_name: "os_default".to_string(),
            elastic_hosts: vec!["127.0.0.1:9200".to_string()],
            request_timeout_secs: 10,
        }
    }
}

/// Object-storage API settings used by the backfill crawler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Base URL; entity URLs are `<storage_url>/v1/<account>/...`
    pub storage_url: String,
    /// v1.0 token endpoint
    pub auth_url: String,
    pub auth_user: String,
    pub auth_key: String,
    pub request_timeout_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            storage_url: "http://127.0.0.1".to_string(),
            auth_url: "http://127.0.0.1/auth/v1.0".to_string(),
            auth_user: ".super_admin:.super_admin".to_string(),
            auth_key: String::new(),
            request_timeout_secs: 10,
        }
    }
}

/// A broker endpoint parsed from `host:port`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BrokerEndpoint {
    pub host: String,
    pub port: u16,
}

impl FromStr for BrokerEndpoint {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| ConfigError::InvalidEndpoint(s.to_string()))?;
        if host.is_empty() {
            return Err(ConfigError::InvalidEndpoint(s.to_string()));
        }
        let port = port
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidEndpoint(s.to_string()))?;
        Ok(Self {
            host: host.to_string(),
            port,
        })
    }
}

impl fmt::Display for BrokerEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}
