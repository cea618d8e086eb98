//! Configuration module
//!
//! This module provides the immutable `Config` value passed to every
//! component constructor, with serde defaults and validation.

pub mod errors;
pub mod methods;
pub mod types;

pub use errors::ConfigError;
pub use types::{
    BackfillConfig, BrokerConfig, BrokerEndpoint, Config, IndexConfig, PrefetchConfig,
    StorageConfig, WaterLevel, WaterLevels,
};
