//! Object-storage listing and metadata interface

use async_trait::async_trait;
use serde::Deserialize;

use super::errors::StorageError;
use crate::document::{EntityPath, Headers};

/// One row of an account or container listing
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ListingEntry {
    pub name: String,
    #[serde(default)]
    pub bytes: Option<u64>,
    #[serde(default)]
    pub hash: Option<String>,
    #[serde(default)]
    pub content_type: Option<String>,
}

impl ListingEntry {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            bytes: None,
            hash: None,
            content_type: None,
        }
    }
}

/// One page of a container listing plus the container's own headers
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerListing {
    pub headers: Headers,
    pub objects: Vec<ListingEntry>,
}

/// The object-storage listing API as seen by the backfill crawler
#[async_trait]
pub trait StorageClient: Send + Sync {
    /// Every container in `account`, following pagination to the end
    async fn list_containers(&self, account: &str) -> Result<Vec<ListingEntry>, StorageError>;

    /// Up to `limit` objects after `marker`, in name order
    async fn list_objects(
        &self,
        account: &str,
        container: &str,
        marker: Option<&str>,
        limit: usize,
    ) -> Result<ContainerListing, StorageError>;

    /// Metadata headers of a container or object
    async fn head(&self, path: &EntityPath) -> Result<Headers, StorageError>;

    /// Obtain a fresh auth token
    async fn refresh_auth(&self) -> Result<(), StorageError>;
}
