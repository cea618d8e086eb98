//! Storage entity identity
//!
//! An entity is addressed by one to three path segments
//! (`account[/container[/object]]`). The enum makes "object without a
//! container" unrepresentable.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of storage entity, also used as the backfill routing key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Account,
    Container,
    Object,
}

impl EntityType {
    /// All entity types, leaf-last
    pub const ALL: [EntityType; 3] = [Self::Account, Self::Container, Self::Object];

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Account => "account",
            Self::Container => "container",
            Self::Object => "object",
        }
    }

    /// Metadata header prefix for this entity type
    #[must_use]
    pub const fn meta_prefix(&self) -> &'static str {
        match self {
            Self::Account => "x-account-meta-",
            Self::Container => "x-container-meta-",
            Self::Object => "x-object-meta-",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown entity type name
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown entity type: {0}")]
pub struct UnknownEntityType(pub String);

impl FromStr for EntityType {
    type Err = UnknownEntityType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "account" => Ok(Self::Account),
            "container" => Ok(Self::Container),
            "object" => Ok(Self::Object),
            other => Err(UnknownEntityType(other.to_string())),
        }
    }
}

/// Fully-qualified path of a storage entity
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EntityPath {
    Account {
        account: String,
    },
    Container {
        account: String,
        container: String,
    },
    Object {
        account: String,
        container: String,
        object: String,
    },
}

impl EntityPath {
    pub fn account(account: impl Into<String>) -> Self {
        Self::Account {
            account: account.into(),
        }
    }

    pub fn container(account: impl Into<String>, container: impl Into<String>) -> Self {
        Self::Container {
            account: account.into(),
            container: container.into(),
        }
    }

    pub fn object(
        account: impl Into<String>,
        container: impl Into<String>,
        object: impl Into<String>,
    ) -> Self {
        Self::Object {
            account: account.into(),
            container: container.into(),
            object: object.into(),
        }
    }

    #[must_use]
    pub fn entity_type(&self) -> EntityType {
        match self {
            Self::Account { .. } => EntityType::Account,
            Self::Container { .. } => EntityType::Container,
            Self::Object { .. } => EntityType::Object,
        }
    }

    #[must_use]
    pub fn account_name(&self) -> &str {
        match self {
            Self::Account { account }
            | Self::Container { account, .. }
            | Self::Object { account, .. } => account,
        }
    }

    #[must_use]
    pub fn container_name(&self) -> Option<&str> {
        match self {
            Self::Account { .. } => None,
            Self::Container { container, .. } | Self::Object { container, .. } => Some(container),
        }
    }

    #[must_use]
    pub fn object_name(&self) -> Option<&str> {
        match self {
            Self::Object { object, .. } => Some(object),
            _ => None,
        }
    }

    /// Path segments in hierarchy order
    #[must_use]
    pub fn segments(&self) -> Vec<&str> {
        match self {
            Self::Account { account } => vec![account],
            Self::Container { account, container } => vec![account, container],
            Self::Object {
                account,
                container,
                object,
            } => vec![account, container, object],
        }
    }
}

impl fmt::Display for EntityPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments().join("/"))
    }
}
