//! Backfill task messages
//!
//! Wire form: `{"type": "index_<entity>", "args": [...], "kwargs": {...}}`.
//! `index_container` may carry its marker either as a third positional
//! argument or as `kwargs.marker`.

use serde::{Deserialize, Serialize};

use crate::document::EntityType;

#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("Malformed task body: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Unknown task type '{0}'")]
    UnknownType(String),

    #[error("Task '{kind}' expects {expected} arguments, got {got}")]
    BadArity {
        kind: String,
        expected: &'static str,
        got: usize,
    },
}

/// A unit of backfill work
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackfillTask {
    IndexAccount {
        account: String,
        verify: bool,
    },
    IndexContainer {
        account: String,
        container: String,
        marker: Option<String>,
        verify: bool,
    },
    IndexObject {
        account: String,
        container: String,
        object: String,
        verify: bool,
    },
}

#[derive(Debug, Serialize, Deserialize)]
struct RawTask {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    args: Vec<String>,
    #[serde(default)]
    kwargs: RawKwargs,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct RawKwargs {
    #[serde(default)]
    verify: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    marker: Option<String>,
}

impl BackfillTask {
    /// Entity the task enumerates; also its routing key
    #[must_use]
    pub fn entity_type(&self) -> EntityType {
        match self {
            Self::IndexAccount { .. } => EntityType::Account,
            Self::IndexContainer { .. } => EntityType::Container,
            Self::IndexObject { .. } => EntityType::Object,
        }
    }

    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::IndexAccount { .. } => "index_account",
            Self::IndexContainer { .. } => "index_container",
            Self::IndexObject { .. } => "index_object",
        }
    }

    #[must_use]
    pub fn verify(&self) -> bool {
        match self {
            Self::IndexAccount { verify, .. }
            | Self::IndexContainer { verify, .. }
            | Self::IndexObject { verify, .. } => *verify,
        }
    }

    #[must_use]
    pub fn account(&self) -> &str {
        match self {
            Self::IndexAccount { account, .. }
            | Self::IndexContainer { account, .. }
            | Self::IndexObject { account, .. } => account,
        }
    }

    pub fn to_json(&self) -> Result<Vec<u8>, TaskError> {
        let (args, marker) = match self {
            Self::IndexAccount { account, .. } => (vec![account.clone()], None),
            Self::IndexContainer {
                account,
                container,
                marker,
                ..
            } => (vec![account.clone(), container.clone()], marker.clone()),
            Self::IndexObject {
                account,
                container,
                object,
                ..
            } => (vec![account.clone(), container.clone(), object.clone()], None),
        };
        let raw = RawTask {
            kind: self.type_name().to_string(),
            args,
            kwargs: RawKwargs {
                verify: self.verify(),
                marker,
            },
        };
        Ok(serde_json::to_vec(&raw)?)
    }

    pub fn from_json(body: &[u8]) -> Result<Self, TaskError> {
        let raw: RawTask = serde_json::from_slice(body)?;
        let verify = raw.kwargs.verify;
        let arity = |expected: &'static str| TaskError::BadArity {
            kind: raw.kind.clone(),
            expected,
            got: raw.args.len(),
        };

        match raw.kind.as_str() {
            "index_account" => match raw.args.as_slice() {
                [account] => Ok(Self::IndexAccount {
                    account: account.clone(),
                    verify,
                }),
                _ => Err(arity("1")),
            },
            "index_container" => match raw.args.as_slice() {
                [account, container] => Ok(Self::IndexContainer {
                    account: account.clone(),
                    container: container.clone(),
                    marker: raw.kwargs.marker.clone().filter(|m| !m.is_empty()),
                    verify,
                }),
                [account, container, marker] => Ok(Self::IndexContainer {
                    account: account.clone(),
                    container: container.clone(),
                    marker: Some(marker.clone()).filter(|m| !m.is_empty()),
                    verify,
                }),
                _ => Err(arity("2 or 3")),
            },
            "index_object" => match raw.args.as_slice() {
                [account, container, object] => Ok(Self::IndexObject {
                    account: account.clone(),
                    container: container.clone(),
                    object: object.clone(),
                    verify,
                }),
                _ => Err(arity("3")),
            },
            other => Err(TaskError::UnknownType(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    #[test]
    fn test_wire_shape() {
        let task = BackfillTask::IndexContainer {
            account: "AUTH_a".into(),
            container: "c1".into(),
            marker: Some("o9".into()),
            verify: true,
        };
        let body: Value = serde_json::from_slice(&task.to_json().expect("encode")).expect("json");
        assert_eq!(
            body,
            json!({
                "type": "index_container",
                "args": ["AUTH_a", "c1"],
                "kwargs": { "verify": true, "marker": "o9" }
            })
        );

        let task = BackfillTask::IndexObject {
            account: "AUTH_a".into(),
            container: "c1".into(),
            object: "o1".into(),
            verify: false,
        };
        let body: Value = serde_json::from_slice(&task.to_json().expect("encode")).expect("json");
        assert_eq!(body["kwargs"], json!({ "verify": false }));
    }

    #[test]
    fn test_parse_legacy_forms() {
        let task = BackfillTask::from_json(
            br#"{"type":"index_container","args":["A","c","m1"],"kwargs":{}}"#,
        )
        .expect("parse");
        assert_eq!(
            task,
            BackfillTask::IndexContainer {
                account: "A".into(),
                container: "c".into(),
                marker: Some("m1".into()),
                verify: false,
            }
        );

        let task = BackfillTask::from_json(
            br#"{"type":"index_container","args":["A","c"],"kwargs":{"marker":null,"verify":true}}"#,
        )
        .expect("parse");
        assert!(matches!(task, BackfillTask::IndexContainer { marker: None, verify: true, .. }));
    }

    #[test]
    fn test_rejections() {
        assert!(matches!(
            BackfillTask::from_json(b"not json"),
            Err(TaskError::Malformed(_))
        ));
        assert!(matches!(
            BackfillTask::from_json(br#"{"type":"index_cluster","args":[]}"#),
            Err(TaskError::UnknownType(kind)) if kind == "index_cluster"
        ));
        assert!(matches!(
            BackfillTask::from_json(br#"{"type":"index_object","args":["A","c"]}"#),
            Err(TaskError::BadArity { got: 2, .. })
        ));
    }
}
