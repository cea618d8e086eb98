//! Which storage API requests change the index

use crate::document::EntityPath;

/// Account used by the auth subsystem; never indexed
pub const AUTH_ACCOUNT: &str = "AUTH_.auth";

/// What a mutation does to the index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RiverAction {
    /// Re-read the entity and (re)index it
    Upsert,
    Delete,
}

/// An index-relevant change to one container or object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mutation {
    pub action: RiverAction,
    pub path: EntityPath,
}

/// Classify a completed storage request
///
/// Only successful (2xx) `PUT`, `POST`, `COPY` and `DELETE` requests on
/// `/v1/<account>/<container>[/<object>]` produce a mutation.
#[must_use]
pub fn classify_mutation(method: &str, request_path: &str, status: u16) -> Option<Mutation> {
    if status / 100 != 2 {
        return None;
    }
    let action = match method {
        "PUT" | "POST" | "COPY" => RiverAction::Upsert,
        "DELETE" => RiverAction::Delete,
        _ => return None,
    };

    let trimmed = request_path.strip_prefix('/')?;
    let mut segments = trimmed.splitn(4, '/');
    let _version = segments.next().filter(|v| !v.is_empty())?;
    let account = decode(segments.next()?)?;
    let container = decode(segments.next()?)?;
    let object = match segments.next() {
        Some(raw) => Some(decode(raw)?),
        None => None,
    };

    if account.is_empty() || container.is_empty() || account == AUTH_ACCOUNT {
        return None;
    }

    let path = match object.filter(|o| !o.is_empty()) {
        Some(object) => EntityPath::object(account, container, object),
        None => EntityPath::container(account, container),
    };
    Some(Mutation { action, path })
}

fn decode(raw: &str) -> Option<String> {
    urlencoding::decode(raw).ok().map(|s| s.into_owned())
}
