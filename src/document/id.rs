//! Content-addressed document identifiers

use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use std::fmt;

use super::entity::EntityPath;

/// SHA-1 hex digest of an entity's path segments joined with `:`
///
/// Re-indexing the same entity always yields the same id, so index
/// commands are upserts and never create a second document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    /// Compute the id for an account, container or object
    #[must_use]
    pub fn for_parts(account: &str, container: Option<&str>, object: Option<&str>) -> Self {
        let mut key = String::with_capacity(
            account.len() + container.map_or(0, str::len) + object.map_or(0, str::len) + 2,
        );
        key.push_str(account);
        if let Some(container) = container {
            key.push(':');
            key.push_str(container);
        }
        if let Some(object) = object {
            key.push(':');
            key.push_str(object);
        }
        Self(hex::encode(Sha1::digest(key.as_bytes())))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Document id for an entity path
#[must_use]
pub fn document_id(path: &EntityPath) -> DocumentId {
    DocumentId::for_parts(path.account_name(), path.container_name(), path.object_name())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_known_digests() {
        let account = DocumentId::for_parts("AUTH_test", None, None);
        assert_eq!(account.as_str().len(), 40);
        assert!(account.as_str().chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_eq!(
            DocumentId::for_parts("a", Some("b"), Some("c")).as_str(),
            hex::encode(Sha1::digest(b"a:b:c"))
        );
        // sha1("abc") is a published test vector
        assert_eq!(
            DocumentId::for_parts("abc", None, None).as_str(),
            "a9993e364706816aba3e25717850c26c9cd0d89d"
        );
    }

    #[test]
    fn test_path_and_parts_agree() {
        let path = EntityPath::object("AUTH_a", "c", "dir/o.txt");
        assert_eq!(
            document_id(&path),
            DocumentId::for_parts("AUTH_a", Some("c"), Some("dir/o.txt"))
        );
    }

    #[test]
    fn test_non_ascii_segments_are_utf8_encoded() {
        let id = DocumentId::for_parts("AUTH_a", Some("日本"), Some("ファイル"));
        assert_eq!(
            id.as_str(),
            hex::encode(Sha1::digest("AUTH_a:日本:ファイル".as_bytes()))
        );
    }

    proptest! {
        #[test]
        fn prop_document_id_is_deterministic(
            account in "[A-Za-z0-9_]{1,16}",
            container in "[^/]{1,16}",
            object in ".{1,32}",
        ) {
            let path = EntityPath::object(account, container, object);
            prop_assert_eq!(document_id(&path), document_id(&path.clone()));
        }

        #[test]
        fn prop_container_and_object_ids_differ(
            account in "[A-Za-z0-9_]{1,16}",
            container in "[a-z]{1,16}",
            object in "[a-z]{1,16}",
        ) {
            let container_id = DocumentId::for_parts(&account, Some(&container), None);
            let object_id = DocumentId::for_parts(&account, Some(&container), Some(&object));
            prop_assert_ne!(container_id, object_id);
        }
    }
}
