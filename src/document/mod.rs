//! Document model
//!
//! Pure mapping from storage-entity metadata to index documents: content
//! addressed ids, property sets, NDJSON bulk commands and result
//! projection. Nothing in here performs I/O.

pub mod entity;
pub mod id;
pub mod projection;
pub mod properties;
pub mod wire;

pub use entity::{EntityPath, EntityType, UnknownEntityType};
pub use id::{DocumentId, document_id};
pub use projection::{RESULT_WHITELIST, project_for_result};
pub use properties::{Document, DocumentError, Headers, build_properties};
pub use wire::{DOCUMENT_TYPE, WireCommand};
