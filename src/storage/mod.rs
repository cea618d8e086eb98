//! Object-storage access for the backfill crawler

pub mod client;
pub mod errors;
pub mod swift;

pub use client::{ContainerListing, ListingEntry, StorageClient};
pub use errors::StorageError;
pub use swift::SwiftClient;
