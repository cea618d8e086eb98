//! Live mutation path into the index
//!
//! Classifies completed storage requests and publishes the resulting
//! index or delete command onto the river queue.

pub mod mutation;
pub mod publisher;

pub use mutation::{AUTH_ACCOUNT, Mutation, RiverAction, classify_mutation};
pub use publisher::{RiverError, RiverPublisher};
