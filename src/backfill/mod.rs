//! Backfill crawler
//!
//! Re-publishes the whole storage hierarchy into the river through a chain
//! of account, container and object tasks, throttled against the depth of
//! the queue each level feeds.

pub mod errors;
pub mod highwater;
pub mod task;
pub mod verify;
pub mod worker;

pub use errors::BackfillError;
pub use highwater::{GateDecision, HighwaterGate, HighwaterState, WaterSource};
pub use task::{BackfillTask, TaskError};
pub use verify::{FieldMismatch, VerifyReport, compare_fields, verify_document};
pub use worker::{BackfillWorker, enqueue};
