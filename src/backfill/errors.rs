use super::task::TaskError;
use crate::broker::BrokerError;
use crate::document::DocumentError;
use crate::river::RiverError;
use crate::search::SearchError;
use crate::storage::StorageError;

/// Errors raised while executing a backfill task
#[derive(Debug, thiserror::Error)]
pub enum BackfillError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Broker(#[from] BrokerError),

    #[error(transparent)]
    Search(#[from] SearchError),

    #[error(transparent)]
    Document(#[from] DocumentError),

    #[error(transparent)]
    Task(#[from] TaskError),

    /// Verification expects exactly one indexed document per id
    #[error("{found} documents indexed for {id} instead of 1")]
    VerifyHitCount { id: String, found: u64 },
}

impl From<RiverError> for BackfillError {
    fn from(error: RiverError) -> Self {
        match error {
            RiverError::Document(e) => Self::Document(e),
            RiverError::Broker(e) => Self::Broker(e),
        }
    }
}
