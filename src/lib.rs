pub mod backfill;
pub mod broker;
pub mod config;
pub mod document;
pub mod river;
pub mod search;
pub mod storage;

pub use backfill::{BackfillError, BackfillTask, BackfillWorker, HighwaterGate, VerifyReport};
pub use broker::{BrokerClient, BrokerError, ConsumeSummary, InMemoryBroker, OutboundMessage};
pub use config::{Config, ConfigError};
pub use document::{
    Document, DocumentId, EntityPath, EntityType, Headers, WireCommand, build_properties,
    document_id, project_for_result,
};
pub use river::{Mutation, RiverAction, RiverPublisher, classify_mutation};
pub use search::{
    ElasticBackend, SearchBackend, SearchError, SearchQueryBuilder, SearchRequest, SearchResults,
};
pub use storage::{StorageClient, StorageError, SwiftClient};

#[cfg(feature = "amqp")]
pub use broker::AmqpConnector;

/// Declare the river and backfill topology
pub async fn setup_topology(broker: &BrokerClient) -> Result<(), BrokerError> {
    broker.setup_river().await?;
    broker.setup_backfill().await
}

/// Seed a backfill of `account` by publishing its `index_account` task
pub async fn start_backfill(
    broker: &BrokerClient,
    account: &str,
    verify: bool,
) -> Result<(), BackfillError> {
    let task = BackfillTask::IndexAccount {
        account: account.to_string(),
        verify,
    };
    backfill::enqueue(broker, &task).await
}
