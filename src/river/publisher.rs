//! Turns storage mutations into bulk commands on the river queue

use tracing::info;

use super::mutation::RiverAction;
use crate::broker::{BrokerClient, BrokerError, OutboundMessage};
use crate::document::{
    Document, DocumentError, DocumentId, EntityPath, EntityType, Headers, WireCommand,
    build_properties, document_id,
};

#[derive(Debug, thiserror::Error)]
pub enum RiverError {
    #[error(transparent)]
    Document(#[from] DocumentError),

    #[error(transparent)]
    Broker(#[from] BrokerError),
}

/// Publishes index and delete commands onto the river queue
#[derive(Clone)]
pub struct RiverPublisher {
    broker: BrokerClient,
    index_name: String,
}

impl RiverPublisher {
    pub fn new(broker: BrokerClient, index_name: impl Into<String>) -> Self {
        Self {
            broker,
            index_name: index_name.into(),
        }
    }

    #[must_use]
    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    /// Handle one mutation given the entity's freshly read headers
    ///
    /// Upserts are enqueued without blocking; account paths are rejected.
    pub async fn publish(
        &self,
        path: &EntityPath,
        action: RiverAction,
        headers: &Headers,
    ) -> Result<(), RiverError> {
        match action {
            RiverAction::Upsert => {
                let (id, document) = build_properties(path, headers)?;
                info!(path = %path, "updating {}", path.entity_type());
                self.index_document(id, document, false).await
            }
            RiverAction::Delete => {
                if path.entity_type() == EntityType::Account {
                    return Err(DocumentError::UnsupportedEntity(EntityType::Account).into());
                }
                info!(path = %path, "deleting {}", path.entity_type());
                self.remove_document(document_id(path)).await
            }
        }
    }

    /// Enqueue an upsert command
    pub async fn index_document(
        &self,
        id: DocumentId,
        document: Document,
        block: bool,
    ) -> Result<(), RiverError> {
        let command = WireCommand::upsert(&self.index_name, id, document);
        self.send(&command, block).await
    }

    /// Enqueue a delete command
    pub async fn remove_document(&self, id: DocumentId) -> Result<(), RiverError> {
        let command = WireCommand::delete(&self.index_name, id);
        self.send(&command, false).await
    }

    async fn send(&self, command: &WireCommand, block: bool) -> Result<(), RiverError> {
        let config = self.broker.config();
        let message = OutboundMessage::persistent(
            config.exchange.as_str(),
            config.routing_key.as_str(),
            command.to_ndjson()?,
        );
        self.broker.publish(message, block).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::InMemoryBroker;
    use crate::config::BrokerConfig;

    async fn river() -> (InMemoryBroker, BrokerClient, RiverPublisher) {
        let broker = InMemoryBroker::new();
        let client = BrokerClient::start(BrokerConfig::default(), broker.connector())
            .expect("client");
        client.setup_river().await.expect("setup");
        let river = RiverPublisher::new(client.clone(), "os_default");
        (broker, client, river)
    }

    #[tokio::test]
    async fn test_delete_publishes_one_line() {
        let (broker, client, river) = river().await;
        let path = EntityPath::object("AUTH_a", "c1", "o1");
        river
            .publish(&path, RiverAction::Delete, &Headers::new())
            .await
            .expect("publish");
        client.flush().await;

        let bodies = broker.queued("elasticsearch");
        assert_eq!(bodies.len(), 1);
        let text = String::from_utf8(bodies[0].clone()).expect("utf8");
        assert_eq!(text.lines().count(), 1);
        assert!(text.contains(document_id(&path).as_str()));

        let message = &broker.published()[0];
        assert!(message.persistent);
        assert!(message.mandatory);
        client.stop().await;
    }

    #[tokio::test]
    async fn test_upsert_publishes_document() {
        let (broker, client, river) = river().await;
        let mut headers = Headers::new();
        headers.insert("etag".into(), "abc".into());
        river
            .publish(
                &EntityPath::object("AUTH_a", "c1", "d/o1"),
                RiverAction::Upsert,
                &headers,
            )
            .await
            .expect("publish");
        client.flush().await;

        let text = String::from_utf8(broker.queued("elasticsearch")[0].clone()).expect("utf8");
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        let doc: serde_json::Value = serde_json::from_str(lines[1]).expect("json");
        assert_eq!(doc["hash"], "abc");
        assert_eq!(doc["name"], "o1");
        client.stop().await;
    }

    #[tokio::test]
    async fn test_account_paths_are_rejected() {
        let (_broker, client, river) = river().await;
        let err = river
            .publish(&EntityPath::account("AUTH_a"), RiverAction::Delete, &Headers::new())
            .await
            .unwrap_err();
        assert!(matches!(err, RiverError::Document(DocumentError::UnsupportedEntity(_))));
        client.stop().await;
    }
}
