//! `BrokerClient`: the public face of the broker layer
//!
//! Owns the shared session, the publish buffer and the two background tasks
//! (keep-alive and publish drainer). Cheap to clone.

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::connection::ConnectionManager;
use super::errors::BrokerError;
use super::keepalive::spawn_keepalive;
use super::publisher::Publisher;
use super::stats::PublishStatsSnapshot;
use super::topology;
use super::transport::{BrokerChannel, BrokerConnector, OutboundMessage};
use crate::config::BrokerConfig;
use crate::document::EntityType;

/// Result of one flow-controlled consume batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumeSummary {
    pub acked: u64,
    pub requeued: u64,
    /// A handler failed and the batch stopped early
    pub aborted: bool,
}

impl ConsumeSummary {
    #[must_use]
    pub fn fetched(&self) -> u64 {
        self.acked + self.requeued
    }
}

struct Inner {
    config: BrokerConfig,
    connections: Arc<ConnectionManager>,
    publisher: Publisher,
    stop_tx: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

#[derive(Clone)]
pub struct BrokerClient {
    inner: Arc<Inner>,
}

impl BrokerClient {
    /// Build the client and spawn its background tasks
    ///
    /// No connection is made until the first operation needs one.
    pub fn start(
        config: BrokerConfig,
        connector: Arc<dyn BrokerConnector>,
    ) -> Result<Self, BrokerError> {
        let connections = Arc::new(ConnectionManager::new(config.clone(), connector)?);
        let (stop_tx, stop_rx) = watch::channel(false);

        let keepalive = spawn_keepalive(
            Arc::clone(&connections),
            config.keepalive_poll(),
            config.keepalive_backoff(),
            stop_rx.clone(),
        );
        let (publisher, drainer) = Publisher::spawn(
            Arc::clone(&connections),
            config.buffer_size,
            config.send_attempts,
            stop_rx,
        );

        info!(
            "Broker client started: {} endpoints, buffer {}, {} send attempts",
            config.hosts.len(),
            config.buffer_size,
            config.send_attempts
        );

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                connections,
                publisher,
                stop_tx,
                tasks: Mutex::new(vec![keepalive, drainer]),
            }),
        })
    }

    #[must_use]
    pub fn config(&self) -> &BrokerConfig {
        &self.inner.config
    }

    /// Enqueue a message for reliable background delivery
    pub async fn publish(&self, message: OutboundMessage, block: bool) -> Result<(), BrokerError> {
        if *self.inner.stop_tx.borrow() {
            return Err(BrokerError::Shutdown);
        }
        self.inner.publisher.publish(message, block).await
    }

    /// Send synchronously on the current session
    ///
    /// Failures invalidate the session and are returned to the caller.
    pub async fn publish_direct(&self, message: &OutboundMessage) -> Result<(), BrokerError> {
        let session = self.inner.connections.session().await?;
        match session.channel.publish(message).await {
            Ok(true) => Ok(()),
            Ok(false) => {
                self.inner.connections.invalidate().await;
                Err(BrokerError::NotConfirmed)
            }
            Err(e) => {
                self.inner.connections.invalidate().await;
                Err(e)
            }
        }
    }

    /// Wait until the publish buffer has been fully processed
    pub async fn flush(&self) {
        self.inner.publisher.flush().await;
    }

    #[must_use]
    pub fn stats(&self) -> PublishStatsSnapshot {
        self.inner.publisher.stats().snapshot()
    }

    /// Name of the durable backfill queue for `entity`
    #[must_use]
    pub fn backfill_queue_name(&self, entity: EntityType) -> String {
        topology::backfill_queue_name(&self.inner.config, entity)
    }

    #[must_use]
    pub fn river_queue_name(&self) -> &str {
        &self.inner.config.queue
    }

    /// Consume up to `prefetch` messages from a backfill queue
    ///
    /// Each message is acked after `handler` succeeds. The first handler
    /// error nacks that message with requeue and ends the batch. The batch
    /// also ends when the queue stays idle for `consume_idle_ms`. The
    /// channel is closed on exit, returning anything unacked to the queue.
    pub async fn consume<F, Fut, E>(
        &self,
        queue_type: EntityType,
        prefetch: u16,
        mut handler: F,
    ) -> Result<ConsumeSummary, BrokerError>
    where
        F: FnMut(Vec<u8>) -> Fut,
        Fut: Future<Output = Result<(), E>>,
        E: Display,
    {
        let queue = self.backfill_queue_name(queue_type);
        let channel = self.fresh_channel().await?;
        let limit = u64::from(prefetch.max(1));
        let idle = Duration::from_millis(self.inner.config.consume_idle_ms);
        let mut summary = ConsumeSummary::default();

        let outcome: Result<(), BrokerError> = async {
            channel.set_prefetch(prefetch).await?;
            let mut deliveries = channel.consume(&queue).await?;

            while summary.fetched() < limit {
                let delivery = match tokio::time::timeout(idle, deliveries.next()).await {
                    Err(_) => {
                        debug!("Queue {} idle, ending batch after {}", queue, summary.fetched());
                        break;
                    }
                    Ok(None) => break,
                    Ok(Some(delivery)) => delivery?,
                };

                match handler(delivery.body).await {
                    Ok(()) => {
                        channel.ack(delivery.delivery_tag).await?;
                        summary.acked += 1;
                    }
                    Err(e) => {
                        error!("Handler failed on {} message, requeueing: {}", queue, e);
                        channel.nack(delivery.delivery_tag, true).await?;
                        summary.requeued += 1;
                        summary.aborted = true;
                        break;
                    }
                }
            }
            Ok(())
        }
        .await;

        if let Err(e) = channel.close().await {
            debug!("Closing consumer channel for {}: {}", queue, e);
        }
        if let Err(e) = &outcome {
            if e.is_transient() {
                self.inner.connections.invalidate().await;
            }
        }
        outcome.map(|()| summary)
    }

    /// Declare the river exchange, queue and binding
    pub async fn setup_river(&self) -> Result<(), BrokerError> {
        let channel = self.fresh_channel().await?;
        let result = topology::declare_river(channel.as_ref(), &self.inner.config).await;
        let _ = channel.close().await;
        if result.is_ok() {
            info!(
                "River topology ready: {} -> {} ({})",
                self.inner.config.exchange, self.inner.config.queue, self.inner.config.routing_key
            );
        }
        result
    }

    /// Declare the backfill exchange and per-type queues
    pub async fn setup_backfill(&self) -> Result<(), BrokerError> {
        let channel = self.fresh_channel().await?;
        let result = topology::declare_backfill(channel.as_ref(), &self.inner.config).await;
        let _ = channel.close().await;
        if result.is_ok() {
            info!("Backfill topology ready on {}", self.inner.config.backfill_exchange);
        }
        result
    }

    /// Ready-message count of `name`, `None` if the queue does not exist
    pub async fn queue_size(&self, name: &str) -> Result<Option<u32>, BrokerError> {
        let channel = self.fresh_channel().await?;
        let result = channel.queue_message_count(name).await;
        let _ = channel.close().await;
        if let Err(e) = &result {
            warn!("Queue size check for {} failed: {}", name, e);
        }
        result
    }

    /// Stop the background tasks and close the session
    ///
    /// Messages already buffered are still delivered before the drainer exits.
    pub async fn stop(&self) {
        let _ = self.inner.stop_tx.send(true);
        let tasks: Vec<JoinHandle<()>> = self.inner.tasks.lock().drain(..).collect();
        for task in tasks {
            if let Err(e) = task.await {
                warn!("Broker background task ended abnormally: {}", e);
            }
        }
        self.inner.connections.close().await;
        info!("Broker client stopped");
    }

    async fn fresh_channel(&self) -> Result<Arc<dyn BrokerChannel>, BrokerError> {
        let session = self.inner.connections.session().await?;
        match session.connection.open_channel().await {
            Ok(channel) => Ok(channel),
            Err(e) => {
                self.inner.connections.invalidate().await;
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::InMemoryBroker;

    fn test_config() -> BrokerConfig {
        BrokerConfig {
            consume_idle_ms: 50,
            ..BrokerConfig::default()
        }
    }

    #[tokio::test]
    async fn test_setup_river_declares_ha_queue() {
        let broker = InMemoryBroker::new();
        let client = BrokerClient::start(test_config(), broker.connector()).expect("client");

        client.setup_river().await.expect("setup");
        client.setup_river().await.expect("idempotent");

        let spec = broker.queue_spec("elasticsearch").expect("queue declared");
        assert!(spec.durable);
        assert_eq!(spec.ha_policy.as_deref(), Some("all"));
        assert!(broker.is_bound("elasticsearch", "search.exchange", "search"));
        client.stop().await;
    }

    #[tokio::test]
    async fn test_setup_backfill_declares_queue_per_type() {
        let broker = InMemoryBroker::new();
        let client = BrokerClient::start(test_config(), broker.connector()).expect("client");
        client.setup_backfill().await.expect("setup");

        for entity in EntityType::ALL {
            let queue = format!("search.backfill.{entity}");
            assert!(broker.is_bound(&queue, "search.backfill", entity.as_str()));
        }
        client.stop().await;
    }

    #[tokio::test]
    async fn test_queue_size_unknown_queue() {
        let broker = InMemoryBroker::new();
        let client = BrokerClient::start(test_config(), broker.connector()).expect("client");
        assert_eq!(client.queue_size("missing").await.expect("size"), None);

        client.setup_river().await.expect("setup");
        assert_eq!(client.queue_size("elasticsearch").await.expect("size"), Some(0));
        client.stop().await;
    }

    #[tokio::test]
    async fn test_buffered_publish_is_delivered_in_order() {
        let broker = InMemoryBroker::new();
        let client = BrokerClient::start(test_config(), broker.connector()).expect("client");
        client.setup_river().await.expect("setup");

        for i in 0..10u8 {
            client
                .publish(OutboundMessage::persistent("search.exchange", "search", vec![i]), true)
                .await
                .expect("enqueue");
        }
        client.flush().await;

        let bodies: Vec<Vec<u8>> = broker.queued("elasticsearch");
        assert_eq!(bodies, (0..10u8).map(|i| vec![i]).collect::<Vec<_>>());
        let stats = client.stats();
        assert_eq!(stats.delivered, 10);
        assert_eq!(stats.attempts, 10);
        client.stop().await;
    }

    #[tokio::test]
    async fn test_publish_direct_failure_invalidates_session() {
        let broker = InMemoryBroker::new();
        let client = BrokerClient::start(test_config(), broker.connector()).expect("client");
        client.setup_backfill().await.expect("setup");
        let opened = broker.connections_opened();

        broker.set_reject_publishes(true);
        let msg = OutboundMessage::persistent("search.backfill", "object", b"x".to_vec());
        assert!(client.publish_direct(&msg).await.is_err());

        broker.set_reject_publishes(false);
        client.publish_direct(&msg).await.expect("reconnects");
        assert_eq!(broker.connections_opened(), opened + 1);
        client.stop().await;
    }

    #[tokio::test]
    async fn test_no_broker_available() {
        let broker = InMemoryBroker::new();
        broker.set_refuse_connections(true);
        let config = BrokerConfig {
            hosts: vec!["10.0.0.1:5672".into(), "10.0.0.2:5672".into()],
            ..test_config()
        };
        let client = BrokerClient::start(config, broker.connector()).expect("client");
        let err = client.setup_river().await.unwrap_err();
        assert!(matches!(err, BrokerError::NoBrokerAvailable { attempted: 2 }));
        client.stop().await;
    }

    #[tokio::test]
    async fn test_publish_after_stop_is_rejected() {
        let broker = InMemoryBroker::new();
        let client = BrokerClient::start(test_config(), broker.connector()).expect("client");
        client.stop().await;
        let err = client
            .publish(OutboundMessage::persistent("x", "y", b"z".to_vec()), false)
            .await
            .unwrap_err();
        assert!(matches!(err, BrokerError::Shutdown));
    }
}
