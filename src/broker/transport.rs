//! Transport seam between `BrokerClient` and a concrete broker
//!
//! The client only ever talks to these traits. `InMemoryBroker` implements
//! them in-process; `AmqpConnector` (feature `amqp`) speaks AMQP 0-9-1.

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;

use super::errors::BrokerError;
use crate::config::{BrokerConfig, BrokerEndpoint};

/// A message ready to be handed to the broker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub exchange: String,
    pub routing_key: String,
    pub body: Vec<u8>,
    /// Delivery mode 2
    pub persistent: bool,
    pub mandatory: bool,
}

impl OutboundMessage {
    /// A persistent, mandatory message, the only kind this crate publishes
    pub fn persistent(
        exchange: impl Into<String>,
        routing_key: impl Into<String>,
        body: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            exchange: exchange.into(),
            routing_key: routing_key.into(),
            body: body.into(),
            persistent: true,
            mandatory: true,
        }
    }
}

/// A message received from a queue, awaiting ack or nack
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub delivery_tag: u64,
    pub body: Vec<u8>,
    pub redelivered: bool,
}

/// Queue declaration parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueSpec {
    pub name: String,
    pub durable: bool,
    /// Value of the `x-ha-policy` argument, if any
    pub ha_policy: Option<String>,
}

impl QueueSpec {
    #[must_use]
    pub fn durable(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            durable: true,
            ha_policy: None,
        }
    }

    #[must_use]
    pub fn with_ha_policy(mut self, policy: impl Into<String>) -> Self {
        self.ha_policy = Some(policy.into());
        self
    }
}

/// Opens connections to one broker endpoint
#[async_trait]
pub trait BrokerConnector: Send + Sync {
    async fn connect(
        &self,
        endpoint: &BrokerEndpoint,
        config: &BrokerConfig,
    ) -> Result<Arc<dyn BrokerConnection>, BrokerError>;
}

/// An established broker connection
#[async_trait]
pub trait BrokerConnection: Send + Sync {
    fn is_open(&self) -> bool;

    /// Service heartbeats; fails if the connection has gone away
    async fn heartbeat(&self) -> Result<(), BrokerError>;

    async fn open_channel(&self) -> Result<Arc<dyn BrokerChannel>, BrokerError>;

    async fn close(&self) -> Result<(), BrokerError>;
}

/// A channel multiplexed over a connection
#[async_trait]
pub trait BrokerChannel: Send + Sync {
    fn is_open(&self) -> bool;

    /// Enable publisher confirms on this channel
    async fn confirm_select(&self) -> Result<(), BrokerError>;

    /// Publish one message
    ///
    /// Returns `false` when the broker negatively acknowledged a confirmed
    /// publish. Without confirm mode a successful write returns `true`.
    async fn publish(&self, message: &OutboundMessage) -> Result<bool, BrokerError>;

    async fn set_prefetch(&self, count: u16) -> Result<(), BrokerError>;

    /// Start consuming; the stream ends when the channel closes
    async fn consume(
        &self,
        queue: &str,
    ) -> Result<BoxStream<'static, Result<Delivery, BrokerError>>, BrokerError>;

    async fn ack(&self, delivery_tag: u64) -> Result<(), BrokerError>;

    async fn nack(&self, delivery_tag: u64, requeue: bool) -> Result<(), BrokerError>;

    /// Declare a durable direct exchange
    async fn declare_exchange(&self, name: &str) -> Result<(), BrokerError>;

    async fn declare_queue(&self, spec: &QueueSpec) -> Result<(), BrokerError>;

    async fn bind_queue(
        &self,
        queue: &str,
        exchange: &str,
        routing_key: &str,
    ) -> Result<(), BrokerError>;

    /// Passive declare; `None` when the queue does not exist
    ///
    /// A missing queue may leave the channel unusable, so callers run this
    /// on a throwaway channel.
    async fn queue_message_count(&self, name: &str) -> Result<Option<u32>, BrokerError>;

    /// Close the channel; unacknowledged deliveries return to their queues
    async fn close(&self) -> Result<(), BrokerError>;
}
