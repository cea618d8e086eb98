//! Message broker client
//!
//! Connection management with endpoint failover, buffered publishing with
//! bounded retries, flow-controlled consumption, topology setup and queue
//! introspection. All broker I/O goes through the `transport` traits.

pub mod client;
pub mod connection;
pub mod errors;
pub mod keepalive;
pub mod memory;
pub mod publisher;
pub mod stats;
pub mod topology;
pub mod transport;

#[cfg(feature = "amqp")]
pub mod amqp;

pub use client::{BrokerClient, ConsumeSummary};
pub use connection::{ConnectionManager, HeartbeatStatus, Session};
pub use errors::BrokerError;
pub use memory::InMemoryBroker;
pub use publisher::{DeliveryOutcome, Publisher, deliver_with_retry};
pub use stats::{PublishStats, PublishStatsSnapshot};
pub use topology::{HA_POLICY, backfill_queue_name};
pub use transport::{
    BrokerChannel, BrokerConnection, BrokerConnector, Delivery, OutboundMessage, QueueSpec,
};

#[cfg(feature = "amqp")]
pub use amqp::AmqpConnector;
