//! Exchange and queue layout for the river and the backfill queues

use super::errors::BrokerError;
use super::transport::{BrokerChannel, QueueSpec};
use crate::config::BrokerConfig;
use crate::document::EntityType;

/// HA policy argument attached to the river and backfill queues
pub const HA_POLICY: &str = "all";

/// Durable backfill queue for one entity type: `<backfill_queue>.<type>`
#[must_use]
pub fn backfill_queue_name(config: &BrokerConfig, entity: EntityType) -> String {
    format!("{}.{}", config.backfill_queue, entity.as_str())
}

/// Declare the river exchange, its queue and the binding between them
///
/// Idempotent; every declaration is durable.
pub async fn declare_river(
    channel: &dyn BrokerChannel,
    config: &BrokerConfig,
) -> Result<(), BrokerError> {
    channel.declare_exchange(&config.exchange).await?;
    channel
        .declare_queue(&QueueSpec::durable(&config.queue).with_ha_policy(HA_POLICY))
        .await?;
    channel
        .bind_queue(&config.queue, &config.exchange, &config.routing_key)
        .await
}

/// Declare the backfill exchange and one queue per entity type
///
/// Each queue is bound with its entity type name as routing key.
pub async fn declare_backfill(
    channel: &dyn BrokerChannel,
    config: &BrokerConfig,
) -> Result<(), BrokerError> {
    channel.declare_exchange(&config.backfill_exchange).await?;
    for entity in EntityType::ALL {
        let queue = backfill_queue_name(config, entity);
        channel
            .declare_queue(&QueueSpec::durable(&queue).with_ha_policy(HA_POLICY))
            .await?;
        channel
            .bind_queue(&queue, &config.backfill_exchange, entity.as_str())
            .await?;
    }
    Ok(())
}
