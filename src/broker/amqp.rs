//! AMQP 0-9-1 transport backed by `lapin`

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicPublishOptions, BasicQosOptions,
    ConfirmSelectOptions, ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions,
};
use lapin::protocol::{AMQPErrorKind, AMQPSoftError};
use lapin::publisher_confirm::Confirmation;
use lapin::types::{AMQPValue, FieldTable};
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind};

use super::errors::BrokerError;
use super::transport::{
    BrokerChannel, BrokerConnection, BrokerConnector, Delivery, OutboundMessage, QueueSpec,
};
use crate::config::{BrokerConfig, BrokerEndpoint};

const PERSISTENT_DELIVERY_MODE: u8 = 2;
const REPLY_SUCCESS: u16 = 200;

fn connection_error(e: lapin::Error) -> BrokerError {
    BrokerError::Connection(e.to_string())
}

fn channel_error(e: lapin::Error) -> BrokerError {
    BrokerError::Channel(e.to_string())
}

fn is_not_found(e: &lapin::Error) -> bool {
    matches!(
        e,
        lapin::Error::ProtocolError(amqp)
            if matches!(amqp.kind(), AMQPErrorKind::Soft(AMQPSoftError::NOTFOUND))
    )
}

/// AMQP URI for one endpoint
#[must_use]
pub fn amqp_uri(endpoint: &BrokerEndpoint, config: &BrokerConfig) -> String {
    format!(
        "amqp://{}:{}@{}:{}/{}?heartbeat={}",
        urlencoding::encode(&config.user),
        urlencoding::encode(&config.password),
        endpoint.host,
        endpoint.port,
        urlencoding::encode(&config.vhost),
        config.heartbeat_secs
    )
}

/// Connector opening real AMQP connections
#[derive(Debug, Clone, Copy, Default)]
pub struct AmqpConnector;

#[async_trait]
impl BrokerConnector for AmqpConnector {
    async fn connect(
        &self,
        endpoint: &BrokerEndpoint,
        config: &BrokerConfig,
    ) -> Result<Arc<dyn BrokerConnection>, BrokerError> {
        let uri = amqp_uri(endpoint, config);
        let connection = Connection::connect(&uri, ConnectionProperties::default())
            .await
            .map_err(connection_error)?;
        Ok(Arc::new(AmqpConnection { connection }))
    }
}

struct AmqpConnection {
    connection: Connection,
}

#[async_trait]
impl BrokerConnection for AmqpConnection {
    fn is_open(&self) -> bool {
        self.connection.status().connected()
    }

    // lapin services heartbeats on its own I/O loop
    async fn heartbeat(&self) -> Result<(), BrokerError> {
        if self.connection.status().connected() {
            Ok(())
        } else {
            Err(BrokerError::Connection(format!(
                "connection state {:?}",
                self.connection.status().state()
            )))
        }
    }

    async fn open_channel(&self) -> Result<Arc<dyn BrokerChannel>, BrokerError> {
        let channel = self
            .connection
            .create_channel()
            .await
            .map_err(connection_error)?;
        Ok(Arc::new(AmqpChannel { channel }))
    }

    async fn close(&self) -> Result<(), BrokerError> {
        if !self.connection.status().connected() {
            return Ok(());
        }
        self.connection
            .close(REPLY_SUCCESS, "closing")
            .await
            .map_err(connection_error)
    }
}

struct AmqpChannel {
    channel: Channel,
}

#[async_trait]
impl BrokerChannel for AmqpChannel {
    fn is_open(&self) -> bool {
        self.channel.status().connected()
    }

    async fn confirm_select(&self) -> Result<(), BrokerError> {
        self.channel
            .confirm_select(ConfirmSelectOptions::default())
            .await
            .map_err(channel_error)
    }

    async fn publish(&self, message: &OutboundMessage) -> Result<bool, BrokerError> {
        let mut properties = BasicProperties::default();
        if message.persistent {
            properties = properties.with_delivery_mode(PERSISTENT_DELIVERY_MODE);
        }
        let options = BasicPublishOptions {
            mandatory: message.mandatory,
            ..BasicPublishOptions::default()
        };

        let confirm = self
            .channel
            .basic_publish(
                &message.exchange,
                &message.routing_key,
                options,
                &message.body,
                properties,
            )
            .await
            .map_err(channel_error)?;

        match confirm.await.map_err(channel_error)? {
            Confirmation::Nack(_) => Ok(false),
            Confirmation::Ack(_) | Confirmation::NotRequested => Ok(true),
        }
    }

    async fn set_prefetch(&self, count: u16) -> Result<(), BrokerError> {
        self.channel
            .basic_qos(count, BasicQosOptions::default())
            .await
            .map_err(channel_error)
    }

    async fn consume(
        &self,
        queue: &str,
    ) -> Result<BoxStream<'static, Result<Delivery, BrokerError>>, BrokerError> {
        let consumer = self
            .channel
            .basic_consume(
                queue,
                "",
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(channel_error)?;

        Ok(consumer
            .map(|item| {
                item.map(|delivery| Delivery {
                    delivery_tag: delivery.delivery_tag,
                    body: delivery.data,
                    redelivered: delivery.redelivered,
                })
                .map_err(channel_error)
            })
            .boxed())
    }

    async fn ack(&self, delivery_tag: u64) -> Result<(), BrokerError> {
        self.channel
            .basic_ack(delivery_tag, BasicAckOptions::default())
            .await
            .map_err(channel_error)
    }

    async fn nack(&self, delivery_tag: u64, requeue: bool) -> Result<(), BrokerError> {
        let options = BasicNackOptions {
            requeue,
            ..BasicNackOptions::default()
        };
        self.channel
            .basic_nack(delivery_tag, options)
            .await
            .map_err(channel_error)
    }

    async fn declare_exchange(&self, name: &str) -> Result<(), BrokerError> {
        let options = ExchangeDeclareOptions {
            durable: true,
            ..ExchangeDeclareOptions::default()
        };
        self.channel
            .exchange_declare(name, ExchangeKind::Direct, options, FieldTable::default())
            .await
            .map_err(channel_error)
    }

    async fn declare_queue(&self, spec: &QueueSpec) -> Result<(), BrokerError> {
        let options = QueueDeclareOptions {
            durable: spec.durable,
            ..QueueDeclareOptions::default()
        };
        let mut arguments = FieldTable::default();
        if let Some(policy) = &spec.ha_policy {
            arguments.insert("x-ha-policy".into(), AMQPValue::LongString(policy.as_str().into()));
        }
        self.channel
            .queue_declare(&spec.name, options, arguments)
            .await
            .map(|_| ())
            .map_err(channel_error)
    }

    async fn bind_queue(
        &self,
        queue: &str,
        exchange: &str,
        routing_key: &str,
    ) -> Result<(), BrokerError> {
        self.channel
            .queue_bind(
                queue,
                exchange,
                routing_key,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(channel_error)
    }

    async fn queue_message_count(&self, name: &str) -> Result<Option<u32>, BrokerError> {
        let options = QueueDeclareOptions {
            passive: true,
            ..QueueDeclareOptions::default()
        };
        match self
            .channel
            .queue_declare(name, options, FieldTable::default())
            .await
        {
            Ok(queue) => Ok(Some(queue.message_count())),
            Err(e) if is_not_found(&e) => Ok(None),
            Err(e) => Err(channel_error(e)),
        }
    }

    async fn close(&self) -> Result<(), BrokerError> {
        if !self.channel.status().connected() {
            return Ok(());
        }
        self.channel
            .close(REPLY_SUCCESS, "closing")
            .await
            .map_err(channel_error)
    }
}
