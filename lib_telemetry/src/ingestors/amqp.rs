//! # AMQP Source
//!
//! lapin session bound to one durable queue. The collector consumes with
//! manual acknowledgement and a bounded prefetch; the generator publishes
//! persistent JSON messages to the same queue through the default exchange,
//! with publisher confirms enabled on the channel.

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use lapin::message::Delivery;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicPublishOptions, BasicQosOptions,
    ConfirmSelectOptions, QueueDeclareOptions,
};
use lapin::publisher_confirm::Confirmation;
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties};
use tracing::{debug, info, warn};

use crate::configs::settings::mask_credentials;
use crate::configs::AmqpSettings;
use crate::models::Reading;

use super::{IngestError, InboundMessage};

/// Persistent delivery mode.
const PERSISTENT: u8 = 2;

/// An inbound AMQP delivery.
pub struct AmqpDelivery {
    delivery: Delivery,
}

impl From<Delivery> for AmqpDelivery {
    fn from(delivery: Delivery) -> Self {
        Self { delivery }
    }
}

#[async_trait]
impl InboundMessage for AmqpDelivery {
    fn body(&self) -> &[u8] {
        &self.delivery.data
    }

    async fn ack(&self) -> Result<(), IngestError> {
        self.delivery.acker.ack(BasicAckOptions::default()).await?;
        Ok(())
    }

    async fn reject(&self, requeue: bool) -> Result<(), IngestError> {
        self.delivery
            .acker
            .nack(BasicNackOptions { multiple: false, requeue })
            .await?;
        Ok(())
    }
}

/// A connection and channel with the work queue declared.
pub struct AmqpSession {
    connection: Connection,
    channel: Channel,
    settings: AmqpSettings,
}

impl AmqpSession {
    pub async fn connect(settings: &AmqpSettings) -> Result<Self, IngestError> {
        let connection = Connection::connect(&settings.url, ConnectionProperties::default()).await?;
        let channel = connection.create_channel().await?;
        channel.confirm_select(ConfirmSelectOptions::default()).await?;
        let queue = channel
            .queue_declare(
                &settings.queue,
                QueueDeclareOptions {
                    durable: true,
                    ..QueueDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await?;
        info!(
            target: "amqp",
            "Connected to {}, queue '{}' holds {} message(s)",
            mask_credentials(&settings.url),
            settings.queue,
            queue.message_count()
        );
        Ok(Self {
            connection,
            channel,
            settings: settings.clone(),
        })
    }

    /// Starts consuming with manual acks and the configured prefetch.
    pub async fn consume(&self) -> Result<BoxStream<'static, Result<AmqpDelivery, IngestError>>, IngestError> {
        self.channel
            .basic_qos(self.settings.prefetch, BasicQosOptions::default())
            .await?;
        let consumer = self
            .channel
            .basic_consume(
                &self.settings.queue,
                &self.settings.consumer_tag,
                BasicConsumeOptions {
                    no_ack: false,
                    ..BasicConsumeOptions::default()
                },
                FieldTable::default(),
            )
            .await?;
        debug!(target: "amqp", queue = %self.settings.queue, tag = %self.settings.consumer_tag, "consumer registered");

        Ok(consumer
            .map(|item| item.map(AmqpDelivery::from).map_err(IngestError::from))
            .boxed())
    }

    /// Publishes a reading as a persistent JSON message and waits for the
    /// broker's confirmation.
    pub async fn publish(&self, reading: &Reading) -> Result<(), IngestError> {
        let body = reading.to_json()?;
        let confirmation = self
            .channel
            .basic_publish(
                "",
                &self.settings.queue,
                BasicPublishOptions::default(),
                body.as_bytes(),
                BasicProperties::default()
                    .with_content_type("application/json".into())
                    .with_delivery_mode(PERSISTENT),
            )
            .await?
            .await?;
        confirmed(confirmation)
    }

    pub async fn close(&self) {
        if let Err(e) = self.channel.close(200, "shutdown").await {
            warn!(target: "amqp", error = %e, "channel close failed");
        }
        if let Err(e) = self.connection.close(200, "shutdown").await {
            warn!(target: "amqp", error = %e, "connection close failed");
        }
    }
}

/// Only a broker ack counts as published.
fn confirmed(confirmation: Confirmation) -> Result<(), IngestError> {
    match confirmation {
        Confirmation::Ack(_) => Ok(()),
        Confirmation::Nack(_) => Err(IngestError::Broker("broker refused the message".into())),
        Confirmation::NotRequested => Err(IngestError::Broker("publisher confirms are not enabled".into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_acked_publishes_succeed() {
        assert!(confirmed(Confirmation::Ack(None)).is_ok());
        assert!(matches!(confirmed(Confirmation::Nack(None)), Err(IngestError::Broker(_))));
        assert!(matches!(confirmed(Confirmation::NotRequested), Err(IngestError::Broker(_))));
    }
}
