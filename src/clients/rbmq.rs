use std::future::Future;

use anyhow::{Error, Result, anyhow};
use futures_util::StreamExt;
use lapin::{
    BasicProperties, Channel as AmqpChannel, Connection, ConnectionProperties, Consumer,
    options::{
        BasicAckOptions, BasicConsumeOptions, BasicPublishOptions, BasicQosOptions,
        BasicRejectOptions, ConfirmSelectOptions, QueueDeclareOptions,
    },
    publisher_confirm::Confirmation,
    types::FieldTable,
};
use tracing::info;

use crate::{
    config::Config,
    models::{message::Channel, outcome::DeliveryOutcome},
    worker::{CompletionPublisher, InboundMessage, InboundQueue},
};

pub struct RabbitMqClient {
    connection: Connection,
    prefetch_count: u16,
}

impl RabbitMqClient {
    pub async fn connect(config: &Config) -> Result<Self, Error> {
        let connection = Connection::connect(&config.rabbitmq_url, ConnectionProperties::default())
            .await
            .map_err(|e| anyhow!("Failed to connect to RabbitMQ: {}", e))?;

        info!("RabbitMQ connection established");

        Ok(Self {
            connection,
            prefetch_count: config.prefetch_count,
        })
    }

    /// Attach a consumer to one channel's input queue. Each worker gets its
    /// own AMQP channel so acknowledgements never interleave across workers.
    pub async fn consumer_for(
        &self,
        channel: Channel,
        queue_name: &str,
    ) -> Result<RabbitMqConsumer, Error> {
        let amqp_channel = self
            .connection
            .create_channel()
            .await
            .map_err(|e| anyhow!("RabbitMQ channel creation failed: {}", e))?;

        amqp_channel
            .basic_qos(self.prefetch_count, BasicQosOptions::default())
            .await
            .map_err(|e| anyhow!("Failed to set up QoS: {}", e))?;

        amqp_channel
            .queue_declare(
                queue_name,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| anyhow!("Failed to declare queue {}: {}", queue_name, e))?;

        let consumer_tag = format!("delivery-worker-{}", channel.as_str().to_lowercase());

        let consumer = amqp_channel
            .basic_consume(
                queue_name,
                &consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| anyhow!("Failed to create consumer for {}: {}", queue_name, e))?;

        info!(channel = %channel, queue = %queue_name, "Consumer created for queue");

        Ok(RabbitMqConsumer {
            amqp_channel,
            consumer,
            queue_name: queue_name.to_string(),
        })
    }

    /// Create the shared completion-event publisher. The channel is put into
    /// confirm mode so publication only succeeds once the broker acknowledges
    /// the event.
    pub async fn completion_publisher(&self, config: &Config) -> Result<RabbitMqPublisher, Error> {
        let amqp_channel = self
            .connection
            .create_channel()
            .await
            .map_err(|e| anyhow!("RabbitMQ channel creation failed: {}", e))?;

        amqp_channel
            .confirm_select(ConfirmSelectOptions::default())
            .await
            .map_err(|e| anyhow!("Failed to enable publisher confirms: {}", e))?;

        amqp_channel
            .queue_declare(
                &config.completion_queue_name,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| anyhow!("Failed to declare completion queue: {}", e))?;

        info!(queue = %config.completion_queue_name, "Completion queue declared");

        Ok(RabbitMqPublisher {
            amqp_channel,
            queue_name: config.completion_queue_name.clone(),
        })
    }
}

/// Input stream for one channel worker. The broker's delivery tag acts as the
/// message receipt: ack commits the read position, reject-with-requeue
/// returns the message for redelivery.
pub struct RabbitMqConsumer {
    amqp_channel: AmqpChannel,
    consumer: Consumer,
    queue_name: String,
}

impl InboundQueue for RabbitMqConsumer {
    fn fetch(&mut self) -> impl Future<Output = Result<InboundMessage, Error>> + Send {
        async move {
            let delivery = self
                .consumer
                .next()
                .await
                .ok_or_else(|| anyhow!("Input stream for {} closed", self.queue_name))?
                .map_err(|e| anyhow!("Failed to fetch message: {}", e))?;

            Ok(InboundMessage {
                receipt: delivery.delivery_tag,
                payload: delivery.data,
            })
        }
    }

    fn commit(&mut self, receipt: u64) -> impl Future<Output = Result<(), Error>> + Send {
        async move {
            self.amqp_channel
                .basic_ack(receipt, BasicAckOptions::default())
                .await
                .map_err(|e| anyhow!("Failed to acknowledge message: {}", e))?;

            Ok(())
        }
    }

    fn requeue(&mut self, receipt: u64) -> impl Future<Output = Result<(), Error>> + Send {
        async move {
            self.amqp_channel
                .basic_reject(receipt, BasicRejectOptions { requeue: true })
                .await
                .map_err(|e| anyhow!("Failed to requeue message: {}", e))?;

            Ok(())
        }
    }
}

/// Shared publisher onto the completion queue. Events carry the
/// notification id as the AMQP message id so downstream consumers can key on
/// it.
pub struct RabbitMqPublisher {
    amqp_channel: AmqpChannel,
    queue_name: String,
}

impl CompletionPublisher for RabbitMqPublisher {
    fn publish(&self, outcome: &DeliveryOutcome) -> impl Future<Output = Result<(), Error>> + Send {
        async move {
            let payload = serde_json::to_vec(outcome)?;

            let confirm = self
                .amqp_channel
                .basic_publish(
                    "",
                    &self.queue_name,
                    BasicPublishOptions::default(),
                    &payload,
                    BasicProperties::default()
                        .with_delivery_mode(2)
                        .with_message_id(outcome.notification_id.clone().into()),
                )
                .await
                .map_err(|e| anyhow!("Failed to publish completion event: {}", e))?
                .await
                .map_err(|e| anyhow!("Broker did not confirm completion event: {}", e))?;

            if matches!(confirm, Confirmation::Nack(_)) {
                return Err(anyhow!("Broker rejected completion event"));
            }

            Ok(())
        }
    }
}
