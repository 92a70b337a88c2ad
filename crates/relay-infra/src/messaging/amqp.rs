//! AMQP consumer for indexer events
//!
//! Binds a durable queue to the indexer's fanout exchange and hands every
//! message body to a [`MessageHandler`]. Messages are acknowledged only
//! after the handler returns.

use crate::Result;
use futures::StreamExt;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicQosOptions, ExchangeDeclareOptions,
    QueueBindOptions, QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{Channel, Connection, ConnectionProperties, Consumer, ExchangeKind};
use relay_core::{AmqpConfig, MessageHandler};
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const CONSUMER_TAG: &str = "safe-events-relay";

/// Queue consumer bound to the events exchange
pub struct QueueConsumer {
    connection: Connection,
    channel: Channel,
    consumer: Consumer,
    config: AmqpConfig,
}

impl QueueConsumer {
    /// Connect, declare the topology and start consuming
    pub async fn connect(config: &AmqpConfig) -> Result<Self> {
        info!(
            exchange = %config.exchange,
            queue = %config.queue,
            prefetch = config.prefetch,
            "Connecting to message broker"
        );

        let connection = Connection::connect(&config.url, ConnectionProperties::default())
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to connect to message broker");
                e
            })?;
        let channel = connection.create_channel().await?;

        channel
            .exchange_declare(
                &config.exchange,
                ExchangeKind::Fanout,
                ExchangeDeclareOptions {
                    durable: true,
                    ..ExchangeDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await?;

        channel
            .queue_declare(
                &config.queue,
                QueueDeclareOptions {
                    durable: true,
                    ..QueueDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await?;

        channel
            .queue_bind(
                &config.queue,
                &config.exchange,
                "",
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await?;

        channel
            .basic_qos(config.prefetch, BasicQosOptions::default())
            .await?;

        let consumer = channel
            .basic_consume(
                &config.queue,
                CONSUMER_TAG,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await?;

        info!(queue = %config.queue, "Consuming events");

        Ok(Self {
            connection,
            channel,
            consumer,
            config: config.clone(),
        })
    }

    pub fn config(&self) -> &AmqpConfig {
        &self.config
    }

    /// Process deliveries until `cancel` fires or the broker ends the stream.
    ///
    /// Each delivery is handled on its own task; the broker's prefetch
    /// bounds how many run at once. In-flight deliveries are finished and
    /// acknowledged before the channel and connection are closed.
    pub async fn run(
        mut self,
        handler: Arc<dyn MessageHandler>,
        cancel: CancellationToken,
    ) -> Result<()> {
        let mut in_flight = JoinSet::new();
        let mut failure = None;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Queue consumer shutdown requested");
                    break;
                }
                Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                    if let Err(e) = joined {
                        error!(error = %e, "Event handler task failed");
                    }
                }
                next = self.consumer.next() => match next {
                    Some(Ok(delivery)) => {
                        let handler = handler.clone();
                        in_flight.spawn(async move {
                            handler.handle(&delivery.data).await;
                            if let Err(e) = delivery.ack(BasicAckOptions::default()).await {
                                error!(
                                    delivery_tag = delivery.delivery_tag,
                                    error = %e,
                                    "Failed to acknowledge message"
                                );
                            }
                        });
                    }
                    Some(Err(e)) => {
                        error!(error = %e, "Queue consumer failed");
                        failure = Some(e);
                        break;
                    }
                    None => {
                        warn!("Queue consumer stream ended");
                        break;
                    }
                }
            }
        }

        debug!(pending = in_flight.len(), "Waiting for in-flight events");
        while let Some(joined) = in_flight.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Event handler task failed");
            }
        }

        self.close().await;

        match failure {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    async fn close(&self) {
        if let Err(e) = self.channel.close(200, "shutdown").await {
            warn!(error = %e, "Failed to close channel");
        }
        if let Err(e) = self.connection.close(200, "shutdown").await {
            warn!(error = %e, "Failed to close connection");
        }
        info!("Queue consumer stopped");
    }
}
