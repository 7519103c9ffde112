//! Queue Bridge - publish/subscribe connector to the external classifier
//!
//! Two named topics decouple the store from the classifier: new posts go out
//! on the input topic, classification results come back on the output topic.
//! The broker behind them is pluggable through [`Broker`].

pub mod memory;
pub mod redis;

pub use memory::MemoryBroker;
pub use self::redis::RedisBroker;

use std::sync::Arc;
use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedReceiver;
use crate::config::MisinfoConfig;
use crate::post::IdentifiedPost;
use crate::{Error, Result};

/// Acknowledges one delivery back to the broker it came from
#[async_trait]
pub trait Acknowledger: Send + Sync {
    async fn ack(&self, topic: &str, id: &str) -> Result<()>;
}

/// One message received from a topic.
///
/// Acknowledgment is manual: nothing is acked unless the handler calls [`Delivery::ack`].
pub struct Delivery {
    pub id: String,
    pub topic: String,
    pub body: Vec<u8>,
    acker: Arc<dyn Acknowledger>,
}

impl Delivery {
    pub fn new(
        id: impl Into<String>,
        topic: impl Into<String>,
        body: Vec<u8>,
        acker: Arc<dyn Acknowledger>,
    ) -> Self {
        Self {
            id: id.into(),
            topic: topic.into(),
            body,
            acker,
        }
    }

    pub async fn ack(&self) -> Result<()> {
        self.acker.ack(&self.topic, &self.id).await
    }
}

impl std::fmt::Debug for Delivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Delivery")
            .field("id", &self.id)
            .field("topic", &self.topic)
            .field("body_len", &self.body.len())
            .finish()
    }
}

/// Named-topic publish/subscribe with manual acknowledgment
#[async_trait]
pub trait Broker: Send + Sync {
    async fn publish(&self, topic: &str, body: Vec<u8>) -> Result<()>;

    /// Open a consumption stream on `topic` as `consumer`.
    /// The stream ends when the broker side shuts down.
    async fn consume(&self, topic: &str, consumer: &str) -> Result<UnboundedReceiver<Delivery>>;
}

/// Invoked once per delivered message
#[async_trait]
pub trait DeliveryHandler: Send + Sync {
    async fn handle(&self, delivery: Delivery);
}

pub struct QueueBridge {
    broker: Arc<dyn Broker>,
    input_topic: String,
    output_topic: String,
    consumer_name: String,
}

impl QueueBridge {
    pub fn new(
        broker: Arc<dyn Broker>,
        input_topic: impl Into<String>,
        output_topic: impl Into<String>,
        consumer_name: impl Into<String>,
    ) -> Self {
        Self {
            broker,
            input_topic: input_topic.into(),
            output_topic: output_topic.into(),
            consumer_name: consumer_name.into(),
        }
    }

    pub fn from_config(broker: Arc<dyn Broker>, config: &MisinfoConfig) -> Self {
        Self::new(
            broker,
            &config.input_topic,
            &config.output_topic,
            &config.consumer_name,
        )
    }

    pub fn input_topic(&self) -> &str {
        &self.input_topic
    }

    pub fn output_topic(&self) -> &str {
        &self.output_topic
    }

    /// Serialize the post and publish it to the input topic.
    ///
    /// Every failure surfaces as [`Error::Publish`].
    pub async fn publish_new_post(&self, post: &IdentifiedPost) -> Result<()> {
        let body = serde_json::to_vec(post)
            .map_err(|e| Error::Publish(format!("unable to encode post {}: {}", post.id, e)))?;

        self.broker
            .publish(&self.input_topic, body)
            .await
            .map_err(|e| match e {
                Error::Publish(_) => e,
                other => Error::Publish(other.to_string()),
            })?;

        tracing::debug!("published post {} to {}", post.id, self.input_topic);
        Ok(())
    }

    /// Consume the output topic until the stream closes.
    ///
    /// Each delivery gets its own task; the loop never waits for a handler,
    /// so handlers may run concurrently and finish out of order. Acknowledging
    /// is left to the handler.
    pub async fn subscribe_to_reports(&self, handler: Arc<dyn DeliveryHandler>) -> Result<()> {
        let mut deliveries = self
            .broker
            .consume(&self.output_topic, &self.consumer_name)
            .await?;
        tracing::info!(
            "subscribed to {} as consumer {}",
            self.output_topic,
            self.consumer_name
        );

        while let Some(delivery) = deliveries.recv().await {
            let handler = Arc::clone(&handler);
            tokio::spawn(async move {
                handler.handle(delivery).await;
            });
        }

        tracing::info!("subscription to {} closed", self.output_topic);
        Ok(())
    }
}
