//! Redis Streams broker
//!
//! Topics are stream keys. Publishing is `XADD`; consuming reads through a
//! consumer group with `XREADGROUP`, and each delivery is acknowledged with
//! `XACK`. Pending entries are never claimed or redelivered.

use std::sync::Arc;
use async_trait::async_trait;
use ::redis::aio::MultiplexedConnection;
use ::redis::streams::{StreamReadOptions, StreamReadReply};
use ::redis::{AsyncCommands, Client};
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::time::{self, Duration};
use super::{Acknowledger, Broker, Delivery};
use crate::{Error, Result};

/// Field holding the message body in every stream entry
const PAYLOAD_FIELD: &str = "payload";

/// Id a new consumer group starts reading after. `0` means entries already
/// on the stream when the group is created are still delivered.
const GROUP_START_ID: &str = "0";

/// Settings for the consumer-group read loop
#[derive(Debug, Clone)]
pub struct StreamsConfig {
    /// Consumer group name
    pub group_name: String,
    /// Max entries per read
    pub batch_size: usize,
    /// How long one read blocks waiting for entries (ms)
    pub block_ms: usize,
    /// Pause after a failed read
    pub retry_pause: Duration,
}

impl Default for StreamsConfig {
    fn default() -> Self {
        Self {
            group_name: "misinfo-api".to_string(),
            batch_size: 100,
            block_ms: 5000,
            retry_pause: Duration::from_secs(1),
        }
    }
}

pub struct RedisBroker {
    client: Client,
    /// Shared by publishes and acks
    conn: MultiplexedConnection,
    config: StreamsConfig,
}

impl RedisBroker {
    pub async fn connect(url: &str, config: StreamsConfig) -> Result<Self> {
        let client = Client::open(url)?;
        let conn = client.get_multiplexed_async_connection().await?;
        tracing::info!("connected to broker at {}", url);
        Ok(Self { client, conn, config })
    }

    /// Create the consumer group (and the stream) unless it already exists
    async fn ensure_consumer_group(&self, topic: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let created: ::redis::RedisResult<()> = conn
            .xgroup_create_mkstream(topic, &self.config.group_name, GROUP_START_ID)
            .await;

        match created {
            Ok(()) => {
                tracing::info!("created consumer group {} on {}", self.config.group_name, topic);
                Ok(())
            }
            Err(e) if e.code() == Some("BUSYGROUP") => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl Broker for RedisBroker {
    async fn publish(&self, topic: &str, body: Vec<u8>) -> Result<()> {
        let mut conn = self.conn.clone();
        let _entry_id: String = conn
            .xadd(topic, "*", &[(PAYLOAD_FIELD, body.as_slice())])
            .await
            .map_err(|e| Error::Publish(format!("XADD to {} failed: {}", topic, e)))?;
        Ok(())
    }

    async fn consume(&self, topic: &str, consumer: &str) -> Result<UnboundedReceiver<Delivery>> {
        self.ensure_consumer_group(topic).await?;

        // XREADGROUP blocks its connection, so reads get one of their own
        let mut reader = self.client.get_multiplexed_async_connection().await?;
        let acker: Arc<dyn Acknowledger> = Arc::new(RedisAcker {
            conn: self.conn.clone(),
            group_name: self.config.group_name.clone(),
        });
        let options = StreamReadOptions::default()
            .group(&self.config.group_name, consumer)
            .count(self.config.batch_size)
            .block(self.config.block_ms);
        let retry_pause = self.config.retry_pause;
        let topic = topic.to_string();
        let (tx, rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            loop {
                if tx.is_closed() {
                    tracing::debug!("consumer of {} went away, stopping reads", topic);
                    return;
                }
                let read: ::redis::RedisResult<Option<StreamReadReply>> =
                    reader.xread_options(&[&topic], &[">"], &options).await;

                let reply = match read {
                    Ok(Some(reply)) => reply,
                    Ok(None) => continue,
                    Err(e) => {
                        tracing::warn!("reading {} failed: {}", topic, e);
                        time::sleep(retry_pause).await;
                        continue;
                    }
                };

                for entry in reply.keys.into_iter().flat_map(|key| key.ids) {
                    let body = match entry.get::<Vec<u8>>(PAYLOAD_FIELD) {
                        Some(body) => body,
                        None => {
                            tracing::warn!("entry {} on {} has no {} field", entry.id, topic, PAYLOAD_FIELD);
                            Vec::new()
                        }
                    };
                    let delivery = Delivery::new(entry.id, topic.as_str(), body, Arc::clone(&acker));
                    if tx.send(delivery).is_err() {
                        tracing::debug!("consumer of {} went away, stopping reads", topic);
                        return;
                    }
                }
            }
        });

        Ok(rx)
    }
}

struct RedisAcker {
    conn: MultiplexedConnection,
    group_name: String,
}

#[async_trait]
impl Acknowledger for RedisAcker {
    async fn ack(&self, topic: &str, id: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _acked: i64 = conn.xack(topic, &self.group_name, &[id]).await?;
        Ok(())
    }
}
