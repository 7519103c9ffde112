//! In-process broker
//!
//! Keeps every topic in memory. Records published payloads and acknowledged
//! delivery ids so callers can inspect what went through it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use async_trait::async_trait;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use super::{Acknowledger, Broker, Delivery};
use crate::{Error, Result};

#[derive(Default)]
struct Topics {
    closed: bool,
    next_id: u64,
    published: HashMap<String, Vec<Vec<u8>>>,
    /// Messages published while nobody was consuming the topic
    backlog: HashMap<String, Vec<(String, Vec<u8>)>>,
    subscribers: HashMap<String, UnboundedSender<Delivery>>,
    acked: HashMap<String, Vec<String>>,
}

#[derive(Clone, Default)]
pub struct MemoryBroker {
    topics: Arc<Mutex<Topics>>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Topics> {
        self.topics.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn delivery(&self, topic: &str, id: String, body: Vec<u8>) -> Delivery {
        Delivery::new(id, topic, body, Arc::new(self.clone()))
    }

    /// Every payload ever published to `topic`, in publish order
    pub fn published(&self, topic: &str) -> Vec<Vec<u8>> {
        self.lock().published.get(topic).cloned().unwrap_or_default()
    }

    /// Delivery ids acknowledged on `topic`, in ack order
    pub fn acked(&self, topic: &str) -> Vec<String> {
        self.lock().acked.get(topic).cloned().unwrap_or_default()
    }

    /// End every consumption stream and refuse further publishes
    pub fn close(&self) {
        let mut topics = self.lock();
        topics.closed = true;
        topics.subscribers.clear();
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn publish(&self, topic: &str, body: Vec<u8>) -> Result<()> {
        let mut topics = self.lock();
        if topics.closed {
            return Err(Error::Publish(format!("broker closed, cannot publish to {}", topic)));
        }

        topics.next_id += 1;
        let id = format!("{}-0", topics.next_id);
        topics
            .published
            .entry(topic.to_string())
            .or_default()
            .push(body.clone());

        if let Some(tx) = topics.subscribers.get(topic) {
            match tx.send(self.delivery(topic, id, body)) {
                Ok(()) => return Ok(()),
                Err(mpsc::error::SendError(returned)) => {
                    topics.subscribers.remove(topic);
                    topics
                        .backlog
                        .entry(topic.to_string())
                        .or_default()
                        .push((returned.id, returned.body));
                    return Ok(());
                }
            }
        }

        topics
            .backlog
            .entry(topic.to_string())
            .or_default()
            .push((id, body));
        Ok(())
    }

    async fn consume(&self, topic: &str, _consumer: &str) -> Result<UnboundedReceiver<Delivery>> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut topics = self.lock();
        if topics.closed {
            return Ok(rx);
        }

        for (id, body) in topics.backlog.remove(topic).unwrap_or_default() {
            let _ = tx.send(self.delivery(topic, id, body));
        }
        topics.subscribers.insert(topic.to_string(), tx);
        Ok(rx)
    }
}

#[async_trait]
impl Acknowledger for MemoryBroker {
    async fn ack(&self, topic: &str, id: &str) -> Result<()> {
        self.lock()
            .acked
            .entry(topic.to_string())
            .or_default()
            .push(id.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_backlog_is_delivered_on_consume() {
        let broker = MemoryBroker::new();
        broker.publish("t", b"a".to_vec()).await.unwrap();
        broker.publish("t", b"b".to_vec()).await.unwrap();

        let mut rx = broker.consume("t", "c").await.unwrap();
        assert_eq!(rx.recv().await.unwrap().body, b"a".to_vec());
        assert_eq!(rx.recv().await.unwrap().body, b"b".to_vec());

        broker.publish("t", b"c".to_vec()).await.unwrap();
        let live = rx.recv().await.unwrap();
        assert_eq!(live.body, b"c".to_vec());

        live.ack().await.unwrap();
        assert_eq!(broker.acked("t"), vec![live.id.clone()]);
        assert_eq!(broker.published("t").len(), 3);
    }

    #[tokio::test]
    async fn test_close_ends_streams() {
        let broker = MemoryBroker::new();
        let mut rx = broker.consume("t", "c").await.unwrap();
        broker.close();

        assert!(rx.recv().await.is_none());
        assert!(broker.publish("t", vec![]).await.is_err());
    }
}
