//! In-process channel backend.
//!
//! A [`MemoryHub`] plays the role of the broker; every [`MemoryChannel`]
//! cloned from it sees every publish, which lets a test host several
//! "workers" inside one process and exercise the synchronization protocol
//! without Redis.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use flexiai_core::Result;

use crate::channel::{SubscribeHandler, SyncChannel};

/// Shared fanout point standing in for an external broker.
#[derive(Clone)]
pub struct MemoryHub {
    sender: broadcast::Sender<(String, Vec<u8>)>,
    snapshots: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl MemoryHub {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(1024);
        Self {
            sender,
            snapshots: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// A channel attached to this hub; one per simulated worker.
    pub fn channel(&self) -> MemoryChannel {
        MemoryChannel {
            hub: self.clone(),
            tasks: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl Default for MemoryHub {
    fn default() -> Self {
        Self::new()
    }
}

pub struct MemoryChannel {
    hub: MemoryHub,
    tasks: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

#[async_trait]
impl SyncChannel for MemoryChannel {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<()> {
        // No subscribers is fine; the hub drops the message.
        let _ = self.hub.sender.send((topic.to_string(), payload));
        Ok(())
    }

    async fn subscribe(&self, topic: &str, handler: SubscribeHandler) -> Result<()> {
        let mut rx = self.hub.sender.subscribe();
        let topic = topic.to_string();
        let task = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok((t, payload)) if t == topic => handler(payload),
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        self.tasks.lock().push(task);
        Ok(())
    }

    async fn write_snapshot(&self, key: &str, payload: Vec<u8>) -> Result<()> {
        self.hub.snapshots.lock().insert(key.to_string(), payload);
        Ok(())
    }

    async fn read_snapshot(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.hub.snapshots.lock().get(key).cloned())
    }

    async fn close(&self) {
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn publish_reaches_every_channel_on_the_hub() {
        let hub = MemoryHub::new();
        let a = hub.channel();
        let b = hub.channel();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let tx = Arc::new(tx);
        let tx2 = Arc::clone(&tx);
        b.subscribe("topic", Arc::new(move |p| {
            let _ = tx2.send(p);
        }))
        .await
        .unwrap();

        a.publish("topic", b"hello".to_vec()).await.unwrap();
        let got = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(got, b"hello");
    }

    #[tokio::test]
    async fn other_topics_are_filtered() {
        let hub = MemoryHub::new();
        let a = hub.channel();
        let b = hub.channel();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let tx = Arc::new(tx);
        let tx2 = Arc::clone(&tx);
        b.subscribe("wanted", Arc::new(move |p| {
            let _ = tx2.send(p);
        }))
        .await
        .unwrap();

        a.publish("other", b"noise".to_vec()).await.unwrap();
        a.publish("wanted", b"signal".to_vec()).await.unwrap();
        let got = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(got, b"signal");
    }

    #[tokio::test]
    async fn snapshots_round_trip() {
        let hub = MemoryHub::new();
        let ch = hub.channel();
        ch.write_snapshot("k", b"v".to_vec()).await.unwrap();
        assert_eq!(ch.read_snapshot("k").await.unwrap(), Some(b"v".to_vec()));
        assert_eq!(ch.read_snapshot("missing").await.unwrap(), None);
    }
}
