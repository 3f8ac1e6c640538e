use async_trait::async_trait;
use std::sync::Arc;

use flexiai_core::Result;

/// Callback invoked with each raw message received on a subscribed topic.
/// Must not block; heavy work belongs on a task.
pub type SubscribeHandler = Arc<dyn Fn(Vec<u8>) + Send + Sync>;

/// A pub/sub transport between worker processes.
///
/// Payloads are opaque bytes; the synchronizer owns the encoding. Backends
/// with a KV surface may additionally persist the latest state-change event
/// per provider under a snapshot key so freshly started workers can
/// rehydrate; backends without one inherit the no-op defaults.
#[async_trait]
pub trait SyncChannel: Send + Sync {
    /// Broadcast `payload` to every subscriber of `topic`, including this
    /// process if it is subscribed.
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<()>;

    /// Deliver every message published on `topic` to `handler` until the
    /// channel is closed. Delivery runs on a background task owned by the
    /// channel.
    async fn subscribe(&self, topic: &str, handler: SubscribeHandler) -> Result<()>;

    /// Persist the latest state for `key`. Default: no-op.
    async fn write_snapshot(&self, _key: &str, _payload: Vec<u8>) -> Result<()> {
        Ok(())
    }

    /// Fetch the persisted state for `key`, if the backend keeps one.
    async fn read_snapshot(&self, _key: &str) -> Result<Option<Vec<u8>>> {
        Ok(None)
    }

    /// Stop delivery and release backend connections.
    async fn close(&self);
}
