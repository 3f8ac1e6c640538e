//! Redis pub/sub channel backend.
//!
//! Publishes through a [`redis::aio::ConnectionManager`] (which reconnects
//! internally) and subscribes on a dedicated pub/sub connection driven by a
//! background task. Losing the subscription is non-fatal: the task logs a
//! warning and re-subscribes with exponential backoff while the gateway
//! keeps running on process-local breaker state.

use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::Mutex;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use flexiai_core::{FlexiError, Result};

use crate::channel::{SubscribeHandler, SyncChannel};

const RECONNECT_BASE_DELAY: Duration = Duration::from_millis(500);
const RECONNECT_MAX_DELAY: Duration = Duration::from_secs(30);

pub struct RedisChannel {
    client: redis::Client,
    manager: ConnectionManager,
    tasks: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl RedisChannel {
    /// Connect to Redis at `url` (`redis://[:password@]host:port/db`).
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)
            .map_err(|e| FlexiError::Sync(format!("invalid redis url: {e}")))?;
        let manager = client
            .get_connection_manager()
            .await
            .map_err(|e| FlexiError::Sync(format!("redis connection failed: {e}")))?;
        info!(url, "connected to redis");
        Ok(Self {
            client,
            manager,
            tasks: Arc::new(Mutex::new(Vec::new())),
        })
    }
}

#[async_trait]
impl SyncChannel for RedisChannel {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<()> {
        let mut conn = self.manager.clone();
        let _: () = conn
            .publish(topic, payload)
            .await
            .map_err(|e| FlexiError::Sync(format!("redis publish failed: {e}")))?;
        Ok(())
    }

    async fn subscribe(&self, topic: &str, handler: SubscribeHandler) -> Result<()> {
        let client = self.client.clone();
        let topic = topic.to_string();

        let task = tokio::spawn(async move {
            let mut delay = RECONNECT_BASE_DELAY;
            loop {
                match client.get_async_pubsub().await {
                    Ok(mut pubsub) => {
                        if let Err(e) = pubsub.subscribe(&topic).await {
                            warn!(topic, error = %e, "redis subscribe failed");
                        } else {
                            info!(topic, "subscribed to redis channel");
                            delay = RECONNECT_BASE_DELAY;
                            let mut stream = pubsub.on_message();
                            while let Some(msg) = stream.next().await {
                                match msg.get_payload::<Vec<u8>>() {
                                    Ok(payload) => handler(payload),
                                    Err(e) => {
                                        debug!(error = %e, "dropping undecodable pubsub message")
                                    }
                                }
                            }
                            warn!(topic, "redis subscription ended, reconnecting");
                        }
                    }
                    Err(e) => {
                        warn!(topic, error = %e, "redis pubsub connection failed");
                    }
                }
                tokio::time::sleep(delay).await;
                delay = (delay * 2).min(RECONNECT_MAX_DELAY);
            }
        });
        self.tasks.lock().push(task);
        Ok(())
    }

    async fn write_snapshot(&self, key: &str, payload: Vec<u8>) -> Result<()> {
        let mut conn = self.manager.clone();
        let _: () = conn
            .set(key, payload)
            .await
            .map_err(|e| FlexiError::Sync(format!("redis set failed: {e}")))?;
        Ok(())
    }

    async fn read_snapshot(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut conn = self.manager.clone();
        let value: Option<Vec<u8>> = conn
            .get(key)
            .await
            .map_err(|e| FlexiError::Sync(format!("redis get failed: {e}")))?;
        Ok(value)
    }

    async fn close(&self) {
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
    }
}
