//! Convenience process-wide client for the ergonomics layer.
//!
//! Hosts that want explicit ownership should construct [`FlexiAI`] directly;
//! this module exists for call sites that mirror the one-client-per-process
//! deployment style. Lifecycle: [`init`] once at startup, [`get`] anywhere,
//! [`shutdown`] before exit.

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::sync::Arc;

use flexiai_config::FlexiConfig;
use flexiai_core::{FlexiError, Result};

use crate::client::FlexiAI;

static GLOBAL: Lazy<RwLock<Option<Arc<FlexiAI>>>> = Lazy::new(|| RwLock::new(None));

/// Initialize the global client, replacing any previous one.
pub async fn init(config: FlexiConfig) -> Result<Arc<FlexiAI>> {
    let client = Arc::new(FlexiAI::new(config).await?);
    let previous = GLOBAL.write().replace(Arc::clone(&client));
    if let Some(previous) = previous {
        previous.shutdown().await;
    }
    Ok(client)
}

/// The global client, if [`init`] has run.
pub fn get() -> Result<Arc<FlexiAI>> {
    GLOBAL.read().clone().ok_or_else(|| {
        FlexiError::Configuration("global client not initialized; call global::init first".into())
    })
}

/// Tear down the global client.
pub async fn shutdown() {
    let client = GLOBAL.write().take();
    if let Some(client) = client {
        client.shutdown().await;
    }
}
