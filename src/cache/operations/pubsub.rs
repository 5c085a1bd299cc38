use std::collections::HashMap;

use futures_util::StreamExt;
use serde::Serialize;
use serde_json::Value;
use tokio::task::JoinHandle;

use crate::cache::CacheService;
use crate::cache::models::ChannelMessage;
use crate::error::CacheResult;

impl CacheService {
    /// Publishes `message`. Strings go out as-is, anything else as JSON.
    pub async fn publish<T: Serialize + ?Sized>(&self, channel: &str, message: &T) -> CacheResult<()> {
        let payload = match serde_json::to_value(message)? {
            Value::String(text) => text,
            other => other.to_string(),
        };
        let receivers = self.store.publish(channel, &payload).await?;
        tracing::debug!("Published to {} ({} receivers)", channel, receivers);
        Ok(())
    }

    /// Relays every message on `channel` to `handler` until the channel is
    /// unsubscribed or the store closes the subscription.
    ///
    /// The subscription is live when this returns.
    pub async fn subscribe<H>(&self, channel: &str, mut handler: H) -> CacheResult<()>
    where
        H: FnMut(ChannelMessage) + Send + 'static,
    {
        let mut messages = self.store.subscribe(channel).await?;
        let channel_name = channel.to_string();
        let task = tokio::spawn(async move {
            while let Some(payload) = messages.next().await {
                handler(ChannelMessage::from_payload(payload));
            }
            tracing::warn!("Subscription to {} closed by the store", channel_name);
        });

        let mut subscriptions = self.subscriptions.lock();
        prune_finished(&mut subscriptions);
        subscriptions
            .entry(channel.to_string())
            .or_default()
            .push(task);
        Ok(())
    }

    /// Stops every handler on `channel`. Returns `false` if none was running.
    pub async fn unsubscribe(&self, channel: &str) -> bool {
        let tasks = self
            .subscriptions
            .lock()
            .remove(channel)
            .unwrap_or_default();
        let running = tasks.iter().filter(|task| !task.is_finished()).count();
        for task in tasks {
            task.abort();
        }

        if running > 0 {
            tracing::debug!("Unsubscribed {} handler(s) from {}", running, channel);
        }
        running > 0
    }
}

/// Drops relay tasks whose stream already ended, and channels left empty.
fn prune_finished(subscriptions: &mut HashMap<String, Vec<JoinHandle<()>>>) {
    subscriptions.retain(|_, tasks| {
        tasks.retain(|task| !task.is_finished());
        !tasks.is_empty()
    });
}
