use async_trait::async_trait;
use futures::StreamExt;
use redis::{AsyncCommands, Client};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
};
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::{channel_name, RealtimeChannel, RealtimeError, Subscription, SUBSCRIPTION_BUFFER};
use crate::notification::model::Notification;

/// Type alias for the per-subscription forwarding tasks
type TaskStore = Arc<Mutex<HashMap<Uuid, JoinHandle<()>>>>;

/// Redis pub/sub transport, one channel per recipient
#[derive(Debug, Clone)]
pub struct RedisChannel {
    client: Client,
    tasks: TaskStore,
}

impl RedisChannel {
    pub fn new(client: Client) -> Self {
        // Connection validation happens on first use
        Self {
            client,
            tasks: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

#[async_trait]
impl RealtimeChannel for RedisChannel {
    async fn subscribe(&self, recipient_id: Uuid) -> Result<Subscription, RealtimeError> {
        let channel = channel_name(&recipient_id);
        info!("Subscribing to Redis channel: {}", channel);

        let mut pubsub = self.client.get_async_pubsub().await.map_err(|e| {
            error!("Failed to get Redis PubSub connection: {}", e);
            RealtimeError::RedisError(e)
        })?;
        pubsub.subscribe(&channel).await.map_err(|e| {
            error!("Failed to subscribe to Redis channel {}: {}", channel, e);
            RealtimeError::RedisError(e)
        })?;

        let (tx, receiver) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let subscription = Subscription::new(recipient_id, receiver);

        let task = tokio::spawn(async move {
            let mut messages = pubsub.into_on_message();

            loop {
                let msg = tokio::select! {
                    _ = tx.closed() => {
                        debug!("Subscriber for {} went away", channel);
                        break;
                    }
                    msg = messages.next() => msg,
                };
                let Some(msg) = msg else {
                    break;
                };

                let payload: String = match msg.get_payload() {
                    Ok(payload) => payload,
                    Err(e) => {
                        error!("Failed to get message payload: {}", e);
                        continue;
                    }
                };

                let notification: Notification = match serde_json::from_str(&payload) {
                    Ok(notification) => notification,
                    Err(e) => {
                        warn!("Dropping malformed notification on {}: {}", channel, e);
                        continue;
                    }
                };

                if tx.send(notification).await.is_err() {
                    debug!("Subscriber for {} went away", channel);
                    break;
                }
            }

            info!("Redis stream for {} ended", channel);
        });

        {
            let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
            // Subscribers that went away without unsubscribing
            tasks.retain(|_, task| !task.is_finished());
            tasks.insert(subscription.id, task);
        }

        Ok(subscription)
    }

    async fn unsubscribe(&self, subscription_id: Uuid) {
        let task = self
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&subscription_id);

        if let Some(task) = task {
            // Dropping the PubSub connection inside the task unsubscribes it
            task.abort();
            debug!("Aborted Redis subscription {}", subscription_id);
        }
    }

    async fn publish(&self, notification: &Notification) -> Result<(), RealtimeError> {
        let json = serde_json::to_string(notification)?;
        let channel = channel_name(&notification.recipient_id);

        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let receivers: i64 = conn.publish(&channel, json).await?;

        debug!(
            "Published notification {} on {} to {} receivers",
            notification.id, channel, receivers
        );
        Ok(())
    }
}
