use async_trait::async_trait;
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
};
use tokio::{
    sync::{broadcast, mpsc},
    task::JoinHandle,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{RealtimeChannel, RealtimeError, Subscription, SUBSCRIPTION_BUFFER};
use crate::notification::model::Notification;

const BROADCAST_CAPACITY: usize = 1024;

type TaskStore = Arc<Mutex<HashMap<Uuid, JoinHandle<()>>>>;

/// In-process fan-out, used when no Redis URL is configured
#[derive(Debug, Clone)]
pub struct BroadcastChannel {
    sender: broadcast::Sender<Notification>,
    tasks: TaskStore,
}

impl Default for BroadcastChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl BroadcastChannel {
    pub fn new() -> Self {
        Self::with_capacity(BROADCAST_CAPACITY)
    }

    /// `capacity` bounds how far a subscriber may fall behind before its
    /// stream is closed
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            tasks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Number of live subscriptions
    pub fn subscription_count(&self) -> usize {
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|task| !task.is_finished())
            .count()
    }
}

#[async_trait]
impl RealtimeChannel for BroadcastChannel {
    async fn subscribe(&self, recipient_id: Uuid) -> Result<Subscription, RealtimeError> {
        // Subscribe before spawning so nothing published after this call is missed
        let mut rx = self.sender.subscribe();
        let (tx, receiver) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let subscription = Subscription::new(recipient_id, receiver);

        let task = tokio::spawn(async move {
            loop {
                let received = tokio::select! {
                    _ = tx.closed() => break,
                    received = rx.recv() => received,
                };
                match received {
                    Ok(notification) if notification.recipient_id == recipient_id => {
                        if tx.send(notification).await.is_err() {
                            break;
                        }
                    }
                    Ok(_) => continue,
                    // Ending the stream makes the owner resubscribe and reload
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(
                            "Subscriber for {} lagged, {} notifications dropped; closing stream",
                            recipient_id, skipped
                        );
                        break;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        {
            let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
            // Subscribers that went away without unsubscribing
            tasks.retain(|_, task| !task.is_finished());
            tasks.insert(subscription.id, task);
        }
        info!("Subscribed {} to in-process notifications", recipient_id);

        Ok(subscription)
    }

    async fn unsubscribe(&self, subscription_id: Uuid) {
        let task = self
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&subscription_id);

        if let Some(task) = task {
            task.abort();
            debug!("Removed subscription {}", subscription_id);
        }
    }

    async fn publish(&self, notification: &Notification) -> Result<(), RealtimeError> {
        match self.sender.send(notification.clone()) {
            Ok(receivers) => debug!(
                "Published notification {} to {} receivers",
                notification.id, receivers
            ),
            // Nobody listening is not a failure
            Err(_) => debug!(
                "No subscribers for notification {}",
                notification.id
            ),
        }
        Ok(())
    }
}
