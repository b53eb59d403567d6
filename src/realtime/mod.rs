//! Push delivery of freshly inserted notifications.
//!
//! Transports implement [`RealtimeChannel`]; subscribers receive a
//! [`Subscription`] that yields every notification published for one
//! recipient until it is unsubscribed or the transport drops.

pub mod broadcast;
pub mod redis;

use async_trait::async_trait;
use rand::Rng;
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;

#[cfg(test)]
use mockall::automock;

use crate::notification::model::Notification;

pub use self::broadcast::BroadcastChannel;
pub use self::redis::RedisChannel;

/// Buffer between a transport task and its subscriber
pub const SUBSCRIPTION_BUFFER: usize = 100;

#[derive(Debug, thiserror::Error)]
pub enum RealtimeError {
    #[error("Redis error: {0}")]
    RedisError(#[from] ::redis::RedisError),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

/// A live feed of notifications for one recipient
#[derive(Debug)]
pub struct Subscription {
    pub id: Uuid,
    pub recipient_id: Uuid,
    receiver: mpsc::Receiver<Notification>,
}

impl Subscription {
    pub fn new(recipient_id: Uuid, receiver: mpsc::Receiver<Notification>) -> Self {
        Self {
            id: Uuid::new_v4(),
            recipient_id,
            receiver,
        }
    }

    /// Next delivered notification, `None` once the transport is gone
    pub async fn recv(&mut self) -> Option<Notification> {
        self.receiver.recv().await
    }
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait RealtimeChannel: Send + Sync {
    async fn subscribe(&self, recipient_id: Uuid) -> Result<Subscription, RealtimeError>;

    /// Stops delivery for a subscription; unknown ids are ignored
    async fn unsubscribe(&self, subscription_id: Uuid);

    async fn publish(&self, notification: &Notification) -> Result<(), RealtimeError>;
}

pub fn channel_name(recipient_id: &Uuid) -> String {
    format!("notifications:user:{}", recipient_id)
}

/// Bounded exponential backoff used when a subscription drops
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            max_attempts: 5,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (0-based), with up to 25% jitter
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.min(16));
        let delay = self.base_delay.saturating_mul(factor).min(self.max_delay);
        let jitter_ms = (delay.as_millis() / 4) as u64;
        if jitter_ms == 0 {
            return delay;
        }
        let jitter = rand::rng().random_range(0..=jitter_ms);
        delay.saturating_sub(Duration::from_millis(jitter))
    }

    pub fn allows(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}
