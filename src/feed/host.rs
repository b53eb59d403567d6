use serde::{Deserialize, Serialize};

use crate::notification::model::NavigationTarget;

/// Host-level permission to show system notifications
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationPermission {
    Granted,
    Denied,
    #[default]
    Default,
}

#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error("Host is gone")]
    Disconnected,

    #[error("Host rejected the request: {0}")]
    Rejected(String),
}

/// System-level popups. Best effort: failures never affect the feed.
pub trait HostNotifier: Send + Sync {
    fn permission(&self) -> NotificationPermission;

    fn show(&self, title: &str, message: &str) -> Result<(), HostError>;
}

pub trait Navigator: Send + Sync {
    fn navigate(&self, target: &NavigationTarget) -> Result<(), HostError>;
}
