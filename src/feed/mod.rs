//! Per-session notification feed.

pub mod controller;
pub mod host;

pub use controller::{FeedConfig, FeedController, FeedSnapshot, MutationOutcome, RealtimeStatus};
pub use host::{HostError, HostNotifier, Navigator, NotificationPermission};
