use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::{sync::watch, task::JoinHandle};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::feed::host::{HostNotifier, Navigator, NotificationPermission};
use crate::notification::model::{
    FeedFilter, ListQuery, NavigationTarget, Notification, NotificationError, DEFAULT_PAGE_SIZE,
};
use crate::notification::store::NotificationStore;
use crate::realtime::{RealtimeChannel, RetryPolicy, Subscription};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeedConfig {
    pub page_size: i64,
    pub retry: RetryPolicy,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RealtimeStatus {
    Disconnected,
    Connecting,
    Live,
    /// Resubscription attempts exhausted; only reloads refresh the feed
    Lost,
}

/// How an optimistic mutation settled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationOutcome {
    /// Local edit applied and the store accepted the write
    Applied,
    /// The write failed and the feed was reloaded from the store
    Reconciled,
    /// Nothing to change locally
    Skipped,
}

/// What a UI renders: the visible slice plus counters
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeedSnapshot {
    pub recipient_id: Option<Uuid>,
    pub notifications: Vec<Notification>,
    pub unread_count: i64,
    pub filter: FeedFilter,
    pub loading: bool,
    pub realtime: RealtimeStatus,
}

struct FeedState {
    recipient: Option<Uuid>,
    // Bumped on every activation/deactivation; listeners and loads from an
    // older session are ignored
    session: u64,
    // Bumped on every load so only the latest one lands
    load_seq: u64,
    notifications: Vec<Notification>,
    unread_count: i64,
    filter: FeedFilter,
    loading: bool,
    realtime: RealtimeStatus,
    subscription_id: Option<Uuid>,
    // Realtime inserts merged while a load is in flight; the load result
    // would otherwise drop them
    merged_during_load: Vec<Uuid>,
}

impl FeedState {
    fn new() -> Self {
        Self {
            recipient: None,
            session: 0,
            load_seq: 0,
            notifications: Vec::new(),
            unread_count: 0,
            filter: FeedFilter::All,
            loading: false,
            realtime: RealtimeStatus::Disconnected,
            subscription_id: None,
            merged_during_load: Vec::new(),
        }
    }

    fn reset(&mut self, recipient: Option<Uuid>) {
        self.session += 1;
        self.recipient = recipient;
        self.notifications.clear();
        self.unread_count = 0;
        self.loading = recipient.is_some();
        self.subscription_id = None;
        self.merged_during_load.clear();
        self.realtime = if recipient.is_some() {
            RealtimeStatus::Connecting
        } else {
            RealtimeStatus::Disconnected
        };
    }

    // Newest first; realtime inserts normally land at the head
    fn insert_sorted(&mut self, notification: Notification) {
        let position = self
            .notifications
            .iter()
            .position(|existing| existing.created_at <= notification.created_at)
            .unwrap_or(self.notifications.len());
        self.notifications.insert(position, notification);
    }
}

fn sort_newest_first(notifications: &mut [Notification]) {
    notifications.sort_by(|a, b| b.created_at.cmp(&a.created_at));
}

struct FeedInner {
    store: Arc<dyn NotificationStore>,
    channel: Arc<dyn RealtimeChannel>,
    host: Arc<dyn HostNotifier>,
    navigator: Arc<dyn Navigator>,
    config: FeedConfig,
    state: Mutex<FeedState>,
    changes: watch::Sender<u64>,
}

impl FeedInner {
    fn lock(&self) -> MutexGuard<'_, FeedState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify_changed(&self) {
        self.changes.send_modify(|version| *version = version.wrapping_add(1));
    }

    /// Fetches the first page and the unread count concurrently.
    ///
    /// A failed read leaves its half of the state empty/zero rather than
    /// stale. Results from a superseded load are dropped. Realtime inserts
    /// that arrived meanwhile and are missing from the page are kept and
    /// counted on top of the unread count.
    async fn load(&self, session: u64) {
        let (recipient, seq) = {
            let mut state = self.lock();
            let Some(recipient) = state.recipient else {
                return;
            };
            if state.session != session {
                return;
            }
            state.load_seq += 1;
            state.loading = true;
            (recipient, state.load_seq)
        };
        self.notify_changed();

        let query = ListQuery::page(self.config.page_size, 0);
        let (list, count) = tokio::join!(
            self.store.list(recipient, &query),
            self.store.count(recipient, Some(false))
        );

        {
            let mut state = self.lock();
            if state.session != session || state.load_seq != seq {
                debug!("Discarding stale feed load for {}", recipient);
                return;
            }

            let loaded = match list {
                Ok(mut notifications) => {
                    sort_newest_first(&mut notifications);
                    notifications
                }
                Err(e) => {
                    error!("Failed to load notifications for {}: {}", recipient, e);
                    Vec::new()
                }
            };
            let count = match count {
                Ok(count) => count.max(0),
                Err(e) => {
                    error!("Failed to load unread count for {}: {}", recipient, e);
                    0
                }
            };

            // A row present in the page was stored before the reads ran and
            // is already part of the count
            let carried: Vec<Notification> = state
                .notifications
                .iter()
                .filter(|n| {
                    state.merged_during_load.contains(&n.id)
                        && !loaded.iter().any(|l| l.id == n.id)
                })
                .cloned()
                .collect();
            let carried_unread = carried.iter().filter(|n| !n.is_read).count() as i64;

            state.notifications = loaded;
            for notification in carried {
                state.insert_sorted(notification);
            }
            state.unread_count = count + carried_unread;
            state.merged_during_load.clear();
            state.loading = false;
        }
        self.notify_changed();
    }

    async fn settle<T>(
        &self,
        session: u64,
        result: Result<T, NotificationError>,
        action: &str,
    ) -> MutationOutcome {
        match result {
            Ok(_) => MutationOutcome::Applied,
            Err(e) => {
                error!("Failed to {}: {}; reloading feed", action, e);
                self.load(session).await;
                MutationOutcome::Reconciled
            }
        }
    }

    fn set_realtime(&self, session: u64, status: RealtimeStatus) {
        {
            let mut state = self.lock();
            if state.session != session {
                return;
            }
            state.realtime = status;
        }
        self.notify_changed();
    }

    fn track_subscription(&self, session: u64, subscription_id: Uuid) -> bool {
        let mut state = self.lock();
        if state.session != session {
            return false;
        }
        state.subscription_id = Some(subscription_id);
        true
    }

    /// Merges one inbound notification; returns false if it was ignored
    fn apply_insert(&self, session: u64, notification: Notification) -> bool {
        let mut state = self.lock();
        if state.session != session || state.recipient != Some(notification.recipient_id) {
            return false;
        }
        if state.notifications.iter().any(|n| n.id == notification.id) {
            return false;
        }
        if state.loading {
            state.merged_during_load.push(notification.id);
        }
        state.insert_sorted(notification);
        // A freshly inserted row is unread by construction
        state.unread_count += 1;
        true
    }

    fn receive(&self, session: u64, notification: Notification) {
        let id = notification.id;
        let title = notification.title.clone();
        let message = notification.message.clone();

        if !self.apply_insert(session, notification) {
            debug!("Ignoring realtime notification {}", id);
            return;
        }
        self.notify_changed();

        if self.host.permission() == NotificationPermission::Granted {
            if let Err(e) = self.host.show(&title, &message) {
                warn!("Failed to show system notification {}: {}", id, e);
            }
        }
    }
}

async fn run_listener(
    inner: Arc<FeedInner>,
    session: u64,
    recipient_id: Uuid,
    initial: Option<Subscription>,
) {
    let policy = inner.config.retry;
    let mut attempt: u32 = 0;
    let mut pending = initial;

    loop {
        let resubscribed = pending.is_none();
        let mut subscription = match pending.take() {
            Some(subscription) => subscription,
            None => {
                if !policy.allows(attempt) {
                    warn!(
                        "Giving up on realtime delivery for {} after {} attempts",
                        recipient_id, attempt
                    );
                    inner.set_realtime(session, RealtimeStatus::Lost);
                    return;
                }
                tokio::time::sleep(policy.delay_for(attempt)).await;
                attempt += 1;

                match inner.channel.subscribe(recipient_id).await {
                    Ok(subscription) => {
                        info!(
                            "Resubscribed {} to realtime notifications ({})",
                            subscription.recipient_id, subscription.id
                        );
                        subscription
                    }
                    Err(e) => {
                        warn!(
                            "Resubscribe attempt {} for {} failed: {}",
                            attempt, recipient_id, e
                        );
                        continue;
                    }
                }
            }
        };

        if !inner.track_subscription(session, subscription.id) {
            inner.channel.unsubscribe(subscription.id).await;
            return;
        }
        inner.set_realtime(session, RealtimeStatus::Live);
        if resubscribed {
            // Whatever was published while disconnected never arrives
            inner.load(session).await;
        }

        while let Some(notification) = subscription.recv().await {
            attempt = 0;
            inner.receive(session, notification);
        }

        warn!("Realtime stream for {} ended", recipient_id);
        inner.channel.unsubscribe(subscription.id).await;
        inner.set_realtime(session, RealtimeStatus::Connecting);
    }
}

/// Live, filterable notification feed for one recipient at a time.
///
/// Mutations are optimistic: the local state changes first, the store write
/// follows, and a failed write triggers a full reload instead of an undo.
pub struct FeedController {
    inner: Arc<FeedInner>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl FeedController {
    pub fn new(
        store: Arc<dyn NotificationStore>,
        channel: Arc<dyn RealtimeChannel>,
        host: Arc<dyn HostNotifier>,
        navigator: Arc<dyn Navigator>,
        config: FeedConfig,
    ) -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            inner: Arc::new(FeedInner {
                store,
                channel,
                host,
                navigator,
                config,
                state: Mutex::new(FeedState::new()),
                changes,
            }),
            listener: Mutex::new(None),
        }
    }

    /// Fires whenever the visible state may have changed
    pub fn changes(&self) -> watch::Receiver<u64> {
        self.inner.changes.subscribe()
    }

    fn take_listener(&self) -> Option<JoinHandle<()>> {
        self.listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    async fn teardown(&self) {
        if let Some(listener) = self.take_listener() {
            listener.abort();
        }
        let subscription_id = self.inner.lock().subscription_id.take();
        if let Some(id) = subscription_id {
            self.inner.channel.unsubscribe(id).await;
        }
    }

    /// Loads the feed for `recipient_id` and starts realtime delivery.
    ///
    /// Any previous recipient's subscription is torn down first.
    pub async fn activate(&self, recipient_id: Uuid) {
        self.teardown().await;

        let session = {
            let mut state = self.inner.lock();
            state.reset(Some(recipient_id));
            state.session
        };
        info!("Activating notification feed for {}", recipient_id);
        self.inner.notify_changed();

        // Subscribe before reading so rows inserted during the load still arrive
        let initial = match self.inner.channel.subscribe(recipient_id).await {
            Ok(subscription) => {
                if !self.inner.track_subscription(session, subscription.id) {
                    debug!("Activation for {} superseded", recipient_id);
                    self.inner.channel.unsubscribe(subscription.id).await;
                    return;
                }
                Some(subscription)
            }
            Err(e) => {
                warn!("Realtime subscription for {} failed: {}", recipient_id, e);
                None
            }
        };

        let listener = tokio::spawn(run_listener(
            self.inner.clone(),
            session,
            recipient_id,
            initial,
        ));
        {
            let mut slot = self.listener.lock().unwrap_or_else(PoisonError::into_inner);
            if self.inner.lock().session != session {
                listener.abort();
                return;
            }
            if let Some(previous) = slot.replace(listener) {
                previous.abort();
            }
        }

        self.inner.load(session).await;
    }

    pub async fn deactivate(&self) {
        self.teardown().await;
        let recipient = {
            let mut state = self.inner.lock();
            let recipient = state.recipient;
            state.reset(None);
            recipient
        };
        if let Some(recipient) = recipient {
            info!("Deactivated notification feed for {}", recipient);
        }
        self.inner.notify_changed();
    }

    /// Re-runs the initial fetch for the active recipient
    pub async fn reload(&self) {
        let session = self.inner.lock().session;
        self.inner.load(session).await;
    }

    /// Appends the next page, skipping rows already present
    pub async fn load_more(&self) -> usize {
        let (recipient, session, offset) = {
            let state = self.inner.lock();
            let Some(recipient) = state.recipient else {
                return 0;
            };
            (recipient, state.session, state.notifications.len() as i64)
        };

        let query = ListQuery::page(self.inner.config.page_size, offset);
        let page = match self.inner.store.list(recipient, &query).await {
            Ok(page) => page,
            Err(e) => {
                warn!("Failed to load more notifications for {}: {}", recipient, e);
                return 0;
            }
        };

        let added = {
            let mut state = self.inner.lock();
            if state.session != session {
                return 0;
            }
            let mut added = 0;
            for notification in page {
                if !state.notifications.iter().any(|n| n.id == notification.id) {
                    state.notifications.push(notification);
                    added += 1;
                }
            }
            sort_newest_first(&mut state.notifications);
            added
        };
        if added > 0 {
            self.inner.notify_changed();
        }
        added
    }

    pub async fn mark_as_read(&self, id: Uuid) -> MutationOutcome {
        let (recipient, session) = {
            let mut state = self.inner.lock();
            let Some(recipient) = state.recipient else {
                return MutationOutcome::Skipped;
            };
            match state.notifications.iter_mut().find(|n| n.id == id) {
                Some(notification) if !notification.is_read => notification.is_read = true,
                _ => return MutationOutcome::Skipped,
            }
            state.unread_count = (state.unread_count - 1).max(0);
            (recipient, state.session)
        };
        self.inner.notify_changed();

        let result = self.inner.store.set_read(recipient, id).await;
        self.inner.settle(session, result, "mark notification as read").await
    }

    /// Marks every notification read; idempotent
    pub async fn mark_all_as_read(&self) -> MutationOutcome {
        let (recipient, session) = {
            let mut state = self.inner.lock();
            let Some(recipient) = state.recipient else {
                return MutationOutcome::Skipped;
            };
            for notification in state.notifications.iter_mut() {
                notification.is_read = true;
            }
            state.unread_count = 0;
            (recipient, state.session)
        };
        self.inner.notify_changed();

        let result = self.inner.store.mark_all_read(recipient).await;
        self.inner.settle(session, result, "mark all notifications as read").await
    }

    pub async fn delete(&self, id: Uuid) -> MutationOutcome {
        let (recipient, session) = {
            let mut state = self.inner.lock();
            let Some(recipient) = state.recipient else {
                return MutationOutcome::Skipped;
            };
            let Some(position) = state.notifications.iter().position(|n| n.id == id) else {
                return MutationOutcome::Skipped;
            };
            let removed = state.notifications.remove(position);
            if !removed.is_read {
                state.unread_count = (state.unread_count - 1).max(0);
            }
            (recipient, state.session)
        };
        self.inner.notify_changed();

        let result = self.inner.store.delete(recipient, id).await;
        self.inner.settle(session, result, "delete notification").await
    }

    /// Marks the notification read if needed, then dispatches navigation.
    ///
    /// Returns the dispatched target. A missing data field or a failed
    /// dispatch yields `None` but keeps the read.
    pub async fn open(&self, id: Uuid) -> Option<NavigationTarget> {
        let notification = self
            .inner
            .lock()
            .notifications
            .iter()
            .find(|n| n.id == id)
            .cloned()?;

        if !notification.is_read {
            self.mark_as_read(id).await;
        }

        let Some(target) = notification.navigation_target() else {
            warn!(
                "Notification {} of type {} has no navigation data",
                id, notification.notification_type
            );
            return None;
        };

        match self.inner.navigator.navigate(&target) {
            Ok(()) => Some(target),
            Err(e) => {
                warn!("Navigation to {} failed: {}", target.path(), e);
                None
            }
        }
    }

    pub fn set_filter(&self, filter: FeedFilter) {
        self.inner.lock().filter = filter;
        self.inner.notify_changed();
    }

    pub fn filter(&self) -> FeedFilter {
        self.inner.lock().filter
    }

    /// Notifications passing the active filter, newest first
    pub fn visible(&self) -> Vec<Notification> {
        let state = self.inner.lock();
        state
            .notifications
            .iter()
            .filter(|n| state.filter.accepts(n))
            .cloned()
            .collect()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.inner.lock().notifications.clone()
    }

    pub fn unread_count(&self) -> i64 {
        self.inner.lock().unread_count
    }

    pub fn recipient(&self) -> Option<Uuid> {
        self.inner.lock().recipient
    }

    pub fn realtime_status(&self) -> RealtimeStatus {
        self.inner.lock().realtime
    }

    pub fn subscription_id(&self) -> Option<Uuid> {
        self.inner.lock().subscription_id
    }

    pub fn snapshot(&self) -> FeedSnapshot {
        let state = self.inner.lock();
        FeedSnapshot {
            recipient_id: state.recipient,
            notifications: state
                .notifications
                .iter()
                .filter(|n| state.filter.accepts(n))
                .cloned()
                .collect(),
            unread_count: state.unread_count,
            filter: state.filter,
            loading: state.loading,
            realtime: state.realtime,
        }
    }
}

impl Drop for FeedController {
    fn drop(&mut self) {
        // The subscription ends with the listener; the transport notices the
        // dropped receiver and cleans up its own task
        if let Some(listener) = self.take_listener() {
            listener.abort();
        }
    }
}
