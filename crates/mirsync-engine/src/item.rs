//! Registered sync items and their observable state

use chrono::{DateTime, Utc};
use mirsync_config::Configuration;
use mirsync_transfer::TransferBackend;
use mirsync_types::SyncStatus;
use mirsync_watch::WatchHandle;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Everything a started item owns; dropped on stop
pub(crate) struct ItemRuntime {
    pub(crate) cancel: CancellationToken,
    pub(crate) worker: JoinHandle<()>,
    pub(crate) watch: WatchHandle,
    pub(crate) backend: Arc<dyn TransferBackend>,
}

/// One configuration registered with a
/// [`SyncOrchestrator`](crate::SyncOrchestrator).
///
/// Status only changes from the orchestrator: `start` moves it to
/// [`SyncStatus::Active`], the item's worker folds backend connectivity into
/// it and marks failures, and `stop` moves it back to
/// [`SyncStatus::Inactive`].
pub struct SyncItem {
    configuration: Configuration,
    status: watch::Sender<SyncStatus>,
    last_synced: RwLock<Option<DateTime<Utc>>>,
    pub(crate) runtime: Mutex<Option<ItemRuntime>>,
}

impl std::fmt::Debug for SyncItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncItem")
            .field("id", &self.id())
            .field("name", &self.configuration.name)
            .field("status", &self.status())
            .field("last_synced", &self.last_synced())
            .finish_non_exhaustive()
    }
}

impl SyncItem {
    pub(crate) fn new(configuration: Configuration) -> Self {
        let (status, _) = watch::channel(SyncStatus::Inactive);
        Self {
            configuration,
            status,
            last_synced: RwLock::new(None),
            runtime: Mutex::new(None),
        }
    }

    /// Identifier of the underlying configuration
    pub fn id(&self) -> Uuid {
        self.configuration.id()
    }

    /// The configuration this item syncs
    pub fn configuration(&self) -> &Configuration {
        &self.configuration
    }

    /// Current status
    pub fn status(&self) -> SyncStatus {
        *self.status.borrow()
    }

    /// Observe status changes
    pub fn subscribe_status(&self) -> watch::Receiver<SyncStatus> {
        self.status.subscribe()
    }

    /// When the last event was applied successfully
    pub fn last_synced(&self) -> Option<DateTime<Utc>> {
        *self
            .last_synced
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn set_status(&self, status: SyncStatus) {
        self.status.send_replace(status);
    }

    /// Fold a backend signal; returns whether the visible status changed
    pub(crate) fn fold(&self, signal: mirsync_types::ConnectionStatus) -> bool {
        self.status.send_if_modified(|current| {
            let next = current.fold(signal);
            let changed = next != *current;
            *current = next;
            changed
        })
    }

    pub(crate) fn touch_synced(&self) {
        *self
            .last_synced
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mirsync_config::Connection;
    use mirsync_types::ConnectionStatus;

    fn item() -> SyncItem {
        SyncItem::new(Configuration::new(
            "docs",
            Connection::local("/tmp/src"),
            Connection::local("/tmp/dst"),
        ))
    }

    #[test]
    fn test_new_item_is_inactive() {
        let item = item();
        assert_eq!(item.status(), SyncStatus::Inactive);
        assert!(item.last_synced().is_none());
        assert_eq!(item.id(), item.configuration().id());
    }

    #[test]
    fn test_fold_notifies_only_on_change() {
        let item = item();
        let mut status = item.subscribe_status();
        item.set_status(SyncStatus::Active);
        status.borrow_and_update();

        assert!(item.fold(ConnectionStatus::Connected));
        assert!(status.has_changed().unwrap());
        status.borrow_and_update();

        assert!(!item.fold(ConnectionStatus::Connected));
        assert!(!status.has_changed().unwrap());

        item.set_status(SyncStatus::Failed);
        assert!(!item.fold(ConnectionStatus::Connected));
        assert_eq!(item.status(), SyncStatus::Failed);
    }

    #[test]
    fn test_touch_synced() {
        let item = item();
        let before = Utc::now();
        item.touch_synced();
        assert!(item.last_synced().unwrap() >= before);
    }
}
