//! Per-item event consumer
//!
//! One worker task runs per started item. It pulls events one at a time and
//! does not pull the next until the backend call for the previous one has
//! returned, so destination writes of an item never overlap or reorder.
//!
//! Cancellation is watched during backend calls too: a call stuck on an
//! unresponsive destination is abandoned as soon as the item is stopped.

use crate::item::SyncItem;
use crate::orchestrator::ErrorHandler;
use mirsync_transfer::TransferBackend;
use mirsync_types::{ConnectionStatus, Error, FileEvent, Result, SyncStatus};
use mirsync_watch::crawl;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

pub(crate) struct Worker {
    pub(crate) item: Arc<SyncItem>,
    pub(crate) backend: Arc<dyn TransferBackend>,
    pub(crate) events: mpsc::Receiver<Result<FileEvent>>,
    pub(crate) backend_status: watch::Receiver<ConnectionStatus>,
    pub(crate) cancel: CancellationToken,
    pub(crate) on_error: ErrorHandler,
    /// Source root to mirror before live events, if any
    pub(crate) initial_upload: Option<PathBuf>,
}

enum Step {
    Continue,
    Stop,
}

impl Worker {
    pub(crate) async fn run(mut self) {
        let id = self.item.id();
        debug!("Worker for {} started", id);

        if let Some(root) = self.initial_upload.take() {
            if let Step::Stop = self.upload_tree(root).await {
                return;
            }
        }

        let mut status_open = true;
        loop {
            tokio::select! {
                biased;

                () = self.cancel.cancelled() => break,

                changed = self.backend_status.changed(), if status_open => {
                    if changed.is_err() {
                        status_open = false;
                        continue;
                    }
                    let signal = *self.backend_status.borrow_and_update();
                    if self.item.fold(signal) {
                        info!("Sync item {} is now {}", id, self.item.status());
                    }
                }

                event = self.events.recv() => {
                    let step = match event {
                        Some(Ok(event)) => self.dispatch(&event).await,
                        Some(Err(e)) => self.fail(&e),
                        None => self.fail(&Error::watch("event stream ended")),
                    };
                    if let Step::Stop = step {
                        break;
                    }
                }
            }
        }

        debug!("Worker for {} finished", id);
    }

    async fn dispatch(&self, event: &FileEvent) -> Step {
        debug!("Applying {} for {}", event, self.item.id());
        let result = tokio::select! {
            biased;
            () = self.cancel.cancelled() => {
                debug!("Abandoning {} for {}", event, self.item.id());
                return Step::Stop;
            }
            result = self.backend.apply(event) => result,
        };
        match result {
            Ok(()) => {
                self.item.touch_synced();
                Step::Continue
            }
            Err(e) => self.fail(&e),
        }
    }

    fn fail(&self, e: &Error) -> Step {
        if self.cancel.is_cancelled() {
            // Failures while stopping are not the item's fault
            return Step::Stop;
        }
        error!("Sync item {} failed: {}", self.item.id(), e);
        self.item.set_status(SyncStatus::Failed);
        (self.on_error)(&self.item, e);
        Step::Stop
    }

    async fn upload_tree(&self, root: PathBuf) -> Step {
        let crawled = tokio::select! {
            biased;
            () = self.cancel.cancelled() => return Step::Stop,
            crawled = tokio::task::spawn_blocking(move || crawl(&root)) => crawled,
        };
        let entries = match crawled {
            Ok(entries) => entries,
            Err(e) => return self.fail(&Error::execution(format!("initial crawl: {e}"))),
        };

        info!("Initial upload of {} entries for {}", entries.len(), self.item.id());
        for entry in entries {
            if self.cancel.is_cancelled() {
                return Step::Stop;
            }
            let event = FileEvent::created(entry.path, entry.is_dir);
            if let Step::Stop = self.dispatch(&event).await {
                return Step::Stop;
            }
        }
        Step::Continue
    }
}
