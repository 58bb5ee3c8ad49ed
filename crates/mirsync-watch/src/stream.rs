//! Long-lived semantic event stream for one watched root

use crate::reconciler::{Reconciler, DEFAULT_RENAME_WINDOW};
use crate::source::NotifyTranslator;
use futures::Stream;
use mirsync_types::{Error, FileEvent, Result};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

type NotifyMessage = notify::Result<notify::Event>;

/// Tunables for a watch
#[derive(Debug, Clone, Copy)]
pub struct WatchOptions {
    /// Rename disambiguation window
    pub rename_window: Duration,
    /// Capacity of the outgoing event channel
    pub buffer: usize,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            rename_window: DEFAULT_RENAME_WINDOW,
            buffer: 1024,
        }
    }
}

/// Owns the background task of a watch.
///
/// Dropping the handle cancels the watch; [`WatchHandle::shutdown`] also waits
/// until the OS watch has been released.
#[derive(Debug)]
pub struct WatchHandle {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl WatchHandle {
    /// Stop emitting events
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Whether the watch has been cancelled
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Cancel and wait for the watch task to finish
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!("Watch task ended abnormally: {}", e);
            }
        }
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Reconciled [`FileEvent`]s for one watched root.
///
/// The stream ends after cancellation. An `Err` item means the notification
/// source failed or ended on its own; nothing follows it.
#[derive(Debug)]
pub struct FileEventStream {
    events: mpsc::Receiver<Result<FileEvent>>,
    handle: WatchHandle,
}

impl FileEventStream {
    /// Start watching `root` recursively.
    ///
    /// The watch stops when `cancel` (or the returned stream's handle) is
    /// cancelled. Fails with an initialization error if the root is not a
    /// directory or the OS watch cannot be established.
    pub fn watch(root: impl Into<PathBuf>, options: WatchOptions, cancel: CancellationToken) -> Result<Self> {
        let root = root.into();
        if !root.is_dir() {
            return Err(Error::initialization(format!(
                "watch root {} is not a directory",
                root.display()
            )));
        }

        let (raw_tx, raw_rx) = mpsc::unbounded_channel();
        let mut watcher = notify::recommended_watcher(move |message: NotifyMessage| {
            // A closed receiver means the watch is shutting down.
            let _ = raw_tx.send(message);
        })
        .map_err(|e| Error::initialization(format!("cannot create watcher: {}", e)))?;

        watcher
            .watch(&root, RecursiveMode::Recursive)
            .map_err(|e| Error::initialization(format!("cannot watch {}: {}", root.display(), e)))?;

        info!("Watching {}", root.display());
        Ok(Self::spawn(root, raw_rx, Some(watcher), options, cancel))
    }

    pub(crate) fn spawn(
        root: PathBuf,
        raw_rx: mpsc::UnboundedReceiver<NotifyMessage>,
        watcher: Option<RecommendedWatcher>,
        options: WatchOptions,
        cancel: CancellationToken,
    ) -> Self {
        let (tx, events) = mpsc::channel(options.buffer.max(1));
        let task = tokio::spawn(
            ReconcileLoop {
                root,
                raw_rx,
                state: Arc::new(Mutex::new(ReconcileState {
                    translator: NotifyTranslator::default(),
                    reconciler: Reconciler::new(options.rename_window),
                })),
                tx,
                cancel: cancel.clone(),
                _watcher: watcher,
            }
            .run(),
        );

        Self {
            events,
            handle: WatchHandle {
                cancel,
                task: Some(task),
            },
        }
    }

    /// Receive the next event
    pub async fn recv(&mut self) -> Option<Result<FileEvent>> {
        self.events.recv().await
    }

    /// Background task handle
    pub fn handle(&self) -> &WatchHandle {
        &self.handle
    }

    /// Split into the event receiver and the task handle
    pub fn into_parts(self) -> (mpsc::Receiver<Result<FileEvent>>, WatchHandle) {
        (self.events, self.handle)
    }
}

impl Stream for FileEventStream {
    type Item = Result<FileEvent>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.events.poll_recv(cx)
    }
}

/// Translation and rename state. Ingesting may crawl moved-in trees, so it
/// runs on the blocking pool.
struct ReconcileState {
    translator: NotifyTranslator,
    reconciler: Reconciler,
}

impl ReconcileState {
    fn ingest(&mut self, event: notify::Event, now: Instant) -> Vec<FileEvent> {
        let mut events = Vec::new();
        for raw in self.translator.translate(event) {
            events.extend(self.reconciler.process(raw, now));
        }
        events
    }
}

struct ReconcileLoop {
    root: PathBuf,
    raw_rx: mpsc::UnboundedReceiver<NotifyMessage>,
    state: Arc<Mutex<ReconcileState>>,
    tx: mpsc::Sender<Result<FileEvent>>,
    cancel: CancellationToken,
    // Dropped when the loop ends, which releases the OS watch.
    _watcher: Option<RecommendedWatcher>,
}

impl ReconcileLoop {
    async fn run(mut self) {
        if let Err(error) = self.seed().await {
            self.emit(Err(error)).await;
            return;
        }

        loop {
            let deadline = self.lock_state().reconciler.next_deadline();
            let events = tokio::select! {
                biased;
                () = self.cancel.cancelled() => break,
                message = self.raw_rx.recv() => match message {
                    Some(Ok(event)) if event.need_rescan() => {
                        let error = Error::watch(format!(
                            "notification queue overflowed below {}, changes were lost",
                            self.root.display()
                        ));
                        self.emit(Err(error)).await;
                        break;
                    }
                    Some(Ok(event)) => match self.ingest(event).await {
                        Ok(events) => events,
                        Err(error) => {
                            self.emit(Err(error)).await;
                            break;
                        }
                    },
                    Some(Err(e)) if matches!(e.kind, notify::ErrorKind::MaxFilesWatch) => {
                        let error = Error::watch(format!(
                            "watch limit reached below {}: {}",
                            self.root.display(),
                            e
                        ));
                        self.emit(Err(error)).await;
                        break;
                    }
                    Some(Err(e)) => {
                        warn!("Notification error below {}: {}", self.root.display(), e);
                        continue;
                    }
                    None => {
                        let error = Error::watch(format!(
                            "notification source for {} ended unexpectedly",
                            self.root.display()
                        ));
                        self.emit(Err(error)).await;
                        break;
                    }
                },
                () = wait_until(deadline) => {
                    let mut state = self.lock_state();
                    state.reconciler.expire(Instant::now())
                }
            };

            if !self.emit_all(events).await {
                break;
            }
        }
        debug!("Stopped watching {}", self.root.display());
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, ReconcileState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Learn the directories already below the root
    async fn seed(&self) -> Result<()> {
        let root = self.root.clone();
        let translator = tokio::task::spawn_blocking(move || NotifyTranslator::seeded(&root))
            .await
            .map_err(|e| Error::watch(format!("seeding {}: {}", self.root.display(), e)))?;
        self.lock_state().translator = translator;
        Ok(())
    }

    async fn ingest(&self, event: notify::Event) -> Result<Vec<FileEvent>> {
        let now = Instant::now();
        let state = Arc::clone(&self.state);
        tokio::task::spawn_blocking(move || {
            state
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .ingest(event, now)
        })
        .await
        .map_err(|e| Error::watch(format!("reconciling below {}: {}", self.root.display(), e)))
    }

    async fn emit_all(&self, events: Vec<FileEvent>) -> bool {
        for event in events {
            debug!("{}", event);
            if !self.emit(Ok(event)).await {
                return false;
            }
        }
        true
    }

    /// Deliver one item; false once cancelled or the consumer is gone
    async fn emit(&self, item: Result<FileEvent>) -> bool {
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => false,
            sent = self.tx.send(item) => sent.is_ok(),
        }
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use notify::event::{CreateKind, ModifyKind, RenameMode};
    use notify::event::Flag;
    use notify::{Event, EventKind};
    use std::path::Path;
    use tempfile::TempDir;

    struct Harness {
        raw_tx: mpsc::UnboundedSender<NotifyMessage>,
        stream: FileEventStream,
        cancel: CancellationToken,
    }

    fn harness(root: &Path) -> Harness {
        let (raw_tx, raw_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let stream = FileEventStream::spawn(
            root.to_path_buf(),
            raw_rx,
            None,
            WatchOptions {
                rename_window: Duration::from_millis(50),
                buffer: 16,
            },
            cancel.clone(),
        );
        Harness { raw_tx, stream, cancel }
    }

    fn notify_event(kind: EventKind, path: PathBuf) -> NotifyMessage {
        Ok(Event::new(kind).add_path(path))
    }

    #[tokio::test]
    async fn test_rename_pairs_inside_window() {
        let temp_dir = TempDir::new().unwrap();
        let mut h = harness(temp_dir.path());
        let old = temp_dir.path().join("a.txt");
        let new = temp_dir.path().join("b.txt");
        std::fs::write(&new, "x").unwrap();

        h.raw_tx
            .send(notify_event(EventKind::Modify(ModifyKind::Name(RenameMode::From)), old.clone()))
            .unwrap();
        h.raw_tx
            .send(notify_event(EventKind::Modify(ModifyKind::Name(RenameMode::To)), new.clone()))
            .unwrap();

        let event = h.stream.next().await.unwrap().unwrap();
        assert_eq!(event, FileEvent::renamed(old, new));
    }

    #[tokio::test(start_paused = true)]
    async fn test_move_out_expires_into_removal() {
        let temp_dir = TempDir::new().unwrap();
        let mut h = harness(temp_dir.path());
        let gone = temp_dir.path().join("gone.txt");

        h.raw_tx
            .send(notify_event(EventKind::Modify(ModifyKind::Name(RenameMode::From)), gone.clone()))
            .unwrap();

        let event = h.stream.next().await.unwrap().unwrap();
        assert_eq!(event, FileEvent::FileRemoved(gone));
    }

    #[tokio::test]
    async fn test_source_end_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let mut h = harness(temp_dir.path());
        let created = temp_dir.path().join("c.txt");
        std::fs::write(&created, "x").unwrap();

        h.raw_tx
            .send(notify_event(EventKind::Create(CreateKind::File), created.clone()))
            .unwrap();
        drop(h.raw_tx);

        assert_eq!(h.stream.next().await.unwrap().unwrap(), FileEvent::FileCreated(created));
        let error = h.stream.next().await.unwrap().unwrap_err();
        assert_eq!(error.kind(), mirsync_types::ErrorKind::Watch);
        assert!(h.stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_queue_overflow_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let mut h = harness(temp_dir.path());

        h.raw_tx
            .send(Ok(Event::new(EventKind::Other).set_flag(Flag::Rescan)))
            .unwrap();

        let error = h.stream.next().await.unwrap().unwrap_err();
        assert_eq!(error.kind(), mirsync_types::ErrorKind::Watch);
        assert!(h.stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_notify_errors() {
        let temp_dir = TempDir::new().unwrap();
        let mut h = harness(temp_dir.path());
        let created = temp_dir.path().join("c.txt");
        std::fs::write(&created, "x").unwrap();

        // transient errors are only logged
        h.raw_tx.send(Err(notify::Error::generic("spurious"))).unwrap();
        h.raw_tx
            .send(notify_event(EventKind::Create(CreateKind::File), created.clone()))
            .unwrap();
        assert_eq!(h.stream.next().await.unwrap().unwrap(), FileEvent::FileCreated(created));

        h.raw_tx
            .send(Err(notify::Error::new(notify::ErrorKind::MaxFilesWatch)))
            .unwrap();
        let error = h.stream.next().await.unwrap().unwrap_err();
        assert_eq!(error.kind(), mirsync_types::ErrorKind::Watch);
        assert!(h.stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_moved_in_tree_is_crawled() {
        let temp_dir = TempDir::new().unwrap();
        let mut h = harness(temp_dir.path());
        let moved = temp_dir.path().join("moved");
        std::fs::create_dir_all(moved.join("inner")).unwrap();
        std::fs::write(moved.join("inner/f.txt"), "x").unwrap();

        h.raw_tx
            .send(notify_event(EventKind::Modify(ModifyKind::Name(RenameMode::To)), moved.clone()))
            .unwrap();

        let mut events = Vec::new();
        for _ in 0..3 {
            events.push(h.stream.next().await.unwrap().unwrap());
        }
        assert_eq!(
            events,
            vec![
                FileEvent::DirCreated(moved.clone()),
                FileEvent::DirCreated(moved.join("inner")),
                FileEvent::FileCreated(moved.join("inner/f.txt")),
            ]
        );
    }

    #[tokio::test]
    async fn test_cancel_stops_emission() {
        let temp_dir = TempDir::new().unwrap();
        let h = harness(temp_dir.path());
        h.cancel.cancel();

        let (mut events, handle) = h.stream.into_parts();
        handle.shutdown().await;
        h.raw_tx
            .send(notify_event(EventKind::Create(CreateKind::File), temp_dir.path().join("late")))
            .unwrap_err();
        assert!(events.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_watch_rejects_missing_root() {
        let temp_dir = TempDir::new().unwrap();
        let result = FileEventStream::watch(
            temp_dir.path().join("absent"),
            WatchOptions::default(),
            CancellationToken::new(),
        );
        assert_eq!(result.unwrap_err().kind(), mirsync_types::ErrorKind::Initialization);
    }

    #[tokio::test]
    async fn test_watch_real_directory() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().canonicalize().unwrap();
        let mut stream =
            FileEventStream::watch(&root, WatchOptions::default(), CancellationToken::new()).unwrap();

        let file = root.join("hello.txt");
        std::fs::write(&file, "hello").unwrap();

        let event = tokio::time::timeout(Duration::from_secs(5), stream.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(event, FileEvent::FileCreated(file));
        stream.into_parts().1.shutdown().await;
    }
}
