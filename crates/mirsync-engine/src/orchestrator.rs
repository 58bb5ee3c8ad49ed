//! Registry of sync items and their start/stop lifecycle

use crate::item::{ItemRuntime, SyncItem};
use crate::worker::Worker;
use futures::future::join_all;
use mirsync_config::{Configuration, Connection, EngineSettings};
use mirsync_transfer::{source_root, BackendFactory, BackendOptions, DefaultBackendFactory};
use mirsync_types::{Error, Result, SyncStatus};
use mirsync_watch::{FileEventStream, WatchOptions, DEFAULT_RENAME_WINDOW};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Called from an item's worker when applying an event fails
pub type ErrorHandler = Arc<dyn Fn(&SyncItem, &Error) + Send + Sync>;

/// Tunables applied to every item the orchestrator starts
#[derive(Debug, Clone, Copy)]
pub struct OrchestratorOptions {
    /// Rename disambiguation window of each watch
    pub rename_window: Duration,
    /// Idle time before a remote session is closed
    pub idle_timeout: Duration,
    /// Mirror the whole source tree when an item starts
    pub initial_upload: bool,
    /// Capacity of each item's event channel
    pub event_buffer: usize,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            rename_window: DEFAULT_RENAME_WINDOW,
            idle_timeout: BackendOptions::default().idle_timeout,
            initial_upload: false,
            event_buffer: 1024,
        }
    }
}

impl From<&EngineSettings> for OrchestratorOptions {
    fn from(settings: &EngineSettings) -> Self {
        Self {
            rename_window: settings.rename_window(),
            idle_timeout: settings.idle_timeout(),
            initial_upload: settings.initial_upload,
            event_buffer: settings.event_buffer,
        }
    }
}

/// Binds watched sources to transfer backends, one [`SyncItem`] per
/// configuration.
///
/// Items are independent: each started item has its own watch, backend and
/// worker task, and a failure in one never reaches another.
///
/// Dropping the orchestrator cancels every started item without waiting;
/// [`SyncOrchestrator::shutdown`] is the graceful path.
pub struct SyncOrchestrator {
    items: RwLock<HashMap<Uuid, Arc<SyncItem>>>,
    factory: Arc<dyn BackendFactory>,
    options: OrchestratorOptions,
}

impl std::fmt::Debug for SyncOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncOrchestrator")
            .field("items", &self.items().len())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Default for SyncOrchestrator {
    fn default() -> Self {
        Self::new(OrchestratorOptions::default())
    }
}

impl SyncOrchestrator {
    /// Orchestrator building local and SFTP backends
    pub fn new(options: OrchestratorOptions) -> Self {
        Self::with_factory(Arc::new(DefaultBackendFactory), options)
    }

    /// Orchestrator using a custom backend factory
    pub fn with_factory(factory: Arc<dyn BackendFactory>, options: OrchestratorOptions) -> Self {
        Self {
            items: RwLock::new(HashMap::new()),
            factory,
            options,
        }
    }

    /// Register and start every configuration.
    ///
    /// An item that cannot start is reported to `on_error` and left
    /// inactive; the others still start. A configuration that cannot be
    /// registered, such as a repeated id, stops everything started so far and
    /// fails the whole call.
    pub async fn with_configurations(
        configurations: impl IntoIterator<Item = Configuration>,
        options: OrchestratorOptions,
        on_error: ErrorHandler,
    ) -> Result<Self> {
        let orchestrator = Self::new(options);
        for configuration in configurations {
            let item = match orchestrator.register(configuration) {
                Ok(item) => item,
                Err(e) => {
                    orchestrator.shutdown().await;
                    return Err(e);
                }
            };
            if let Err(e) = orchestrator.start(&item, Arc::clone(&on_error)).await {
                warn!("Sync item {} did not start: {}", item.id(), e);
                on_error(&item, &e);
            }
        }
        Ok(orchestrator)
    }

    /// Options applied to started items
    pub fn options(&self) -> &OrchestratorOptions {
        &self.options
    }

    /// All registered items
    pub fn items(&self) -> Vec<Arc<SyncItem>> {
        self.items
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    /// Item registered under `id`
    pub fn item(&self, id: Uuid) -> Option<Arc<SyncItem>> {
        self.items
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
    }

    /// Register a configuration; fails if its id is already registered
    pub fn register(&self, configuration: Configuration) -> Result<Arc<SyncItem>> {
        let id = configuration.id();
        let mut items = self.items.write().unwrap_or_else(PoisonError::into_inner);
        if items.contains_key(&id) {
            return Err(Error::Duplicate { id: id.to_string() });
        }

        let item = Arc::new(SyncItem::new(configuration));
        items.insert(id, Arc::clone(&item));
        debug!("Registered sync item {}", id);
        Ok(item)
    }

    /// Stop the item for `id` if it is running, then forget it
    pub async fn unregister(&self, id: Uuid) -> Result<()> {
        let item = self.item(id).ok_or_else(|| Error::NotFound { id: id.to_string() })?;
        self.stop(&item).await;
        self.items
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
        debug!("Unregistered sync item {}", id);
        Ok(())
    }

    /// Start syncing an item.
    ///
    /// Builds the item's backend and watch, then spawns its worker. The item
    /// is `Active` when this returns; the destination is only contacted once
    /// the first event arrives. Fails with an initialization error when the
    /// item is already started, the source root cannot be watched, or the
    /// destination cannot be served.
    pub async fn start(&self, item: &Arc<SyncItem>, on_error: ErrorHandler) -> Result<()> {
        let mut runtime = item.runtime.lock().await;
        if runtime.is_some() {
            return Err(Error::initialization(format!(
                "sync item {} is already started",
                item.id()
            )));
        }

        let root = source_root(item.configuration())?;
        let root = tokio::fs::canonicalize(&root).await.map_err(|e| {
            Error::initialization(format!("cannot resolve source {}: {}", root.display(), e))
        })?;

        // Watch and backend must agree on the root spelling
        let mut resolved = item.configuration().clone();
        resolved.source = Connection::local(&root);
        let backend = self.factory.create(
            &resolved,
            &BackendOptions {
                idle_timeout: self.options.idle_timeout,
            },
        )?;

        let cancel = CancellationToken::new();
        let stream = FileEventStream::watch(
            &root,
            WatchOptions {
                rename_window: self.options.rename_window,
                buffer: self.options.event_buffer,
            },
            cancel.child_token(),
        )?;
        let (events, watch) = stream.into_parts();

        item.set_status(SyncStatus::Active);
        let worker = tokio::spawn(
            Worker {
                item: Arc::clone(item),
                backend: Arc::clone(&backend),
                events,
                backend_status: backend.subscribe_status(),
                cancel: cancel.clone(),
                on_error,
                initial_upload: self.options.initial_upload.then_some(root),
            }
            .run(),
        );

        *runtime = Some(ItemRuntime {
            cancel,
            worker,
            watch,
            backend,
        });
        info!("Started sync item {} ({})", item.id(), item.configuration().name);
        Ok(())
    }

    /// Stop an item: no event reaches its backend once this returns, the OS
    /// watch is released and the status is `Inactive`. Stopping an item that
    /// is not running only resets its status.
    pub async fn stop(&self, item: &SyncItem) {
        let mut runtime = item.runtime.lock().await;
        if let Some(ItemRuntime {
            cancel,
            worker,
            watch,
            backend,
        }) = runtime.take()
        {
            cancel.cancel();
            if let Err(e) = worker.await {
                warn!("Worker of sync item {} ended abnormally: {}", item.id(), e);
            }
            watch.shutdown().await;
            backend.terminate().await;
            info!("Stopped sync item {}", item.id());
        }
        item.set_status(SyncStatus::Inactive);
    }

    /// Stop the item registered under `id`
    pub async fn stop_by_id(&self, id: Uuid) -> Result<()> {
        let item = self.item(id).ok_or_else(|| Error::NotFound { id: id.to_string() })?;
        self.stop(&item).await;
        Ok(())
    }

    /// Stop every item, all at once
    pub async fn shutdown(&self) {
        let items = self.items();
        join_all(items.iter().map(|item| self.stop(item))).await;
    }
}

impl Drop for SyncOrchestrator {
    fn drop(&mut self) {
        let items = self.items.get_mut().unwrap_or_else(PoisonError::into_inner);
        for item in items.values() {
            // Held only by an in-flight start or stop, which owns the runtime
            let Ok(mut runtime) = item.runtime.try_lock() else {
                continue;
            };
            let Some(runtime) = runtime.take() else {
                continue;
            };
            runtime.cancel.cancel();
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                let backend = runtime.backend;
                handle.spawn(async move { backend.terminate().await });
            }
            item.set_status(SyncStatus::Inactive);
            debug!("Cancelled sync item {} on drop", item.id());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use mirsync_transfer::TransferBackend;
    use mirsync_types::{ConnectionStatus, ErrorKind, FileEvent};
    use rstest::rstest;
    use std::path::{Path, PathBuf};
    use std::sync::Mutex;
    use tempfile::TempDir;
    use tokio::sync::watch;

    /// Records events; fails every call once `fail` is set
    struct RecordingBackend {
        applied: Mutex<Vec<FileEvent>>,
        fail: std::sync::atomic::AtomicBool,
        status: watch::Sender<ConnectionStatus>,
    }

    impl RecordingBackend {
        fn new() -> Arc<Self> {
            let (status, _) = watch::channel(ConnectionStatus::Disconnected);
            Arc::new(Self {
                applied: Mutex::new(Vec::new()),
                fail: std::sync::atomic::AtomicBool::new(false),
                status,
            })
        }

        fn record(&self, event: FileEvent) -> Result<()> {
            if self.fail.load(std::sync::atomic::Ordering::SeqCst) {
                return Err(Error::execution("refused"));
            }
            self.applied.lock().unwrap().push(event);
            self.status.send_replace(ConnectionStatus::Connected);
            Ok(())
        }

        fn applied(&self) -> Vec<FileEvent> {
            self.applied.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl TransferBackend for RecordingBackend {
        async fn connect(&self) -> Result<()> {
            Ok(())
        }

        async fn upload(&self, path: &Path, is_dir: bool) -> Result<()> {
            self.record(FileEvent::created(path, is_dir))
        }

        async fn remove(&self, path: &Path, is_dir: bool) -> Result<()> {
            self.record(FileEvent::removed(path, is_dir))
        }

        async fn rename(&self, src: &Path, dst: &Path) -> Result<()> {
            self.record(FileEvent::renamed(src, dst))
        }

        async fn terminate(&self) {
            self.status.send_replace(ConnectionStatus::Disconnected);
        }

        fn subscribe_status(&self) -> watch::Receiver<ConnectionStatus> {
            self.status.subscribe()
        }
    }

    struct RecordingFactory {
        backend: Arc<RecordingBackend>,
    }

    impl BackendFactory for RecordingFactory {
        fn create(&self, _: &Configuration, _: &BackendOptions) -> Result<Arc<dyn TransferBackend>> {
            Ok(self.backend.clone())
        }
    }

    /// Never finishes a mutation
    struct HangingBackend {
        entered: std::sync::atomic::AtomicUsize,
        status: watch::Sender<ConnectionStatus>,
    }

    impl HangingBackend {
        fn new() -> Arc<Self> {
            let (status, _) = watch::channel(ConnectionStatus::Disconnected);
            Arc::new(Self {
                entered: std::sync::atomic::AtomicUsize::new(0),
                status,
            })
        }

        async fn hang(&self) -> Result<()> {
            self.entered.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            std::future::pending::<Result<()>>().await
        }
    }

    #[async_trait]
    impl TransferBackend for HangingBackend {
        async fn connect(&self) -> Result<()> {
            self.hang().await
        }

        async fn upload(&self, _: &Path, _: bool) -> Result<()> {
            self.hang().await
        }

        async fn remove(&self, _: &Path, _: bool) -> Result<()> {
            self.hang().await
        }

        async fn rename(&self, _: &Path, _: &Path) -> Result<()> {
            self.hang().await
        }

        async fn terminate(&self) {
            self.status.send_replace(ConnectionStatus::Disconnected);
        }

        fn subscribe_status(&self) -> watch::Receiver<ConnectionStatus> {
            self.status.subscribe()
        }
    }

    struct HangingFactory {
        backend: Arc<HangingBackend>,
    }

    impl BackendFactory for HangingFactory {
        fn create(&self, _: &Configuration, _: &BackendOptions) -> Result<Arc<dyn TransferBackend>> {
            Ok(self.backend.clone())
        }
    }

    struct Fixture {
        _dir: TempDir,
        src: PathBuf,
        backend: Arc<RecordingBackend>,
        orchestrator: SyncOrchestrator,
    }

    fn fixture(initial_upload: bool) -> Fixture {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("src");
        std::fs::create_dir_all(&src).unwrap();
        let src = src.canonicalize().unwrap();
        let backend = RecordingBackend::new();
        let orchestrator = SyncOrchestrator::with_factory(
            Arc::new(RecordingFactory {
                backend: backend.clone(),
            }),
            OrchestratorOptions {
                initial_upload,
                ..OrchestratorOptions::default()
            },
        );
        Fixture {
            _dir: dir,
            src,
            backend,
            orchestrator,
        }
    }

    fn configuration(src: &Path) -> Configuration {
        Configuration::new("test", Connection::local(src), Connection::local("/unused"))
    }

    fn ignore_errors() -> ErrorHandler {
        Arc::new(|_: &SyncItem, _: &Error| {})
    }

    async fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
        for _ in 0..200 {
            if condition() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        condition()
    }

    #[rstest]
    #[case(50, 300, false)]
    #[case(5, 1, true)]
    fn test_options_from_settings(#[case] window_ms: u64, #[case] idle_secs: u64, #[case] initial_upload: bool) {
        let settings = EngineSettings {
            rename_window_ms: window_ms,
            idle_timeout_secs: idle_secs,
            initial_upload,
            event_buffer: 16,
        };
        let options = OrchestratorOptions::from(&settings);
        assert_eq!(options.rename_window, Duration::from_millis(window_ms));
        assert_eq!(options.idle_timeout, Duration::from_secs(idle_secs));
        assert_eq!(options.initial_upload, initial_upload);
        assert_eq!(options.event_buffer, 16);
    }

    #[tokio::test]
    async fn test_register_duplicate() {
        let f = fixture(false);
        let configuration = configuration(&f.src);
        f.orchestrator.register(configuration.clone()).unwrap();
        let error = f.orchestrator.register(configuration).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Initialization);
        assert!(matches!(error, Error::Duplicate { .. }));
    }

    #[tokio::test]
    async fn test_start_status_and_dispatch() {
        let f = fixture(false);
        let item = f.orchestrator.register(configuration(&f.src)).unwrap();
        assert_eq!(item.status(), SyncStatus::Inactive);

        f.orchestrator.start(&item, ignore_errors()).await.unwrap();
        assert_eq!(item.status(), SyncStatus::Active);

        std::fs::write(f.src.join("a.txt"), "x").unwrap();
        assert!(wait_for(|| !f.backend.applied().is_empty()).await);
        assert_eq!(f.backend.applied()[0], FileEvent::FileCreated(f.src.join("a.txt")));
        assert!(wait_for(|| item.status() == SyncStatus::Connected).await);
        assert!(item.last_synced().is_some());

        f.orchestrator.stop(&item).await;
        assert_eq!(item.status(), SyncStatus::Inactive);
    }

    #[tokio::test]
    async fn test_failure_is_terminal_until_restart() {
        let f = fixture(false);
        let item = f.orchestrator.register(configuration(&f.src)).unwrap();
        let reported = Arc::new(Mutex::new(Vec::new()));
        let sink = reported.clone();
        let on_error: ErrorHandler = Arc::new(move |item: &SyncItem, error: &Error| {
            sink.lock().unwrap().push((item.id(), error.kind()));
        });

        f.backend.fail.store(true, std::sync::atomic::Ordering::SeqCst);
        f.orchestrator.start(&item, on_error).await.unwrap();
        std::fs::write(f.src.join("a.txt"), "x").unwrap();

        assert!(wait_for(|| item.status() == SyncStatus::Failed).await);
        assert_eq!(reported.lock().unwrap().as_slice(), &[(item.id(), ErrorKind::Execution)]);

        // a later reconnect does not revive the item
        f.backend.status.send_replace(ConnectionStatus::Connected);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(item.status(), SyncStatus::Failed);

        let error = f.orchestrator.start(&item, ignore_errors()).await.unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Initialization);

        f.backend.fail.store(false, std::sync::atomic::Ordering::SeqCst);
        f.orchestrator.stop(&item).await;
        f.orchestrator.start(&item, ignore_errors()).await.unwrap();
        assert_eq!(item.status(), SyncStatus::Active);
        f.orchestrator.shutdown().await;
    }

    #[tokio::test]
    async fn test_backend_signal_folding() {
        let f = fixture(false);
        let item = f.orchestrator.register(configuration(&f.src)).unwrap();
        f.orchestrator.start(&item, ignore_errors()).await.unwrap();

        f.backend.status.send_replace(ConnectionStatus::Connected);
        assert!(wait_for(|| item.status() == SyncStatus::Connected).await);
        f.backend.status.send_replace(ConnectionStatus::Disconnected);
        assert!(wait_for(|| item.status() == SyncStatus::Active).await);

        f.orchestrator.stop(&item).await;
        assert_eq!(item.status(), SyncStatus::Inactive);
    }

    #[tokio::test]
    async fn test_no_events_after_stop() {
        let f = fixture(false);
        let item = f.orchestrator.register(configuration(&f.src)).unwrap();
        f.orchestrator.start(&item, ignore_errors()).await.unwrap();
        f.orchestrator.stop(&item).await;

        let before = f.backend.applied().len();
        std::fs::write(f.src.join("late.txt"), "x").unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(f.backend.applied().len(), before);
    }

    #[tokio::test]
    async fn test_initial_upload_parents_first() {
        let f = fixture(true);
        std::fs::create_dir_all(f.src.join("d/e")).unwrap();
        std::fs::write(f.src.join("d/e/f.txt"), "x").unwrap();

        let item = f.orchestrator.register(configuration(&f.src)).unwrap();
        f.orchestrator.start(&item, ignore_errors()).await.unwrap();
        assert!(wait_for(|| f.backend.applied().len() >= 3).await);

        let applied = f.backend.applied();
        assert_eq!(
            &applied[..3],
            &[
                FileEvent::DirCreated(f.src.join("d")),
                FileEvent::DirCreated(f.src.join("d/e")),
                FileEvent::FileCreated(f.src.join("d/e/f.txt")),
            ]
        );
        f.orchestrator.shutdown().await;
    }

    #[tokio::test]
    async fn test_start_with_missing_root() {
        let f = fixture(false);
        let item = f
            .orchestrator
            .register(configuration(&f.src.join("missing")))
            .unwrap();
        let error = f.orchestrator.start(&item, ignore_errors()).await.unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Initialization);
        assert_eq!(item.status(), SyncStatus::Inactive);
    }

    #[tokio::test]
    async fn test_unregister() {
        let f = fixture(false);
        let item = f.orchestrator.register(configuration(&f.src)).unwrap();
        f.orchestrator.start(&item, ignore_errors()).await.unwrap();

        f.orchestrator.unregister(item.id()).await.unwrap();
        assert_eq!(item.status(), SyncStatus::Inactive);
        assert!(f.orchestrator.item(item.id()).is_none());
        assert_eq!(
            f.orchestrator.unregister(item.id()).await.unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }

    #[tokio::test]
    async fn test_shutdown_abandons_stuck_backend_calls() {
        let dir = TempDir::new().unwrap();
        let backend = HangingBackend::new();
        let orchestrator = SyncOrchestrator::with_factory(
            Arc::new(HangingFactory {
                backend: backend.clone(),
            }),
            OrchestratorOptions::default(),
        );

        let mut items = Vec::new();
        for name in ["one", "two"] {
            let src = dir.path().join(name);
            std::fs::create_dir_all(&src).unwrap();
            let item = orchestrator.register(configuration(&src)).unwrap();
            orchestrator.start(&item, ignore_errors()).await.unwrap();
            std::fs::write(src.join("a.txt"), "x").unwrap();
            items.push(item);
        }
        assert!(wait_for(|| backend.entered.load(std::sync::atomic::Ordering::SeqCst) >= 2).await);

        let stopped = tokio::time::timeout(Duration::from_secs(5), orchestrator.shutdown()).await;
        assert!(stopped.is_ok());
        for item in &items {
            assert_eq!(item.status(), SyncStatus::Inactive);
        }
    }

    #[tokio::test]
    async fn test_drop_cancels_started_items() {
        let Fixture {
            _dir,
            src,
            backend,
            orchestrator,
        } = fixture(false);
        let item = orchestrator.register(configuration(&src)).unwrap();
        orchestrator.start(&item, ignore_errors()).await.unwrap();

        drop(orchestrator);
        assert_eq!(item.status(), SyncStatus::Inactive);

        std::fs::write(src.join("after_drop.txt"), "x").unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(backend.applied().is_empty());
    }

    #[tokio::test]
    async fn test_items_are_isolated() {
        let dir = TempDir::new().unwrap();
        let good_src = dir.path().join("good");
        let bad_src = dir.path().join("bad");
        let good_dst = dir.path().join("good-dst");
        std::fs::create_dir_all(&good_src).unwrap();
        std::fs::create_dir_all(&bad_src).unwrap();
        std::fs::create_dir_all(&good_dst).unwrap();

        let good = Configuration::new("good", Connection::local(&good_src), Connection::local(&good_dst));
        // a plain file where the destination directory should be
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "").unwrap();
        let bad = Configuration::new("bad", Connection::local(&bad_src), Connection::local(&blocker));
        let (good_id, bad_id) = (good.id(), bad.id());

        let orchestrator =
            SyncOrchestrator::with_configurations([good, bad], OrchestratorOptions::default(), ignore_errors())
                .await
                .unwrap();
        let good = orchestrator.item(good_id).unwrap();
        let bad = orchestrator.item(bad_id).unwrap();

        std::fs::write(bad_src.join("x.txt"), "x").unwrap();
        assert!(wait_for(|| bad.status() == SyncStatus::Failed).await);

        std::fs::write(good_src.join("y.txt"), "y").unwrap();
        assert!(wait_for(|| good_dst.join("y.txt").exists()).await);
        assert!(wait_for(|| good.status() == SyncStatus::Connected).await);

        orchestrator.shutdown().await;
    }
}
