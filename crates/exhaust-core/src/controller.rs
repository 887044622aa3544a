// ── Controller abstraction ──
//
// Owns the fleet: module registry, device client, status cache and
// state store. Lifecycle lives here; bring-up, scheduling and
// activation are implemented in their own modules as `impl Controller`
// blocks.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use exhaust_api::DeviceClient;

use crate::config::ExhaustConfig;
use crate::error::CoreError;
use crate::registry::ModuleRegistry;
use crate::scheduler::{TickReport, scheduler_task};
use crate::store::{ModuleStatusCache, StateStore};

/// The main entry point for consumers.
///
/// Cheaply cloneable via `Arc<ControllerInner>`. Every clone shares the
/// same stores, so the scheduler task and inbound commands see one
/// consistent fleet.
#[derive(Clone)]
pub struct Controller {
    pub(crate) inner: Arc<ControllerInner>,
}

pub(crate) struct ControllerInner {
    pub(crate) config: ExhaustConfig,
    pub(crate) registry: ModuleRegistry,
    pub(crate) client: DeviceClient,
    pub(crate) modules: ModuleStatusCache,
    pub(crate) store: StateStore,
    /// Serializes scheduler ticks with turn-on / turn-off so state
    /// mutations have a single writer at a time.
    pub(crate) operation_lock: Mutex<()>,
    /// Set while a tick runs; a tick that finds it set is skipped.
    pub(crate) tick_running: AtomicBool,
    cancel: CancellationToken,
    task_handle: Mutex<Option<JoinHandle<()>>>,
}

impl Controller {
    /// Create a controller, loading persisted state from
    /// `config.state_path` when set. Does NOT touch the modules --
    /// call [`start()`](Self::start) to run the first tick and spawn the
    /// scheduler.
    ///
    /// Takes the state file's writer lock; fails with
    /// [`CoreError::StateLocked`] while another controller holds it.
    pub fn new(config: ExhaustConfig) -> Result<Self, CoreError> {
        let store = match config.state_path.as_deref() {
            Some(path) => StateStore::open(path)?,
            None => StateStore::in_memory(),
        };
        Self::with_store(config, store)
    }

    /// Create a controller that reads persisted state without taking the
    /// writer lock. State changes made through it are never written back.
    pub fn read_only(config: ExhaustConfig) -> Result<Self, CoreError> {
        let store = match config.state_path.as_deref() {
            Some(path) => StateStore::open_read_only(path),
            None => StateStore::in_memory(),
        };
        Self::with_store(config, store)
    }

    /// Create a controller around an already-opened store.
    pub fn with_store(config: ExhaustConfig, store: StateStore) -> Result<Self, CoreError> {
        let client = DeviceClient::new(config.transport.clone())?;
        let registry = config.registry();
        if registry.is_empty() {
            warn!("no module hosts configured");
        }

        Ok(Self {
            inner: Arc::new(ControllerInner {
                config,
                registry,
                client,
                modules: ModuleStatusCache::new(),
                store,
                operation_lock: Mutex::new(()),
                tick_running: AtomicBool::new(false),
                cancel: CancellationToken::new(),
                task_handle: Mutex::new(None),
            }),
        })
    }

    pub fn config(&self) -> &ExhaustConfig {
        &self.inner.config
    }

    pub fn registry(&self) -> &ModuleRegistry {
        &self.inner.registry
    }

    pub fn store(&self) -> &StateStore {
        &self.inner.store
    }

    pub fn modules(&self) -> &ModuleStatusCache {
        &self.inner.modules
    }

    // ── Lifecycle ────────────────────────────────────────────────

    /// Run the first tick to completion, then spawn the periodic
    /// scheduler. Initialization side effects have happened by the time
    /// this returns.
    pub async fn start(&self) -> TickReport {
        let mut handle = self.inner.task_handle.lock().await;
        if handle.is_some() {
            debug!("scheduler already running");
            return TickReport::skipped();
        }

        info!(
            modules = self.inner.registry.len(),
            interval_ms = self.inner.config.sweep_interval.as_millis(),
            "starting exhaust scheduler"
        );
        let report = self.tick().await;

        let ctrl = self.clone();
        let cancel = self.inner.cancel.child_token();
        let period = self.inner.config.sweep_interval;
        *handle = Some(tokio::spawn(scheduler_task(ctrl, period, cancel)));

        info!("exhaust scheduler started");
        report
    }

    /// Stop the scheduler and flush state. An in-flight tick finishes
    /// first; hardware calls are never cut short.
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();

        if let Some(handle) = self.inner.task_handle.lock().await.take() {
            let _ = handle.await;
        }

        if let Err(e) = self.inner.store.flush().await {
            warn!(error = %e, "final state flush failed");
        }
        debug!("exhaust scheduler stopped");
    }

    // ── One-shot convenience ─────────────────────────────────────

    /// One-shot: probe the modules, run closure.
    ///
    /// For operator invocations without a running scheduler: module
    /// status is refreshed (never re-initialized, which would switch
    /// active fans off) so turn-on's offline check has data to go on.
    pub async fn oneshot<F, Fut, T>(config: ExhaustConfig, f: F) -> Result<T, CoreError>
    where
        F: FnOnce(Controller) -> Fut,
        Fut: std::future::Future<Output = Result<T, CoreError>>,
    {
        let controller = Controller::new(config)?;
        controller.refresh_modules().await;
        f(controller).await
    }
}
