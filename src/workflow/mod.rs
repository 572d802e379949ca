//! The conversion workflow controller.
//!
//! ## Data Flow
//!
//! ```text
//! select_file ──▶ detect ──▶ select_format ──▶ convert ──▶ download ──▶ cleanup
//!  (guard)      (remote)      (gate)          (remote)    (remote)    (remote)
//!      ▲                                                                  │
//!      └──────────────────────────── reset ◀──────────────────────────────┘
//! ```
//!
//! 1. [`detect`]      — Selection Guard and Detector: stage a file, classify it
//! 2. [`gate`]        — Format Gate: enable only formats matching the type
//! 3. [`orchestrate`] — Conversion Orchestrator: convert, download, cleanup, reset
//!
//! All state lives in one [`WorkflowState`](state) record behind a mutex
//! that is never held across an `.await`. Every file selection and reset
//! starts a new *cycle*; each remote call remembers the cycle it was issued
//! under and its completion is applied only if that cycle is still current.
//! A superseded completion is dropped and its caller receives
//! [`WorkflowError::Superseded`](crate::WorkflowError::Superseded).

pub mod detect;
pub mod gate;
pub mod orchestrate;
pub mod state;

pub use gate::{FormatAvailability, FormatOption};
pub use state::{Phase, StepError, WorkflowSnapshot};

use crate::config::ClientConfig;
use crate::error::{GeoConvertError, Step};
use crate::i18n::Locale;
use crate::model::FormatCatalog;
use crate::observer::{NoopObserver, SharedObserver};
use crate::service::{ConversionBackend, HttpBackend};
use once_cell::sync::{Lazy, OnceCell};
use state::WorkflowState;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use tracing::{debug, info, warn};

static EMPTY_CATALOG: Lazy<FormatCatalog> = Lazy::new(FormatCatalog::default);

/// Drives one file at a time through detection, format selection,
/// conversion, download and cleanup.
///
/// Cheap to clone; clones share the same workflow. Operations may be issued
/// from different tasks: a `select_file` or `reset` issued while a remote
/// call is outstanding takes effect immediately and the outstanding call's
/// result is discarded.
#[derive(Clone)]
pub struct WorkflowController {
    inner: Arc<Inner>,
}

struct Inner {
    backend: Arc<dyn ConversionBackend>,
    locale: Locale,
    cleanup_on_reset: bool,
    catalog: OnceCell<FormatCatalog>,
    state: Mutex<WorkflowState>,
    updates: watch::Sender<WorkflowSnapshot>,
    observer: SharedObserver,
}

impl WorkflowController {
    /// Create a controller over any backend. The format catalog starts
    /// empty; call [`load_catalog`](Self::load_catalog) once at startup.
    pub fn new(backend: Arc<dyn ConversionBackend>, config: &ClientConfig) -> Self {
        Self::with_observer(backend, config, Arc::new(NoopObserver))
    }

    /// Like [`new`](Self::new), reporting every transition to `observer`.
    pub fn with_observer(
        backend: Arc<dyn ConversionBackend>,
        config: &ClientConfig,
        observer: SharedObserver,
    ) -> Self {
        let (updates, _) = watch::channel(WorkflowSnapshot::default());
        Self {
            inner: Arc::new(Inner {
                backend,
                locale: config.locale.clone(),
                cleanup_on_reset: config.cleanup_on_reset,
                catalog: OnceCell::new(),
                state: Mutex::new(WorkflowState::default()),
                updates,
                observer,
            }),
        }
    }

    /// Build an HTTP-backed controller and load the format catalog.
    ///
    /// A catalog failure is not fatal: it is logged and the catalog stays
    /// empty, exactly as if the server offered no formats.
    pub async fn connect(
        config: &ClientConfig,
        observer: Option<SharedObserver>,
    ) -> Result<Self, GeoConvertError> {
        let backend = Arc::new(HttpBackend::new(config.clone())?);
        let controller = match observer {
            Some(o) => Self::with_observer(backend, config, o),
            None => Self::new(backend, config),
        };
        controller.load_catalog().await;
        Ok(controller)
    }

    // ── Catalog ──────────────────────────────────────────────────────────

    /// Fetch the format catalog. After the first successful load the
    /// catalog is read-only and later calls return it without a request.
    pub async fn load_catalog(&self) -> &FormatCatalog {
        if let Some(catalog) = self.inner.catalog.get() {
            return catalog;
        }
        match self.inner.backend.fetch_formats().await {
            Ok(catalog) => {
                info!(
                    "Loaded format catalog: {} vector, {} raster",
                    catalog.vector.len(),
                    catalog.raster.len()
                );
                let loaded = self.inner.catalog.get_or_init(|| catalog);
                self.mutate(|_| ());
                loaded
            }
            Err(e) => {
                warn!("Failed to fetch formats: {}", e);
                &*EMPTY_CATALOG
            }
        }
    }

    /// The loaded catalog, or an empty one if loading failed or never ran.
    pub fn catalog(&self) -> &FormatCatalog {
        self.inner.catalog.get().unwrap_or(&*EMPTY_CATALOG)
    }

    // ── Read side ────────────────────────────────────────────────────────

    /// The current state.
    pub fn snapshot(&self) -> WorkflowSnapshot {
        self.lock().snapshot()
    }

    /// A receiver that always holds the latest snapshot.
    pub fn subscribe(&self) -> watch::Receiver<WorkflowSnapshot> {
        self.inner.updates.subscribe()
    }

    /// The latest snapshot followed by every later one, as a stream.
    pub fn updates(&self) -> WatchStream<WorkflowSnapshot> {
        WatchStream::new(self.subscribe())
    }

    /// Locale tag sent with detection and conversion requests.
    pub fn locale(&self) -> &Locale {
        &self.inner.locale
    }

    // ── Internal helpers ─────────────────────────────────────────────────

    fn backend(&self) -> &dyn ConversionBackend {
        self.inner.backend.as_ref()
    }

    fn lock(&self) -> MutexGuard<'_, WorkflowState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply `f` to the state and publish the resulting snapshot.
    fn mutate<R>(&self, f: impl FnOnce(&mut WorkflowState) -> R) -> R {
        let (out, snapshot) = {
            let mut state = self.lock();
            let out = f(&mut state);
            (out, self.publish(&state))
        };
        self.notify(&snapshot);
        out
    }

    /// Apply `f` only if `cycle` is still current. Returns `None`, and
    /// reports the stale completion, otherwise.
    fn mutate_if_current<R>(
        &self,
        cycle: u64,
        step: Step,
        f: impl FnOnce(&mut WorkflowState) -> R,
    ) -> Option<R> {
        let applied = {
            let mut state = self.lock();
            if state.cycle == cycle {
                let out = f(&mut state);
                Some((out, self.publish(&state)))
            } else {
                None
            }
        };
        match applied {
            Some((out, snapshot)) => {
                self.notify(&snapshot);
                Some(out)
            }
            None => {
                debug!("Discarding stale {} completion from cycle {}", step, cycle);
                self.inner.observer.on_stale_completion(step, cycle);
                None
            }
        }
    }

    /// Push the state to subscribers. Called with the lock held so the
    /// channel sees snapshots in mutation order.
    fn publish(&self, state: &WorkflowState) -> WorkflowSnapshot {
        let snapshot = state.snapshot();
        self.inner.updates.send_replace(snapshot.clone());
        snapshot
    }

    /// Report a published snapshot to the observer. Called without the lock.
    fn notify(&self, snapshot: &WorkflowSnapshot) {
        self.inner.observer.on_state_change(snapshot);
    }
}

impl std::fmt::Debug for WorkflowController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowController")
            .field("locale", &self.inner.locale)
            .field("cleanup_on_reset", &self.inner.cleanup_on_reset)
            .field("catalog_loaded", &self.inner.catalog.get().is_some())
            .field("state", &self.snapshot())
            .finish()
    }
}
