//! Observer trait for workflow events.
//!
//! Inject an [`Arc<dyn WorkflowObserver>`] via
//! [`crate::workflow::WorkflowController::with_observer`] to receive every
//! state snapshot plus the events that never reach the visible state:
//! discarded stale completions and swallowed cleanup failures.
//!
//! For pull-style consumers the controller also offers
//! [`crate::workflow::WorkflowController::subscribe`], a `watch` channel of
//! snapshots; both see the same sequence of states.
//!
//! # Example
//!
//! ```rust
//! use geoconvert_client::{WorkflowObserver, WorkflowSnapshot};
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! struct CountingObserver {
//!     updates: AtomicUsize,
//! }
//!
//! impl WorkflowObserver for CountingObserver {
//!     fn on_state_change(&self, snapshot: &WorkflowSnapshot) {
//!         self.updates.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("phase: {:?}", snapshot.phase());
//!     }
//! }
//! ```

use crate::error::{ServiceError, Step};
use crate::model::ArtifactId;
use crate::workflow::WorkflowSnapshot;
use std::sync::Arc;

/// Called by the controller as the workflow moves between states.
///
/// Implementations must be `Send + Sync`: operations may run on different
/// tasks. Callbacks run after the controller's state lock is released, so
/// they may read the controller but must not block for long. All methods
/// default to no-ops.
pub trait WorkflowObserver: Send + Sync {
    /// Called after every state mutation with the new snapshot.
    fn on_state_change(&self, snapshot: &WorkflowSnapshot) {
        let _ = snapshot;
    }

    /// Called when a completion arrives for a superseded cycle and is dropped.
    fn on_stale_completion(&self, step: Step, cycle: u64) {
        let _ = (step, cycle);
    }

    /// Called when a best-effort cleanup fails.
    fn on_cleanup_failed(&self, artifact: &ArtifactId, error: &ServiceError) {
        let _ = (artifact, error);
    }
}

/// A no-op observer; the default when none is configured.
pub struct NoopObserver;

impl WorkflowObserver for NoopObserver {}

/// Convenience alias matching the type held by the controller.
pub type SharedObserver = Arc<dyn WorkflowObserver>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct TrackingObserver {
        changes: AtomicUsize,
        stale: AtomicUsize,
        cleanup_failures: AtomicUsize,
    }

    impl WorkflowObserver for TrackingObserver {
        fn on_state_change(&self, _snapshot: &WorkflowSnapshot) {
            self.changes.fetch_add(1, Ordering::SeqCst);
        }

        fn on_stale_completion(&self, _step: Step, _cycle: u64) {
            self.stale.fetch_add(1, Ordering::SeqCst);
        }

        fn on_cleanup_failed(&self, _artifact: &ArtifactId, _error: &ServiceError) {
            self.cleanup_failures.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_observer_does_not_panic() {
        let o = NoopObserver;
        o.on_state_change(&WorkflowSnapshot::default());
        o.on_stale_completion(Step::Detection, 3);
        o.on_cleanup_failed(
            &crate::model::DownloadHandle::new("/api/download/x")
                .artifact_id()
                .unwrap(),
            &ServiceError::Transport("down".into()),
        );
    }

    #[test]
    fn tracking_observer_receives_events() {
        let tracker = TrackingObserver::default();
        let snap = WorkflowSnapshot::default();
        tracker.on_state_change(&snap);
        tracker.on_state_change(&snap);
        tracker.on_stale_completion(Step::Conversion, 1);
        assert_eq!(tracker.changes.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.stale.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.cleanup_failures.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn arc_dyn_observer_works() {
        let o: SharedObserver = Arc::new(NoopObserver);
        o.on_state_change(&WorkflowSnapshot::default());
    }
}
