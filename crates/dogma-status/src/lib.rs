//! # dogma-status: the replica status manager (C3)
//!
//! Holds the per-replica `{started, writable, replicating}` flags and
//! serializes transitions between them. Readers observe the flags through
//! atomic loads; the status manager is the single writer.
//!
//! ```text
//!               start()                 stop()
//!     (idle) ───────────▶ (started) ───────▶ (stopping) ───▶ (idle)
//!                             │  set_writable(false)
//!                             ▼
//!                        (read-only)
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{Notify, OnceCell};
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum StatusError {
    #[error("status manager already started")]
    AlreadyStarted,
    #[error("status manager is not started")]
    NotStarted,
}

/// A transition a listener is notified about. Fired exactly once per
/// transition, with a single-flight guarantee (§9, "Callbacks for
/// leadership transitions").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Started,
    Stopped,
    WritableChanged(bool),
    ReplicatingChanged(bool),
}

/// The status manager: `{started, writable, replicating}` plus a listener
/// set for transition notifications.
#[derive(Debug)]
pub struct StatusManager {
    started: AtomicBool,
    writable: AtomicBool,
    replicating: AtomicBool,
    start_once: OnceCell<()>,
    notify: Notify,
    listeners: listeners::ListenerList,
}

mod listeners {
    //! Transition listener registry.
    use std::sync::Mutex;

    use super::Transition;

    type Listener = Box<dyn Fn(Transition) + Send + Sync>;

    #[derive(Default)]
    pub struct ListenerList {
        listeners: Mutex<Vec<Listener>>,
    }

    impl std::fmt::Debug for ListenerList {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("ListenerList").finish_non_exhaustive()
        }
    }

    impl ListenerList {
        pub fn register(&self, listener: Listener) {
            self.listeners.lock().expect("listener list poisoned").push(listener);
        }

        pub fn fire(&self, transition: Transition) {
            for listener in self.listeners.lock().expect("listener list poisoned").iter() {
                listener(transition);
            }
        }
    }
}

impl Default for StatusManager {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusManager {
    #[must_use]
    pub fn new() -> Self {
        Self {
            started: AtomicBool::new(false),
            writable: AtomicBool::new(true),
            replicating: AtomicBool::new(false),
            start_once: OnceCell::new(),
            notify: Notify::new(),
            listeners: listeners::ListenerList::default(),
        }
    }

    /// Registers a listener fired on every future transition.
    pub fn on_transition(&self, listener: impl Fn(Transition) + Send + Sync + 'static) {
        self.listeners.register(Box::new(listener));
    }

    /// Starts the status manager. Idempotent: concurrent callers share one
    /// future via `OnceCell`.
    pub async fn start(&self) {
        self.start_once
            .get_or_init(|| async {
                self.started.store(true, Ordering::SeqCst);
                self.notify.notify_waiters();
                self.listeners.fire(Transition::Started);
                info!("status manager started");
            })
            .await;
    }

    pub fn stop(&self) {
        self.started.store(false, Ordering::SeqCst);
        self.notify.notify_waiters();
        self.listeners.fire(Transition::Stopped);
        info!("status manager stopped");
    }

    #[must_use]
    pub fn started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn writable(&self) -> bool {
        self.writable.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn replicating(&self) -> bool {
        self.replicating.load(Ordering::SeqCst)
    }

    /// `isWritable = started ∧ writable` (§4.3).
    #[must_use]
    pub fn is_writable(&self) -> bool {
        self.started() && self.writable()
    }

    pub fn set_writable(&self, writable: bool) {
        self.writable.store(writable, Ordering::SeqCst);
        if !writable {
            warn!("server entering read-only mode");
        }
        self.listeners.fire(Transition::WritableChanged(writable));
    }

    pub fn set_replicating(&self, replicating: bool) {
        self.replicating.store(replicating, Ordering::SeqCst);
        self.listeners.fire(Transition::ReplicatingChanged(replicating));
    }

    /// Waits until the next transition of any kind. Used by tests and by
    /// health-check callers that want to block briefly rather than poll.
    pub async fn changed(&self) {
        self.notify.notified().await;
    }
}

/// A cheaply cloneable handle, since most call sites pass the status
/// manager around by `Arc` (C4, C5, C7, C8 all read it).
pub type SharedStatus = Arc<StatusManager>;
