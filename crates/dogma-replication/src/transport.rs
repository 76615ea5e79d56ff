//! The transport seam (generalizes the teacher's `Network` trait) and an
//! in-memory implementation used to drive multi-replica tests without real
//! sockets — TLS/networking is out of scope (§1).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crossbeam_queue::SegQueue;

use crate::message::{LogMessage, ReplicaId};

/// A point-to-point message channel bound to one replica's identity.
/// Non-blocking by design: the apply/election loop polls it on the same
/// idle-sleep cadence as the rest of the workspace's worker loops (§5).
pub trait Transport: Send + Sync {
    fn send(&self, to: ReplicaId, message: LogMessage);
    fn try_recv(&self) -> Option<(ReplicaId, LogMessage)>;
}

type Inbox = Arc<SegQueue<(ReplicaId, LogMessage)>>;

/// A shared, in-process hub connecting simulated replicas. Standing in for
/// the real quorum network (ZooKeeper-style, per §4.5) in tests.
#[derive(Default, Clone)]
pub struct InMemoryHub {
    inboxes: Arc<Mutex<HashMap<ReplicaId, Inbox>>>,
}

impl InMemoryHub {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a replica and returns its transport handle.
    #[must_use]
    pub fn join(&self, id: ReplicaId) -> InMemoryTransport {
        let inbox: Inbox = Arc::new(SegQueue::new());
        self.inboxes.lock().expect("hub mutex poisoned").insert(id, inbox);
        InMemoryTransport { id, hub: self.inboxes.clone() }
    }

    /// Simulates a replica crash: removes it from the hub so other
    /// replicas' sends to it are silently dropped (scenario 4, "Kill R1").
    pub fn kill(&self, id: ReplicaId) {
        self.inboxes.lock().expect("hub mutex poisoned").remove(&id);
    }
}

#[derive(Clone)]
pub struct InMemoryTransport {
    id: ReplicaId,
    hub: Arc<Mutex<HashMap<ReplicaId, Inbox>>>,
}

impl Transport for InMemoryTransport {
    fn send(&self, to: ReplicaId, message: LogMessage) {
        if let Some(inbox) = self.hub.lock().expect("hub mutex poisoned").get(&to) {
            inbox.push((self.id, message));
        }
    }

    fn try_recv(&self) -> Option<(ReplicaId, LogMessage)> {
        self.hub.lock().expect("hub mutex poisoned").get(&self.id).and_then(SegQueue::pop)
    }
}

/// A transport that delivers nothing and receives nothing: used by
/// [`crate::standalone::StandaloneLog`], which never actually talks to
/// peers.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpTransport;

impl Transport for NoOpTransport {
    fn send(&self, _to: ReplicaId, _message: LogMessage) {}
    fn try_recv(&self) -> Option<(ReplicaId, LogMessage)> {
        None
    }
}
