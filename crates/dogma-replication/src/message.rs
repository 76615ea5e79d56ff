//! Wire messages exchanged between replicas (C5).
//!
//! Deliberately smaller than full Viewstamped Replication: a single-round
//! quorum commit with term-based leader election, modelled after VSR's
//! message-driven replica state machine but without view-change,
//! reconfiguration, or standby-replica support — the spec calls for a
//! "Zookeeper-style quorum write-ahead log", non-Byzantine, which doesn't
//! need VSR's full generality.

use dogma_types::ReplicationLogEntry;

pub type ReplicaId = u32;

#[derive(Debug, Clone)]
pub enum LogMessage {
    /// A candidate canvassing support for a new term.
    Canvass { term: u64, candidate: ReplicaId, last_seq: i64 },
    /// A peer's response to a `Canvass`.
    Pledge { term: u64, granted: bool },
    /// Periodic leader heartbeat, also used to propagate the committed
    /// watermark to followers.
    Heartbeat { term: u64, leader: ReplicaId, committed_seq: i64 },
    /// Leader proposing a new log entry.
    Propose { term: u64, entry: ReplicationLogEntry },
    /// Follower acknowledging a `Propose`.
    ProposeAck { term: u64, seq: i64 },
    /// Leader informing followers an entry has reached quorum and is
    /// committed.
    Commit { term: u64, seq: i64 },
}
