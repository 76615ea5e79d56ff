//! Term-based leader election and single-round quorum commit (C5/C6).
//!
//! A `QuorumLog` runs its own election/heartbeat/apply loop on a dedicated
//! background thread, the same dedicated-thread idiom the local executor
//! uses for its worker pool. `propose` blocks the calling thread until the
//! entry reaches quorum (or times out); callers drive it from async code via
//! `spawn_blocking` (see `executor.rs`).

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use dogma_executor::{dispatch, ExecutionOutcome, SessionSink};
use dogma_kernel::{validate_command, Storage};
use dogma_status::StatusManager;
use dogma_types::{Command, DogmaError, ReplicationLogEntry};
use rand::Rng;
use tracing::{debug, info, warn};

use crate::message::{LogMessage, ReplicaId};
use crate::transport::Transport;

const TICK: Duration = Duration::from_millis(10);
const HEARTBEAT_INTERVAL: Duration = Duration::from_millis(50);
/// Election timeout is randomized within this window to avoid split votes,
/// the same jitter idea the teacher's VSR view-change timer uses.
const ELECTION_TIMEOUT_MIN: Duration = Duration::from_millis(150);
const ELECTION_TIMEOUT_MAX: Duration = Duration::from_millis(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Follower,
    Candidate,
    Leader,
}

/// Log retention (C5, `maxLogCount` / `minLogAgeMillis`). An already-applied
/// entry is only dropped from the tail once it exceeds both bounds: there
/// are more than `max_log_count` committed entries behind it, *and* it's
/// older than `min_log_age_millis`.
#[derive(Debug, Clone, Copy)]
pub struct RetentionPolicy {
    pub max_log_count: u32,
    pub min_log_age_millis: i64,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self { max_log_count: 1024, min_log_age_millis: 86_400_000 }
    }
}

fn now_millis() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).expect("system clock is before the epoch").as_millis() as i64
}

struct PendingCommit {
    entry: ReplicationLogEntry,
    acks: Mutex<HashSet<ReplicaId>>,
    outcome: Mutex<Option<Result<ExecutionOutcome, DogmaError>>>,
}

struct State {
    role: Role,
    term: u64,
    voted_for: Option<ReplicaId>,
    pledges: HashSet<ReplicaId>,
    leader: Option<ReplicaId>,
    election_deadline: Instant,
    next_heartbeat: Instant,
    next_seq: i64,
    committed_seq: i64,
    /// Entries this replica has appended but not yet applied (leader: the
    /// quorum-pending tail; follower: entries proposed but not yet
    /// committed by the leader).
    tail: HashMap<i64, ReplicationLogEntry>,
    pending: HashMap<i64, Arc<PendingCommit>>,
}

/// A quorum-replicated command log: the combination of C5 (the log and its
/// election/commit protocol) and the apply side of C6.
pub struct QuorumLog {
    id: ReplicaId,
    peers: Vec<ReplicaId>,
    quorum_size: usize,
    transport: Arc<dyn Transport>,
    storage: Arc<dyn Storage>,
    status: Arc<StatusManager>,
    session_sink: Mutex<Option<Arc<dyn SessionSink>>>,
    state: Arc<Mutex<State>>,
    condvar: Arc<Condvar>,
    shutdown: Arc<AtomicBool>,
    worker: Mutex<Option<JoinHandle<()>>>,
    /// Set once local apply of a committed entry fails. Once set, the
    /// replica stops applying further entries and rejects new proposals;
    /// recovery is an operator action, not automatic (§7).
    diverged: AtomicBool,
    retention: RetentionPolicy,
}

impl QuorumLog {
    /// Builds and starts a replica with the default log retention. `peers`
    /// excludes `id`. All replicas must agree on the same `peers ∪ {id}`
    /// set; quorum is `len/2 + 1`.
    #[must_use]
    pub fn start(
        id: ReplicaId,
        peers: Vec<ReplicaId>,
        transport: Arc<dyn Transport>,
        storage: Arc<dyn Storage>,
        status: Arc<StatusManager>,
    ) -> Arc<Self> {
        Self::start_with_retention(id, peers, transport, storage, status, RetentionPolicy::default())
    }

    /// Builds and starts a replica with an explicit [`RetentionPolicy`]
    /// (§6 `replication.maxLogCount` / `replication.minLogAgeMillis`).
    #[must_use]
    pub fn start_with_retention(
        id: ReplicaId,
        peers: Vec<ReplicaId>,
        transport: Arc<dyn Transport>,
        storage: Arc<dyn Storage>,
        status: Arc<StatusManager>,
        retention: RetentionPolicy,
    ) -> Arc<Self> {
        let quorum_size = (peers.len() + 1) / 2 + 1;
        let now = Instant::now();
        let state = Arc::new(Mutex::new(State {
            role: Role::Follower,
            term: 0,
            voted_for: None,
            pledges: HashSet::new(),
            leader: None,
            election_deadline: now + random_election_timeout(),
            next_heartbeat: now,
            next_seq: 1,
            committed_seq: 0,
            tail: HashMap::new(),
            pending: HashMap::new(),
        }));
        let log = Arc::new(Self {
            id,
            peers,
            quorum_size,
            transport,
            storage,
            status,
            session_sink: Mutex::new(None),
            state,
            condvar: Arc::new(Condvar::new()),
            shutdown: Arc::new(AtomicBool::new(false)),
            worker: Mutex::new(None),
            diverged: AtomicBool::new(false),
            retention,
        });
        log.spawn();
        log
    }

    pub fn set_session_sink(&self, sink: Arc<dyn SessionSink>) {
        *self.session_sink.lock().expect("session sink lock poisoned") = Some(sink);
    }

    #[must_use]
    pub fn is_leader(&self) -> bool {
        self.state.lock().expect("state lock poisoned").role == Role::Leader
    }

    #[must_use]
    pub fn leader_hint(&self) -> Option<ReplicaId> {
        self.state.lock().expect("state lock poisoned").leader
    }

    #[must_use]
    pub fn committed_seq(&self) -> i64 {
        self.state.lock().expect("state lock poisoned").committed_seq
    }

    /// Whether this replica has gone read-only after failing to apply a
    /// committed entry.
    #[must_use]
    pub fn is_diverged(&self) -> bool {
        self.diverged.load(Ordering::SeqCst)
    }

    /// Marks the replica diverged and takes it read-only. Local apply of a
    /// committed entry is assumed correct everywhere else in the cluster, so
    /// a failure here means this replica's state no longer matches the
    /// leader's; only an operator can resolve that.
    fn diverge(&self, seq: i64, err: &DogmaError) {
        warn!(seq, error = %err, "apply of committed entry failed, replica is now read-only and diverged");
        self.diverged.store(true, Ordering::SeqCst);
        self.status.set_writable(false);
        self.status.set_replicating(false);
    }

    /// Spawns the election/heartbeat/apply loop on its own thread. The loop
    /// holds only a [`Weak`] reference to `self`: once every external `Arc`
    /// is dropped the thread notices on its next tick and exits on its own,
    /// rather than keeping this object alive forever via a reference cycle.
    fn spawn(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        let handle = thread::Builder::new()
            .name(format!("dogma-replica-{}", self.id))
            .spawn(move || run(&weak))
            .expect("failed to spawn replication loop thread");
        *self.worker.lock().expect("worker slot poisoned") = Some(handle);
    }

    fn tick(&self) {
        let now = Instant::now();
        let mut state = self.state.lock().expect("state lock poisoned");
        match state.role {
            Role::Leader => {
                if now >= state.next_heartbeat {
                    let committed_seq = state.committed_seq;
                    let term = state.term;
                    state.next_heartbeat = now + HEARTBEAT_INTERVAL;
                    drop(state);
                    self.broadcast(LogMessage::Heartbeat { term, leader: self.id, committed_seq });
                }
            }
            Role::Follower | Role::Candidate => {
                if now >= state.election_deadline {
                    self.start_election(&mut state);
                }
            }
        }
    }

    fn start_election(&self, state: &mut State) {
        state.role = Role::Candidate;
        state.term += 1;
        state.voted_for = Some(self.id);
        state.pledges = HashSet::from([self.id]);
        state.leader = None;
        state.election_deadline = Instant::now() + random_election_timeout();
        let term = state.term;
        let last_seq = state.committed_seq;
        info!(term, replica = self.id, "canvassing for leadership");
        // A lone replica (no peers) constitutes its own quorum.
        if state.pledges.len() >= self.quorum_size {
            state.role = Role::Leader;
            state.leader = Some(self.id);
            state.next_heartbeat = Instant::now();
            info!(term, replica = self.id, "became leader (sole voter)");
        }
        self.broadcast(LogMessage::Canvass { term, candidate: self.id, last_seq });
    }

    fn handle_message(&self, from: ReplicaId, message: LogMessage) {
        match message {
            LogMessage::Canvass { term, candidate, last_seq } => self.handle_canvass(candidate, term, last_seq),
            LogMessage::Pledge { term, granted } => self.handle_pledge(from, term, granted),
            LogMessage::Heartbeat { term, leader, committed_seq } => {
                self.handle_heartbeat(term, leader, committed_seq);
            }
            LogMessage::Propose { term, entry } => self.handle_propose(from, term, entry),
            LogMessage::ProposeAck { term, seq } => self.handle_propose_ack(from, term, seq),
            LogMessage::Commit { term, seq } => self.handle_commit(term, seq),
        }
    }

    fn handle_canvass(&self, candidate: ReplicaId, term: u64, last_seq: i64) {
        let mut state = self.state.lock().expect("state lock poisoned");
        let grant = term > state.term
            || (term == state.term && (state.voted_for.is_none() || state.voted_for == Some(candidate)));
        let grant = grant && last_seq >= state.committed_seq;
        if term > state.term {
            state.term = term;
            state.role = Role::Follower;
            state.voted_for = None;
            state.leader = None;
        }
        if grant {
            state.voted_for = Some(candidate);
            state.election_deadline = Instant::now() + random_election_timeout();
        }
        let reply_term = state.term;
        drop(state);
        self.transport.send(candidate, LogMessage::Pledge { term: reply_term, granted: grant });
    }

    fn handle_pledge(&self, from: ReplicaId, term: u64, granted: bool) {
        let mut state = self.state.lock().expect("state lock poisoned");
        if state.role != Role::Candidate || term != state.term || !granted {
            return;
        }
        state.pledges.insert(from);
        if state.pledges.len() >= self.quorum_size {
            state.role = Role::Leader;
            state.leader = Some(self.id);
            state.next_heartbeat = Instant::now();
            info!(term, replica = self.id, "became leader");
        }
    }

    fn handle_heartbeat(&self, term: u64, leader: ReplicaId, committed_seq: i64) {
        let mut state = self.state.lock().expect("state lock poisoned");
        if term < state.term {
            return;
        }
        state.term = term;
        state.role = Role::Follower;
        state.leader = Some(leader);
        state.election_deadline = Instant::now() + random_election_timeout();
        if committed_seq > state.committed_seq {
            self.apply_up_to(&mut state, committed_seq);
        }
    }

    fn handle_propose(&self, leader: ReplicaId, term: u64, entry: ReplicationLogEntry) {
        let mut state = self.state.lock().expect("state lock poisoned");
        if term < state.term {
            return;
        }
        state.term = term;
        state.role = Role::Follower;
        state.leader = Some(leader);
        state.election_deadline = Instant::now() + random_election_timeout();
        let seq = entry.seq;
        state.tail.insert(seq, entry);
        drop(state);
        self.transport.send(leader, LogMessage::ProposeAck { term, seq });
    }

    fn handle_propose_ack(&self, from: ReplicaId, term: u64, seq: i64) {
        let mut state = self.state.lock().expect("state lock poisoned");
        if state.role != Role::Leader || term != state.term {
            return;
        }
        let Some(pending) = state.pending.get(&seq).cloned() else { return };
        let acked = {
            let mut acks = pending.acks.lock().expect("acks lock poisoned");
            acks.insert(from);
            acks.len()
        };
        if acked >= self.quorum_size {
            let committed_seq = seq.max(state.committed_seq);
            state.committed_seq = committed_seq;
            self.truncate(&mut state);
            let term = state.term;
            drop(state);
            self.apply_and_finish(&pending);
            self.broadcast(LogMessage::Commit { term, seq });
        }
    }

    fn handle_commit(&self, term: u64, seq: i64) {
        let mut state = self.state.lock().expect("state lock poisoned");
        if term < state.term || state.role == Role::Leader {
            return;
        }
        self.apply_up_to(&mut state, seq);
    }

    /// Applies every buffered tail entry up to and including `target_seq`, in
    /// order, advancing `committed_seq`. Called by followers on `Heartbeat`
    /// or `Commit`. Stops (without advancing past the failed entry) the
    /// moment local apply disagrees with the leader's committed outcome.
    fn apply_up_to(&self, state: &mut State, target_seq: i64) {
        if self.diverged.load(Ordering::SeqCst) {
            return;
        }
        while state.committed_seq < target_seq {
            let next = state.committed_seq + 1;
            let Some(entry) = state.tail.get(&next) else {
                // Entry hasn't arrived yet; it'll be applied on the next
                // heartbeat/commit once the gap fills in.
                break;
            };
            let sink = self.session_sink.lock().expect("session sink lock poisoned").clone();
            if let Err(err) = dispatch(&entry.command, self.storage.as_ref(), &self.status, sink.as_deref()) {
                self.diverge(next, &err);
                return;
            }
            state.tail.remove(&next);
            state.committed_seq = next;
        }
        self.truncate(state);
    }

    /// The leader's own first application of an entry it just brought to
    /// quorum. Unlike [`Self::apply_up_to`] (a follower replaying an entry
    /// the leader already applied successfully), a failure here is an
    /// ordinary outcome of the command itself (e.g. a racing `Conflict`)
    /// and is returned to the proposer rather than treated as divergence.
    fn apply_and_finish(&self, pending: &Arc<PendingCommit>) {
        let sink = self.session_sink.lock().expect("session sink lock poisoned").clone();
        let result = dispatch(&pending.entry.command, self.storage.as_ref(), &self.status, sink.as_deref());
        *pending.outcome.lock().expect("outcome lock poisoned") = Some(result);
        self.condvar.notify_all();
    }

    /// Drops committed tail entries once they exceed both retention bounds.
    /// Called after every commit advance; cheap no-op while the log is
    /// still within `max_log_count`.
    fn truncate(&self, state: &mut State) {
        let mut committed_count = state.tail.keys().filter(|&&seq| seq <= state.committed_seq).count() as u32;
        if committed_count <= self.retention.max_log_count {
            return;
        }
        let mut committed_seqs: Vec<i64> = state.tail.keys().copied().filter(|&seq| seq <= state.committed_seq).collect();
        committed_seqs.sort_unstable();
        let now = now_millis();
        for seq in committed_seqs {
            if committed_count <= self.retention.max_log_count {
                break;
            }
            let Some(entry) = state.tail.get(&seq) else { continue };
            if now.saturating_sub(entry.committed_millis) < self.retention.min_log_age_millis {
                break;
            }
            state.tail.remove(&seq);
            state.pending.remove(&seq);
            committed_count -= 1;
        }
    }

    fn broadcast(&self, message: LogMessage) {
        for peer in &self.peers {
            self.transport.send(*peer, message.clone());
        }
    }

    /// Submits a command for replication. Blocks the calling thread until
    /// the entry commits locally or `timeout` elapses.
    pub fn propose(&self, command: Command, timeout: Duration) -> Result<ExecutionOutcome, DogmaError> {
        validate_command(&command)?;
        if self.diverged.load(Ordering::SeqCst) {
            return Err(DogmaError::ReplicationDivergence);
        }
        if !self.status.started() {
            return Err(DogmaError::ReadOnly);
        }
        let (to_run, _forced) = command.clone().unwrap_force_push();
        let administrative = command.is_administrative();
        if !self.status.is_writable() && !administrative {
            return Err(DogmaError::ReadOnly);
        }

        let pending = {
            let mut state = self.state.lock().expect("state lock poisoned");
            if state.role != Role::Leader {
                let hint = state.leader.map(|id| id.to_string());
                return Err(DogmaError::NotLeader { leader_hint: hint });
            }
            let seq = state.next_seq;
            state.next_seq += 1;
            let committed_millis = to_run.header().timestamp;
            let entry = ReplicationLogEntry::new(seq, committed_millis, to_run);
            let pending = Arc::new(PendingCommit {
                entry: entry.clone(),
                acks: Mutex::new(HashSet::from([self.id])),
                outcome: Mutex::new(None),
            });
            state.tail.insert(seq, entry.clone());
            state.pending.insert(seq, pending.clone());
            let term = state.term;
            if self.quorum_size <= 1 {
                state.committed_seq = seq;
                self.truncate(&mut state);
                drop(state);
                self.apply_and_finish(&pending);
                self.broadcast(LogMessage::Commit { term, seq });
            } else {
                drop(state);
                self.broadcast(LogMessage::Propose { term, entry });
            }
            pending
        };

        let deadline = Instant::now() + timeout;
        let mut outcome = pending.outcome.lock().expect("outcome lock poisoned");
        while outcome.is_none() {
            let now = Instant::now();
            if now >= deadline {
                return Err(DogmaError::ReplicationTimeout);
            }
            let (guard, timed_out) = self
                .condvar
                .wait_timeout(outcome, deadline - now)
                .expect("outcome lock poisoned while waiting");
            outcome = guard;
            if timed_out.timed_out() && outcome.is_none() {
                return Err(DogmaError::ReplicationTimeout);
            }
        }
        debug!(replica = self.id, "proposal committed");
        outcome.take().expect("checked above")
    }

    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(handle) = self.worker.lock().expect("worker slot poisoned").take() {
            let _ = handle.join();
        }
    }
}

impl Drop for QuorumLog {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// The election/heartbeat/apply loop body, run on a dedicated thread. Exits
/// as soon as `shutdown` is set or every external `Arc<QuorumLog>` has been
/// dropped (`weak.upgrade()` then returns `None`).
fn run(weak: &Weak<QuorumLog>) {
    loop {
        let Some(log) = weak.upgrade() else { return };
        if log.shutdown.load(Ordering::SeqCst) {
            return;
        }
        while let Some((from, message)) = log.transport.try_recv() {
            log.handle_message(from, message);
        }
        log.tick();
        drop(log);
        thread::sleep(TICK);
    }
}

fn random_election_timeout() -> Duration {
    let millis = rand::thread_rng().gen_range(ELECTION_TIMEOUT_MIN.as_millis()..=ELECTION_TIMEOUT_MAX.as_millis());
    Duration::from_millis(millis as u64)
}

#[cfg(test)]
mod tests {
    use dogma_kernel::InMemoryStorage;
    use dogma_status::StatusManager;
    use dogma_types::{Author, CommandHeader};

    use super::*;
    use crate::transport::NoOpTransport;

    #[tokio::test]
    async fn follower_apply_failure_diverges_and_goes_read_only() {
        let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::new());
        let status = Arc::new(StatusManager::new());
        status.start().await;
        let log = QuorumLog::start(1, vec![2, 3], Arc::new(NoOpTransport), storage, status.clone());

        // A command the leader supposedly already committed, but which
        // can't actually apply here (targets a repository that doesn't
        // exist on this replica) — simulating state that has already
        // drifted from the leader.
        let bad_command = Command::RemoveRepository {
            header: CommandHeader::new(1, Author::system()),
            project_name: "nonexistent".to_owned(),
            repository_name: "nope".to_owned(),
        };
        {
            let mut state = log.state.lock().expect("state lock poisoned");
            state.tail.insert(1, ReplicationLogEntry::new(1, 1, bad_command));
            log.apply_up_to(&mut state, 1);
        }

        assert!(log.is_diverged());
        assert!(!status.is_writable());

        let result = log.propose(
            Command::CreateProject { header: CommandHeader::new(2, Author::system()), project_name: "x".to_owned() },
            Duration::from_millis(50),
        );
        assert_eq!(result, Err(DogmaError::ReplicationDivergence));

        log.shutdown();
    }

    #[tokio::test]
    async fn truncation_drops_committed_entries_beyond_max_log_count() {
        let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::new());
        let status = Arc::new(StatusManager::new());
        status.start().await;
        let retention = RetentionPolicy { max_log_count: 1, min_log_age_millis: 0 };
        let log = QuorumLog::start_with_retention(1, vec![], Arc::new(NoOpTransport), storage, status, retention);

        for _ in 0..500 {
            if log.is_leader() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(log.is_leader(), "a lone replica should elect itself leader");

        for i in 0..5 {
            log.propose(
                Command::CreateProject {
                    header: CommandHeader::new(i, Author::system()),
                    project_name: format!("p{i}"),
                },
                Duration::from_millis(200),
            )
            .unwrap();
        }

        let tail_len = log.state.lock().expect("state lock poisoned").tail.len();
        assert!(tail_len <= 1, "expected truncation to keep at most max_log_count committed entries, got {tail_len}");

        log.shutdown();
    }
}
