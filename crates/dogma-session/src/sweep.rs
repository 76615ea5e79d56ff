//! Cron-scheduled expiry sweep (§6, `authentication.sessionValidationSchedule`,
//! default `0 30 */4 ? * *`).
//!
//! Runs on every replica but only *acts* on the leader, mirroring the
//! leader-only execution rule mirroring (C7) also follows — a sweep issued
//! by a follower would just get rejected with `NotLeader` by the log.

use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use cron::Schedule;
use dogma_replication::ReplicatedExecutor;
use dogma_types::{Author, Command, CommandHeader};
use tracing::{info, warn};

use crate::store::SessionStore;

/// Default sweep schedule: every 4 hours, 30 minutes past the hour.
pub const DEFAULT_SWEEP_SCHEDULE: &str = "0 30 */4 ? * *";
const SHUTDOWN_POLL: Duration = Duration::from_secs(1);

/// Periodically scans the session cache for expired entries and retires
/// them through the replicated command pipeline.
pub struct SessionSweeper {
    store: Arc<SessionStore>,
    executor: Arc<ReplicatedExecutor>,
    schedule: Schedule,
    shutdown: Arc<AtomicBool>,
}

impl SessionSweeper {
    /// Parses `schedule` (standard cron syntax, seconds-first) and returns a
    /// sweeper ready to run. Invalid schedules are a configuration error, not
    /// a panic, since they come straight from `dogma-config`.
    pub fn new(store: Arc<SessionStore>, executor: Arc<ReplicatedExecutor>, schedule: &str) -> Result<Self, cron::error::Error> {
        Ok(Self { store, executor, schedule: Schedule::from_str(schedule)?, shutdown: Arc::new(AtomicBool::new(false)) })
    }

    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        self.shutdown.clone()
    }

    /// Drives the sweep loop until `shutdown` is set. Intended to be spawned
    /// as a long-lived tokio task.
    pub async fn run(self) {
        let mut upcoming = self.schedule.upcoming(Utc);
        loop {
            let Some(next_fire) = upcoming.next() else {
                warn!("cron schedule produced no further occurrences, stopping sweep");
                return;
            };
            loop {
                if self.shutdown.load(Ordering::SeqCst) {
                    return;
                }
                let remaining = (next_fire - Utc::now()).to_std().unwrap_or(Duration::ZERO);
                if remaining.is_zero() {
                    break;
                }
                tokio::time::sleep(remaining.min(SHUTDOWN_POLL)).await;
            }
            self.sweep_once().await;
        }
    }

    async fn sweep_once(&self) {
        if !self.executor.is_leader() {
            return;
        }
        let expired = self.store.expired_ids();
        if expired.is_empty() {
            return;
        }
        info!(count = expired.len(), "sweeping expired sessions");
        for session_id in expired {
            let header = CommandHeader::new(Utc::now().timestamp_millis(), Author::system());
            let command = Command::RemoveSession { header, session_id: session_id.clone() };
            if let Err(err) = self.executor.execute(command).await {
                warn!(session_id, error = %err, "failed to retire expired session");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dogma_executor::LocalExecutor;
    use dogma_kernel::{FixedClock, InMemoryStorage, Storage};
    use dogma_replication::StandaloneLog;
    use dogma_status::StatusManager;
    use dogma_types::SessionPayload;

    #[tokio::test]
    async fn sweep_retires_expired_sessions_on_the_leader() {
        let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::new());
        let status = Arc::new(StatusManager::new());
        status.start().await;
        let local = Arc::new(LocalExecutor::with_worker_count(storage.clone(), status.clone(), 1));
        let log = StandaloneLog::new(storage, status);
        let executor = Arc::new(ReplicatedExecutor::standalone(local, log));

        let clock = Arc::new(FixedClock::new(1000));
        let store = Arc::new(SessionStore::with_capacity(clock, 4, 1000));
        executor.set_session_sink(store.clone());
        store
            .create_session(SessionPayload {
                id: "stale".to_owned(),
                username: "a".to_owned(),
                creation_time: 0,
                expiration_time: 500,
                csrf_token: None,
            })
            .unwrap();

        let sweeper = SessionSweeper::new(store.clone(), executor, "* * * * * *").unwrap();
        sweeper.sweep_once().await;
        assert!(store.get("stale").is_none());
    }
}
