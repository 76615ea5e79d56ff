//! Cron-driven per-mirror scheduling (C7).

use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use cron::Schedule;
use dogma_replication::ReplicatedExecutor;
use dogma_types::{Author, Change, Command, CommandHeader, DogmaError, Markup, Mirror, MirrorDirection, Revision};
use rand::Rng;
use tracing::{info, warn};

use crate::gitsync::GitSync;

/// §6 default: a remote tree larger than this is rejected rather than
/// partially applied.
pub const DEFAULT_MAX_FILES_PER_MIRROR: usize = 8192;
/// §6 default: 32 MiB.
pub const DEFAULT_MAX_BYTES_PER_MIRROR: u64 = 32 * 1024 * 1024;
/// Upper bound on the random jitter added to each mirror's computed fire
/// time, so a fleet of mirrors on the same cron expression doesn't all pull
/// the remote at the exact same instant.
const MAX_JITTER: Duration = Duration::from_secs(60);
const SHUTDOWN_POLL: Duration = Duration::from_secs(1);

struct ScheduledMirror {
    mirror: Mirror,
    schedule: Schedule,
}

/// Runs every configured mirror on its own cron schedule, only acting while
/// this replica is the leader (§4.7).
pub struct MirrorScheduler {
    mirrors: Vec<ScheduledMirror>,
    executor: Arc<ReplicatedExecutor>,
    storage: Arc<dyn dogma_kernel::Storage>,
    git: Arc<dyn GitSync>,
    max_files: usize,
    max_bytes: u64,
    shutdown: Arc<AtomicBool>,
}

impl MirrorScheduler {
    /// Parses each mirror's cron schedule up front so a malformed one fails
    /// fast at startup instead of silently never firing.
    pub fn new(
        mirrors: Vec<Mirror>,
        executor: Arc<ReplicatedExecutor>,
        storage: Arc<dyn dogma_kernel::Storage>,
        git: Arc<dyn GitSync>,
    ) -> Result<Self, cron::error::Error> {
        let mirrors = mirrors
            .into_iter()
            .map(|mirror| Schedule::from_str(&mirror.schedule).map(|schedule| ScheduledMirror { mirror, schedule }))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            mirrors,
            executor,
            storage,
            git,
            max_files: DEFAULT_MAX_FILES_PER_MIRROR,
            max_bytes: DEFAULT_MAX_BYTES_PER_MIRROR,
            shutdown: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        self.shutdown.clone()
    }

    /// Runs every enabled mirror's loop concurrently until shut down.
    pub async fn run(self: Arc<Self>) {
        let mut tasks = Vec::new();
        for idx in 0..self.mirrors.len() {
            if !self.mirrors[idx].mirror.enabled {
                continue;
            }
            let scheduler = self.clone();
            tasks.push(tokio::spawn(async move { scheduler.run_one(idx).await }));
        }
        for task in tasks {
            let _ = task.await;
        }
    }

    async fn run_one(&self, idx: usize) {
        let scheduled = &self.mirrors[idx];
        let mut upcoming = scheduled.schedule.upcoming(Utc);
        loop {
            let Some(next_fire) = upcoming.next() else { return };
            let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..=MAX_JITTER.as_millis() as u64));
            loop {
                if self.shutdown.load(Ordering::SeqCst) {
                    return;
                }
                let remaining = (next_fire - Utc::now()).to_std().unwrap_or(Duration::ZERO) + jitter;
                if remaining <= SHUTDOWN_POLL {
                    tokio::time::sleep(remaining).await;
                    break;
                }
                tokio::time::sleep(SHUTDOWN_POLL).await;
            }
            self.run_mirror(&scheduled.mirror).await;
        }
    }

    pub(crate) async fn run_mirror(&self, mirror: &Mirror) {
        if !self.executor.is_leader() {
            return;
        }
        let result = match mirror.direction {
            MirrorDirection::RemoteToLocal => self.pull_into_repository(mirror).await,
            MirrorDirection::LocalToRemote => self.push_from_repository(mirror),
        };
        if let Err(err) = result {
            warn!(mirror = mirror.id, error = %err, "mirror run failed");
        }
    }

    async fn pull_into_repository(&self, mirror: &Mirror) -> Result<(), DogmaError> {
        let files = self.git.pull_remote(mirror)?;
        if files.len() > self.max_files {
            return Err(DogmaError::InvalidChange(format!(
                "mirror {} exceeds max file count ({} > {})",
                mirror.id,
                files.len(),
                self.max_files
            )));
        }
        let total_bytes: u64 = files.iter().map(|(_, content)| content.len() as u64).sum();
        if total_bytes > self.max_bytes {
            return Err(DogmaError::InvalidChange(format!(
                "mirror {} exceeds max byte count ({} > {})",
                mirror.id, total_bytes, self.max_bytes
            )));
        }

        let changes: Vec<Change> = files
            .into_iter()
            .map(|(path, content)| Change::UpsertText { path, content: String::from_utf8_lossy(&content).into_owned() })
            .collect();
        if changes.is_empty() {
            return Ok(());
        }

        let header = CommandHeader::new(Utc::now().timestamp_millis(), Author::system());
        let command = Command::NormalizingPush {
            header,
            project_name: mirror.project_name.clone(),
            repository_name: mirror.local_repo.clone(),
            base_revision: Revision::HEAD,
            summary: format!("Mirror {} from {}", mirror.id, mirror.remote_url),
            detail: String::new(),
            markup: Markup::Plaintext,
            changes,
        };
        self.executor.execute(command).await?;
        info!(mirror = mirror.id, "pulled remote into repository");
        Ok(())
    }

    fn push_from_repository(&self, mirror: &Mirror) -> Result<(), DogmaError> {
        let head = self.storage.head(&mirror.project_name, &mirror.local_repo)?;
        let paths = self.storage.list(&mirror.project_name, &mirror.local_repo, head, &mirror.local_path)?;
        if paths.len() > self.max_files {
            return Err(DogmaError::InvalidChange(format!(
                "mirror {} exceeds max file count ({} > {})",
                mirror.id,
                paths.len(),
                self.max_files
            )));
        }
        let mut files = Vec::with_capacity(paths.len());
        let mut total_bytes: u64 = 0;
        for path in paths {
            if let Some(content) = self.storage.get(&mirror.project_name, &mirror.local_repo, head, &path)? {
                total_bytes += content.len() as u64;
                files.push((path, content));
            }
        }
        if total_bytes > self.max_bytes {
            return Err(DogmaError::InvalidChange(format!(
                "mirror {} exceeds max byte count ({} > {})",
                mirror.id, total_bytes, self.max_bytes
            )));
        }
        self.git.push_local(mirror, &files)?;
        info!(mirror = mirror.id, "pushed repository to remote");
        Ok(())
    }
}

