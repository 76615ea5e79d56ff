//! The seam standing in for actual Git plumbing (cloning, fetching, pushing
//! over SSH/HTTPS). Git internals are out of scope (§1); this crate only
//! owns scheduling, bounds enforcement, and routing pulled content through
//! the normal command pipeline.

use dogma_types::{DogmaError, Mirror};

/// One file's content as produced by a remote pull, or consumed by a local
/// push.
pub type MirroredFile = (String, Vec<u8>);

/// Fetches from / pushes to the remote side of a mirror. A real
/// implementation would shell out to `git` or use a pure-Rust Git library;
/// this crate only defines where that plugs in.
pub trait GitSync: Send + Sync {
    /// Fetches the remote's current tree for a `RemoteToLocal` mirror.
    fn pull_remote(&self, mirror: &Mirror) -> Result<Vec<MirroredFile>, DogmaError>;

    /// Pushes a `LocalToRemote` mirror's tree to the remote.
    fn push_local(&self, mirror: &Mirror, files: &[MirroredFile]) -> Result<(), DogmaError>;
}

/// A fixed in-memory stand-in used by tests: `pull_remote` returns whatever
/// was registered for the mirror's id, `push_local` records what it was
/// asked to push.
#[derive(Default)]
pub struct FakeGitSync {
    remotes: std::sync::Mutex<std::collections::HashMap<String, Vec<MirroredFile>>>,
    pushed: std::sync::Mutex<std::collections::HashMap<String, Vec<MirroredFile>>>,
}

impl FakeGitSync {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_remote(&self, mirror_id: &str, files: Vec<MirroredFile>) {
        self.remotes.lock().expect("remotes lock poisoned").insert(mirror_id.to_owned(), files);
    }

    #[must_use]
    pub fn pushed(&self, mirror_id: &str) -> Option<Vec<MirroredFile>> {
        self.pushed.lock().expect("pushed lock poisoned").get(mirror_id).cloned()
    }
}

impl GitSync for FakeGitSync {
    fn pull_remote(&self, mirror: &Mirror) -> Result<Vec<MirroredFile>, DogmaError> {
        Ok(self.remotes.lock().expect("remotes lock poisoned").get(&mirror.id).cloned().unwrap_or_default())
    }

    fn push_local(&self, mirror: &Mirror, files: &[MirroredFile]) -> Result<(), DogmaError> {
        self.pushed.lock().expect("pushed lock poisoned").insert(mirror.id.clone(), files.to_vec());
        Ok(())
    }
}

/// The production default until a real `GitSync` is wired in: rejects every
/// pull and push with a clear error instead of silently doing nothing or
/// pretending to succeed. Fine to hold when `mirroringEnabled = false` or no
/// mirrors are defined, since neither method is ever called in that case.
#[derive(Debug, Default)]
pub struct NullGitSync;

impl NullGitSync {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl GitSync for NullGitSync {
    fn pull_remote(&self, mirror: &Mirror) -> Result<Vec<MirroredFile>, DogmaError> {
        Err(DogmaError::StorageIo(format!(
            "mirror {}: no GitSync implementation is configured for this server",
            mirror.id
        )))
    }

    fn push_local(&self, mirror: &Mirror, _files: &[MirroredFile]) -> Result<(), DogmaError> {
        Err(DogmaError::StorageIo(format!(
            "mirror {}: no GitSync implementation is configured for this server",
            mirror.id
        )))
    }
}
