//! The storage interface (C2): the opaque contract the executor dispatches
//! onto. The Git-backed on-disk implementation is out of scope; this crate
//! only defines the trait and ships an in-memory reference implementation
//! ([`crate::memory::InMemoryStorage`]) used throughout the workspace's
//! tests.

use dogma_types::{
    Author, Change, CommitResult, ContentTransformerRef, DogmaError, Markup, Revision,
};

/// Operations consumed by the local executor (C4). All methods are
/// synchronous: callers invoke them from a dedicated worker thread, never
/// from the non-blocking accept loop (§5).
///
/// Ordering: `commit`, `apply_transform`, and lifecycle operations on the
/// same repository are serialized by the storage; concurrent calls are not
/// supported and must be prevented by the caller (C4 enforces this with a
/// per-repository lock).
pub trait Storage: Send + Sync {
    fn create_project(&self, name: &str, timestamp_millis: i64, author: &Author) -> Result<(), DogmaError>;
    fn remove_project(&self, name: &str) -> Result<(), DogmaError>;
    fn unremove_project(&self, name: &str) -> Result<(), DogmaError>;
    fn purge_project(&self, name: &str) -> Result<(), DogmaError>;

    fn create_repository(
        &self,
        project: &str,
        repo: &str,
        timestamp_millis: i64,
        author: &Author,
    ) -> Result<(), DogmaError>;
    fn remove_repository(&self, project: &str, repo: &str) -> Result<(), DogmaError>;
    fn unremove_repository(&self, project: &str, repo: &str) -> Result<(), DogmaError>;
    fn purge_repository(&self, project: &str, repo: &str) -> Result<(), DogmaError>;

    #[allow(clippy::too_many_arguments)]
    fn commit(
        &self,
        project: &str,
        repo: &str,
        base: Revision,
        timestamp_millis: i64,
        author: &Author,
        summary: &str,
        detail: &str,
        markup: Markup,
        changes: Vec<Change>,
    ) -> Result<CommitResult, DogmaError>;

    fn preview_diff(
        &self,
        project: &str,
        repo: &str,
        base: Revision,
        changes: &[Change],
    ) -> Result<Vec<Change>, DogmaError>;

    #[allow(clippy::too_many_arguments)]
    fn apply_transform(
        &self,
        project: &str,
        repo: &str,
        base: Revision,
        transformer: &ContentTransformerRef,
        timestamp_millis: i64,
        author: &Author,
        summary: &str,
        detail: &str,
        markup: Markup,
    ) -> Result<CommitResult, DogmaError>;

    fn normalize_revision(&self, project: &str, repo: &str, revision: Revision) -> Result<Revision, DogmaError>;

    fn create_rolling_repository(
        &self,
        project: &str,
        repo: &str,
        initial_revision: Revision,
        min_retention_commits: u32,
        min_retention_days: u32,
    ) -> Result<(), DogmaError>;

    /// Runs garbage collection on a repository, returning its (unchanged)
    /// head revision once complete.
    fn gc(&self, project: &str, repo: &str) -> Result<Revision, DogmaError>;

    /// Reads a single file at a revision. `None` if the path does not
    /// exist at that revision.
    fn get(&self, project: &str, repo: &str, revision: Revision, path: &str) -> Result<Option<Vec<u8>>, DogmaError>;

    /// Lists file paths under `path_prefix` at a revision.
    fn list(&self, project: &str, repo: &str, revision: Revision, path_prefix: &str) -> Result<Vec<String>, DogmaError>;

    /// The current head revision of a repository.
    fn head(&self, project: &str, repo: &str) -> Result<Revision, DogmaError>;
}
