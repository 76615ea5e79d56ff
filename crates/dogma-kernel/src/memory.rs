//! An in-memory [`Storage`] implementation used as the reference
//! implementation in this workspace's tests. The real, Git-backed store is
//! out of scope (§1); this type exists only to exercise the contract.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use dogma_types::{
    Author, Change, ChangeError, Command, CommandHeader, CommitResult, ContentTransformerRef, DogmaError, Markup,
    Revision,
};

use crate::fingerprint::fingerprint;
use crate::patch::{apply_json_patch, apply_text_patch};
use crate::storage::Storage;

type Snapshot = BTreeMap<String, Vec<u8>>;

#[derive(Debug, Default)]
struct RepoState {
    removed: bool,
    commits: Vec<Snapshot>,
    /// Fingerprints of pushes already applied, so a retry that arrives
    /// after its own commit landed (e.g. after a `ReplicationTimeout`)
    /// is recognized instead of rejected as a stale-base `Conflict`.
    applied: HashMap<blake3::Hash, Revision>,
}

impl RepoState {
    fn head(&self) -> Revision {
        Revision::new(self.commits.len() as i64)
    }

    fn snapshot_at(&self, revision: Revision) -> Result<&Snapshot, DogmaError> {
        let idx = revision.major();
        if idx < 1 || idx as usize > self.commits.len() {
            return Err(DogmaError::NotFound(format!("revision {revision}")));
        }
        Ok(&self.commits[(idx - 1) as usize])
    }
}

#[derive(Debug, Default)]
struct ProjectState {
    removed: bool,
    repos: BTreeMap<String, RepoState>,
}

/// A `BTreeMap`-backed reference [`Storage`] implementation: no persistence,
/// no concurrency control beyond a single mutex — correctness reference,
/// not a performance target.
#[derive(Debug, Default)]
pub struct InMemoryStorage {
    projects: Mutex<BTreeMap<String, ProjectState>>,
}

impl InMemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn with_repo<T>(
        &self,
        project: &str,
        repo: &str,
        f: impl FnOnce(&mut RepoState) -> Result<T, DogmaError>,
    ) -> Result<T, DogmaError> {
        let mut projects = self.projects.lock().expect("storage mutex poisoned");
        let proj = projects
            .get_mut(project)
            .ok_or_else(|| DogmaError::NotFound(format!("project {project}")))?;
        if proj.removed {
            return Err(DogmaError::NotFound(format!("project {project}")));
        }
        let repo = proj
            .repos
            .get_mut(repo)
            .ok_or_else(|| DogmaError::NotFound(format!("repository {project}/{repo}")))?;
        f(repo)
    }

    fn apply_changes(
        snapshot: &Snapshot,
        changes: Vec<Change>,
    ) -> Result<(Snapshot, Vec<Change>), DogmaError> {
        let mut next = snapshot.clone();
        let mut normalized = Vec::new();

        for change in changes {
            let change = change.validate().map_err(change_error_to_dogma)?;
            match change {
                Change::UpsertJson { path, content } => {
                    let bytes = serde_json::to_vec(&content)
                        .map_err(|e| DogmaError::InvalidChange(e.to_string()))?;
                    if next.get(&path) != Some(&bytes) {
                        next.insert(path.clone(), bytes);
                        normalized.push(Change::UpsertJson { path, content });
                    }
                }
                Change::UpsertYaml { path, content } => {
                    let bytes = content.clone().into_bytes();
                    if next.get(&path) != Some(&bytes) {
                        next.insert(path.clone(), bytes);
                        normalized.push(Change::UpsertYaml { path, content });
                    }
                }
                Change::UpsertText { path, content } => {
                    let bytes = content.clone().into_bytes();
                    if next.get(&path) != Some(&bytes) {
                        next.insert(path.clone(), bytes);
                        normalized.push(Change::UpsertText { path, content });
                    }
                }
                Change::Remove { path } => {
                    let prefix = format!("{path}/");
                    let matched: Vec<String> = next
                        .keys()
                        .filter(|k| **k == path || k.starts_with(&prefix))
                        .cloned()
                        .collect();
                    if matched.is_empty() {
                        return Err(DogmaError::NotFound(path));
                    }
                    for key in matched {
                        next.remove(&key);
                    }
                    normalized.push(Change::Remove { path });
                }
                Change::Rename { path, new_path } => {
                    if next.contains_key(&new_path) {
                        return Err(DogmaError::Exists(new_path));
                    }
                    let prefix = format!("{path}/");
                    let matched: Vec<String> = next
                        .keys()
                        .filter(|k| **k == path || k.starts_with(&prefix))
                        .cloned()
                        .collect();
                    if matched.is_empty() {
                        return Err(DogmaError::NotFound(path));
                    }
                    for key in matched {
                        let renamed = format!("{new_path}{}", &key[path.len()..]);
                        if let Some(value) = next.remove(&key) {
                            next.insert(renamed, value);
                        }
                    }
                    normalized.push(Change::Rename { path, new_path });
                }
                Change::ApplyJsonPatch { path, patch } => {
                    let existing = next
                        .get(&path)
                        .ok_or_else(|| DogmaError::NotFound(path.clone()))?;
                    let doc: serde_json::Value = serde_json::from_slice(existing)
                        .map_err(|e| DogmaError::InvalidChange(e.to_string()))?;
                    let patched = apply_json_patch(&doc, &patch)?;
                    let bytes = serde_json::to_vec(&patched)
                        .map_err(|e| DogmaError::InvalidChange(e.to_string()))?;
                    next.insert(path.clone(), bytes);
                    normalized.push(Change::UpsertJson { path, content: patched });
                }
                Change::ApplyTextPatch { path, patch } => {
                    let existing = next
                        .get(&path)
                        .ok_or_else(|| DogmaError::NotFound(path.clone()))?;
                    let source = String::from_utf8(existing.clone())
                        .map_err(|e| DogmaError::InvalidChange(e.to_string()))?;
                    let patched = apply_text_patch(&source, &patch)?;
                    next.insert(path.clone(), patched.clone().into_bytes());
                    normalized.push(Change::UpsertText { path, content: patched });
                }
            }
        }
        Ok((next, normalized))
    }
}

fn change_error_to_dogma(e: ChangeError) -> DogmaError {
    match e {
        ChangeError::InvalidPath(p) => DogmaError::InvalidChange(format!("invalid path: {p}")),
        ChangeError::RenameTargetExists(p) => DogmaError::Exists(p),
    }
}

impl Storage for InMemoryStorage {
    fn create_project(&self, name: &str, _timestamp_millis: i64, _author: &Author) -> Result<(), DogmaError> {
        let mut projects = self.projects.lock().expect("storage mutex poisoned");
        if projects.contains_key(name) {
            return Err(DogmaError::Exists(name.to_owned()));
        }
        projects.insert(name.to_owned(), ProjectState::default());
        Ok(())
    }

    fn remove_project(&self, name: &str) -> Result<(), DogmaError> {
        let mut projects = self.projects.lock().expect("storage mutex poisoned");
        let proj = projects
            .get_mut(name)
            .ok_or_else(|| DogmaError::NotFound(name.to_owned()))?;
        if proj.removed {
            return Err(DogmaError::AlreadyRemoved(name.to_owned()));
        }
        proj.removed = true;
        for repo in proj.repos.values_mut() {
            repo.removed = true;
        }
        Ok(())
    }

    fn unremove_project(&self, name: &str) -> Result<(), DogmaError> {
        let mut projects = self.projects.lock().expect("storage mutex poisoned");
        let proj = projects
            .get_mut(name)
            .ok_or_else(|| DogmaError::NotFound(name.to_owned()))?;
        if !proj.removed {
            return Err(DogmaError::InvalidCommand(format!("project {name} is not removed")));
        }
        proj.removed = false;
        Ok(())
    }

    fn purge_project(&self, name: &str) -> Result<(), DogmaError> {
        let mut projects = self.projects.lock().expect("storage mutex poisoned");
        let proj = projects
            .get(name)
            .ok_or_else(|| DogmaError::NotFound(name.to_owned()))?;
        if !proj.removed {
            return Err(DogmaError::StillReferenced(name.to_owned()));
        }
        projects.remove(name);
        Ok(())
    }

    fn create_repository(
        &self,
        project: &str,
        repo: &str,
        _timestamp_millis: i64,
        _author: &Author,
    ) -> Result<(), DogmaError> {
        let mut projects = self.projects.lock().expect("storage mutex poisoned");
        let proj = projects
            .get_mut(project)
            .ok_or_else(|| DogmaError::ParentMissing(project.to_owned()))?;
        if proj.removed {
            return Err(DogmaError::ParentMissing(project.to_owned()));
        }
        if proj.repos.contains_key(repo) {
            return Err(DogmaError::Exists(format!("{project}/{repo}")));
        }
        proj.repos.insert(repo.to_owned(), RepoState { removed: false, commits: vec![BTreeMap::new()] });
        Ok(())
    }

    fn remove_repository(&self, project: &str, repo: &str) -> Result<(), DogmaError> {
        self.with_repo(project, repo, |r| {
            if r.removed {
                return Err(DogmaError::AlreadyRemoved(format!("{project}/{repo}")));
            }
            r.removed = true;
            Ok(())
        })
    }

    fn unremove_repository(&self, project: &str, repo: &str) -> Result<(), DogmaError> {
        self.with_repo(project, repo, |r| {
            if !r.removed {
                return Err(DogmaError::InvalidCommand(format!("{project}/{repo} is not removed")));
            }
            r.removed = false;
            Ok(())
        })
    }

    fn purge_repository(&self, project: &str, repo: &str) -> Result<(), DogmaError> {
        let mut projects = self.projects.lock().expect("storage mutex poisoned");
        let proj = projects
            .get_mut(project)
            .ok_or_else(|| DogmaError::NotFound(project.to_owned()))?;
        let removed = proj
            .repos
            .get(repo)
            .ok_or_else(|| DogmaError::NotFound(format!("{project}/{repo}")))?
            .removed;
        if !removed {
            return Err(DogmaError::StillReferenced(format!("{project}/{repo}")));
        }
        proj.repos.remove(repo);
        Ok(())
    }

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
    ) -> Result<CommitResult, DogmaError> {
        let push_fingerprint = fingerprint(&Command::NormalizingPush {
            header: CommandHeader::new(timestamp_millis, author.clone()),
            project_name: project.to_owned(),
            repository_name: repo.to_owned(),
            base_revision: base,
            summary: summary.to_owned(),
            detail: detail.to_owned(),
            markup,
            changes: changes.clone(),
        });
        self.with_repo(project, repo, |r| {
            if let Some(&previous) = r.applied.get(&push_fingerprint) {
                return Ok(CommitResult::redundant(previous));
            }
            let head = r.head();
            let base = base.normalize(head).ok_or_else(|| DogmaError::NotFound(format!("revision {base}")))?;
            if base != head {
                return Err(DogmaError::Conflict);
            }
            let current = r.snapshot_at(head)?;
            let (next, normalized) = Self::apply_changes(current, changes)?;
            if normalized.is_empty() {
                return Ok(CommitResult::redundant(head));
            }
            r.commits.push(next);
            let new_head = r.head();
            r.applied.insert(push_fingerprint, new_head);
            Ok(CommitResult::new(new_head, normalized))
        })
    }

    fn preview_diff(
        &self,
        project: &str,
        repo: &str,
        base: Revision,
        changes: &[Change],
    ) -> Result<Vec<Change>, DogmaError> {
        self.with_repo(project, repo, |r| {
            let head = r.head();
            let base = base.normalize(head).ok_or_else(|| DogmaError::NotFound(format!("revision {base}")))?;
            let snapshot = r.snapshot_at(base)?;
            let (_next, normalized) = Self::apply_changes(snapshot, changes.to_vec())?;
            Ok(normalized)
        })
    }

    fn apply_transform(
        &self,
        project: &str,
        repo: &str,
        base: Revision,
        transformer: &ContentTransformerRef,
        _timestamp_millis: i64,
        _author: &Author,
        _summary: &str,
        _detail: &str,
        _markup: Markup,
    ) -> Result<CommitResult, DogmaError> {
        self.with_repo(project, repo, |r| {
            let head = r.head();
            let base = base.normalize(head).ok_or_else(|| DogmaError::NotFound(format!("revision {base}")))?;
            if base != head {
                return Err(DogmaError::Conflict);
            }
            // The transformer registry is the storage layer's concern and
            // out of scope; only the built-in identity transformer (used by
            // tests) is recognized here.
            if transformer.id == "identity" {
                Ok(CommitResult::redundant(head))
            } else {
                Err(DogmaError::NotFound(format!("transformer {}", transformer.id)))
            }
        })
    }

    fn normalize_revision(&self, project: &str, repo: &str, revision: Revision) -> Result<Revision, DogmaError> {
        self.with_repo(project, repo, |r| {
            revision.normalize(r.head()).ok_or_else(|| DogmaError::NotFound(format!("revision {revision}")))
        })
    }

    fn create_rolling_repository(
        &self,
        project: &str,
        repo: &str,
        _initial_revision: Revision,
        _min_retention_commits: u32,
        _min_retention_days: u32,
    ) -> Result<(), DogmaError> {
        self.create_repository(project, repo, 0, &Author::system())
    }

    fn gc(&self, project: &str, repo: &str) -> Result<Revision, DogmaError> {
        self.with_repo(project, repo, |r| Ok(r.head()))
    }

    fn get(&self, project: &str, repo: &str, revision: Revision, path: &str) -> Result<Option<Vec<u8>>, DogmaError> {
        self.with_repo(project, repo, |r| {
            let revision = revision.normalize(r.head()).ok_or_else(|| DogmaError::NotFound(format!("revision {revision}")))?;
            Ok(r.snapshot_at(revision)?.get(path).cloned())
        })
    }

    fn list(&self, project: &str, repo: &str, revision: Revision, path_prefix: &str) -> Result<Vec<String>, DogmaError> {
        self.with_repo(project, repo, |r| {
            let revision = revision.normalize(r.head()).ok_or_else(|| DogmaError::NotFound(format!("revision {revision}")))?;
            Ok(r.snapshot_at(revision)?
                .keys()
                .filter(|k| k.starts_with(path_prefix))
                .cloned()
                .collect())
        })
    }

    fn head(&self, project: &str, repo: &str) -> Result<Revision, DogmaError> {
        self.with_repo(project, repo, |r| Ok(r.head()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dogma_types::Author;

    fn harness() -> InMemoryStorage {
        let storage = InMemoryStorage::new();
        storage.create_project("foo", 0, &Author::system()).unwrap();
        storage.create_repository("foo", "bar", 0, &Author::system()).unwrap();
        storage
    }

    #[test]
    fn create_push_read_round_trip() {
        let storage = harness();
        let result = storage
            .commit(
                "foo",
                "bar",
                Revision::new(1),
                1002,
                &Author::system(),
                "s",
                "",
                Markup::Plaintext,
                vec![Change::UpsertText { path: "/x.txt".to_owned(), content: "hi\n".to_owned() }],
            )
            .unwrap();
        assert_eq!(result.revision, Revision::new(2));
        let content = storage.get("foo", "bar", Revision::new(2), "/x.txt").unwrap();
        assert_eq!(content, Some(b"hi\n".to_vec()));
    }

    #[test]
    fn stale_base_revision_conflicts() {
        let storage = harness();
        storage
            .commit(
                "foo",
                "bar",
                Revision::new(1),
                1000,
                &Author::system(),
                "s",
                "",
                Markup::Plaintext,
                vec![Change::UpsertText { path: "/x.txt".to_owned(), content: "hi".to_owned() }],
            )
            .unwrap();

        let result = storage.commit(
            "foo",
            "bar",
            Revision::new(1),
            1001,
            &Author::system(),
            "s",
            "",
            Markup::Plaintext,
            vec![Change::UpsertText { path: "/y.txt".to_owned(), content: "bye".to_owned() }],
        );
        assert!(matches!(result, Err(DogmaError::Conflict)));
    }

    #[test]
    fn redundant_push_returns_unchanged_head() {
        let storage = harness();
        let head = storage.head("foo", "bar").unwrap();
        let result = storage
            .commit("foo", "bar", Revision::HEAD, 1000, &Author::system(), "s", "", Markup::Plaintext, vec![])
            .unwrap();
        assert_eq!(result.revision, head);
        assert!(result.changes.is_empty());
    }

    #[test]
    fn replayed_push_collapses_to_redundant_instead_of_conflict() {
        let storage = harness();
        let change = vec![Change::UpsertText { path: "/x.txt".to_owned(), content: "hi".to_owned() }];
        let first = storage
            .commit("foo", "bar", Revision::new(1), 1000, &Author::system(), "s", "", Markup::Plaintext, change.clone())
            .unwrap();
        assert_eq!(first.revision, Revision::new(2));

        // Same command retried with its now-stale `baseRevision`, as happens
        // after a client times out waiting for quorum but the push already
        // landed.
        let retry = storage
            .commit("foo", "bar", Revision::new(1), 1000, &Author::system(), "s", "", Markup::Plaintext, change)
            .unwrap();
        assert_eq!(retry.revision, Revision::new(2));
        assert!(retry.changes.is_empty());
    }

    #[test]
    fn purge_requires_prior_removal() {
        let storage = harness();
        assert!(matches!(storage.purge_project("foo"), Err(DogmaError::StillReferenced(_))));
        storage.remove_project("foo").unwrap();
        storage.purge_project("foo").unwrap();
    }
}
