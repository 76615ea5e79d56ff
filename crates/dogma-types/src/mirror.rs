//! Mirror definitions (C7): periodic Git remote↔local sync jobs.

use serde::{Deserialize, Serialize};

/// The direction a mirror job copies content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MirrorDirection {
    LocalToRemote,
    RemoteToLocal,
}

/// A mirror definition, read from the meta-repository.
///
/// Created by a push to the meta-repo and never mutated in place — changing
/// a mirror means replacing it with a new definition under the same `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mirror {
    pub id: String,
    pub enabled: bool,
    pub project_name: String,
    pub local_repo: String,
    pub local_path: String,
    pub direction: MirrorDirection,
    /// Six-field cron expression (`sec min hour dom month dow`).
    pub schedule: String,
    pub remote_scheme: String,
    pub remote_url: String,
    pub remote_path: String,
    pub remote_branch: String,
    pub gitignore: Option<String>,
    pub credential_ref: String,
    pub zone: Option<String>,
}
