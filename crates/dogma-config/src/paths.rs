//! Path utilities and XDG directory discovery.

use crate::ConfigError;
use directories::ProjectDirs;
use std::path::{Path, PathBuf};

/// XDG-compliant paths for Central Dogma's own config, plus the layout of
/// state Central Dogma keeps under a running server's `dataDir`.
pub struct Paths {
    project_dirs: Option<ProjectDirs>,
}

impl Paths {
    /// Creates a new `Paths` with XDG discovery.
    #[must_use]
    pub fn new() -> Self {
        Self { project_dirs: ProjectDirs::from("com", "CentralDogma", "central-dogma") }
    }

    /// User config directory (`~/.config/central-dogma/`).
    pub fn user_config_dir(&self) -> Result<PathBuf, ConfigError> {
        self.project_dirs
            .as_ref()
            .map(|p| p.config_dir().to_path_buf())
            .ok_or_else(|| ConfigError::XdgError("failed to determine user config directory".to_string()))
    }

    /// User config file (`~/.config/central-dogma/config.toml`).
    pub fn user_config_file(&self) -> Result<PathBuf, ConfigError> {
        Ok(self.user_config_dir()?.join("config.toml"))
    }

    /// The data-dir-local config file (`<dataDir>/central-dogma.toml`),
    /// third in the layered loader's precedence order.
    #[must_use]
    pub fn data_dir_config_file(data_dir: impl AsRef<Path>) -> PathBuf {
        data_dir.as_ref().join("central-dogma.toml")
    }

    /// `<dataDir>/replication/log/` — ordered replication log segments.
    #[must_use]
    pub fn replication_log_dir(data_dir: impl AsRef<Path>) -> PathBuf {
        data_dir.as_ref().join("replication").join("log")
    }

    /// `<dataDir>/replication/state` — last-applied seq and leader epoch.
    #[must_use]
    pub fn replication_state_file(data_dir: impl AsRef<Path>) -> PathBuf {
        data_dir.as_ref().join("replication").join("state")
    }

    /// `<dataDir>/sessions/` — one file per session.
    #[must_use]
    pub fn sessions_dir(data_dir: impl AsRef<Path>) -> PathBuf {
        data_dir.as_ref().join("sessions")
    }

    /// `<dataDir>/projects/` — repository contents; opaque below this point.
    #[must_use]
    pub fn projects_dir(data_dir: impl AsRef<Path>) -> PathBuf {
        data_dir.as_ref().join("projects")
    }
}

impl Default for Paths {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn xdg_paths_contain_central_dogma() {
        let paths = Paths::new();
        if let Ok(config_dir) = paths.user_config_dir() {
            assert!(config_dir.to_string_lossy().contains("central-dogma"));
        }
    }

    #[test]
    fn data_dir_paths_nest_under_data_dir() {
        let temp_dir = tempdir().expect("failed to create temp dir");
        let data_dir = temp_dir.path();

        assert_eq!(Paths::data_dir_config_file(data_dir), data_dir.join("central-dogma.toml"));
        assert_eq!(Paths::replication_log_dir(data_dir), data_dir.join("replication").join("log"));
        assert_eq!(Paths::replication_state_file(data_dir), data_dir.join("replication").join("state"));
        assert_eq!(Paths::sessions_dir(data_dir), data_dir.join("sessions"));
        assert_eq!(Paths::projects_dir(data_dir), data_dir.join("projects"));
    }
}
