//! Configuration loader with multi-source merging (§6).

use std::env;
use std::path::PathBuf;

use crate::{ConfigError, DogmaConfig, Paths};

/// Builder-style layered configuration loader.
pub struct ConfigLoader {
    data_dir: PathBuf,
    env_prefix: String,
}

impl ConfigLoader {
    /// Creates a loader defaulting to `<cwd>/.central-dogma/data` until
    /// overridden by `with_data_dir` or by a layered config source.
    pub fn new() -> Self {
        let cwd = env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self { data_dir: cwd.join(".central-dogma").join("data"), env_prefix: "CENTRAL_DOGMA".to_string() }
    }

    /// Sets the default `dataDir`, overridable by any higher-precedence
    /// source that sets it explicitly.
    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }

    /// Sets the environment variable prefix (default `CENTRAL_DOGMA`).
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Loads configuration from all sources with proper precedence, then
    /// validates it.
    pub fn load(self) -> Result<DogmaConfig, ConfigError> {
        let mut builder = config::Config::builder();

        // 1. Built-in defaults: `dataDir` is the only field with no
        // `#[serde(default)]`, since every other field already carries one.
        builder = builder
            .set_default("dataDir", self.data_dir.to_string_lossy().into_owned())
            .map_err(|e| ConfigError::BuildError(e.to_string()))?;

        // 2. User config (~/.config/central-dogma/config.toml)
        let paths = Paths::new();
        if let Ok(user_config_file) = paths.user_config_file() {
            if user_config_file.exists() {
                builder = builder
                    .add_source(config::File::from(user_config_file).required(false).format(config::FileFormat::Toml));
            }
        }

        // 3. Data-dir config (<dataDir>/central-dogma.toml)
        let data_dir_config_file = Paths::data_dir_config_file(&self.data_dir);
        if data_dir_config_file.exists() {
            builder = builder
                .add_source(config::File::from(data_dir_config_file).required(false).format(config::FileFormat::Toml));
        }

        // 4. Environment variables (CENTRAL_DOGMA_*)
        builder = builder.add_source(
            config::Environment::with_prefix(&self.env_prefix).separator("_").try_parsing(true),
        );

        let built = builder.build().map_err(|e| ConfigError::BuildError(e.to_string()))?;
        let mut dogma_config: DogmaConfig =
            built.try_deserialize().map_err(|e| ConfigError::BuildError(e.to_string()))?;

        dogma_config.validate()?;
        Ok(dogma_config)
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn loads_defaults_with_data_dir_override() {
        let temp_dir = tempdir().expect("failed to create temp dir");
        let config =
            ConfigLoader::new().with_data_dir(temp_dir.path()).load().expect("failed to load config");

        assert_eq!(config.data_dir, temp_dir.path());
        assert_eq!(config.num_repository_workers, 16);
        assert!(config.mirroring_enabled);
    }

    #[test]
    fn data_dir_config_file_overrides_defaults() {
        let temp_dir = tempdir().expect("failed to create temp dir");
        let data_dir = temp_dir.path();

        fs::write(
            data_dir.join("central-dogma.toml"),
            r#"
numRepositoryWorkers = 32
mirroringEnabled = false

[authentication]
sessionTimeoutMillis = 60000
"#,
        )
        .expect("failed to write data-dir config");

        let config = ConfigLoader::new().with_data_dir(data_dir).load().expect("failed to load config");

        assert_eq!(config.num_repository_workers, 32);
        assert!(!config.mirroring_enabled);
        assert_eq!(config.authentication.session_timeout_millis, 60000);
    }

    #[test]
    fn user_config_is_overridden_by_data_dir_config() {
        // No user config file exists in this sandboxed test environment, so
        // this exercises only the data-dir layer, but documents the
        // intended precedence for a reader of the test suite.
        let temp_dir = tempdir().expect("failed to create temp dir");
        let data_dir = temp_dir.path();
        fs::write(data_dir.join("central-dogma.toml"), "numRepositoryWorkers = 4\n").unwrap();

        let config = ConfigLoader::new().with_data_dir(data_dir).load().unwrap();
        assert_eq!(config.num_repository_workers, 4);
    }

    #[test]
    fn quorum_replication_config_round_trips() {
        let temp_dir = tempdir().expect("failed to create temp dir");
        let data_dir = temp_dir.path();
        fs::write(
            data_dir.join("central-dogma.toml"),
            r#"
[replication]
method = "QUORUM"
serverId = 1
secret = "shared-secret"

[replication.servers.1]
host = "10.0.0.1"
quorumPort = 8100
electionPort = 8101

[replication.servers.2]
host = "10.0.0.2"
quorumPort = 8100
electionPort = 8101

[replication.servers.3]
host = "10.0.0.3"
quorumPort = 8100
electionPort = 8101
"#,
        )
        .unwrap();

        let config = ConfigLoader::new().with_data_dir(data_dir).load().expect("failed to load config");
        assert_eq!(config.replication.method, crate::ReplicationMethod::Quorum);
        assert_eq!(config.replication.server_id, Some(1));
        assert_eq!(config.replication.servers.len(), 3);
    }
}
