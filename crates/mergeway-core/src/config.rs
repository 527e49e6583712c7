//! Configuration management for mergeway.

use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use mergeway_store::Signature;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Environment variable overriding `server.bind`.
pub const ENV_BIND: &str = "MERGEWAY_BIND";
/// Environment variable overriding `storage.repos_dir`.
pub const ENV_REPOS_DIR: &str = "MERGEWAY_REPOS_DIR";
/// Environment variable overriding `storage.state_dir`.
pub const ENV_STATE_DIR: &str = "MERGEWAY_STATE_DIR";

/// mergeway configuration, usually loaded from `mergeway.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Where repositories and pull request records live.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Merge commit settings.
    #[serde(default)]
    pub merge: MergeConfig,
}

impl Config {
    /// Load config from a TOML file. A missing file yields the defaults.
    ///
    /// # Errors
    /// Returns error if file can't be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save config to a TOML file.
    ///
    /// # Errors
    /// Returns error if serialization or write fails.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Apply `MERGEWAY_*` overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from `lookup`, keyed by environment variable name.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(bind) = lookup(ENV_BIND) {
            self.server.bind = bind;
        }
        if let Some(dir) = lookup(ENV_REPOS_DIR) {
            self.storage.repos_dir = dir.into();
        }
        if let Some(dir) = lookup(ENV_STATE_DIR) {
            self.storage.state_dir = dir.into();
        }
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Socket address to listen on.
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl ServerConfig {
    /// Parse the bind address.
    ///
    /// # Errors
    /// Returns [`Error::Config`] if `bind` is not a socket address.
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        self.bind
            .parse()
            .map_err(|e| Error::Config(format!("server.bind '{}': {e}", self.bind)))
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:3000".into()
}

/// Storage locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding one git repository per subdirectory.
    #[serde(default = "default_repos_dir")]
    pub repos_dir: PathBuf,

    /// Directory holding one `<repo>.json` record file per repository.
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            repos_dir: default_repos_dir(),
            state_dir: default_state_dir(),
        }
    }
}

fn default_repos_dir() -> PathBuf {
    "repos".into()
}

fn default_state_dir() -> PathBuf {
    "prs".into()
}

/// Identity and message used for merge commits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeConfig {
    /// Committer name.
    #[serde(default = "default_committer_name")]
    pub committer_name: String,

    /// Committer email.
    #[serde(default = "default_committer_email")]
    pub committer_email: String,

    /// Message template; `{source}`, `{target}` and `{number}` are replaced.
    #[serde(default = "default_message_template")]
    pub message_template: String,
}

impl MergeConfig {
    /// Signature recorded on merge commits.
    #[must_use]
    pub fn committer(&self) -> Signature {
        Signature::new(&self.committer_name, &self.committer_email)
    }

    /// Render the merge commit message for a pull request.
    #[must_use]
    pub fn message(&self, source: &str, target: &str, number: u64) -> String {
        self.message_template
            .replace("{source}", source)
            .replace("{target}", target)
            .replace("{number}", &number.to_string())
    }
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            committer_name: default_committer_name(),
            committer_email: default_committer_email(),
            message_template: default_message_template(),
        }
    }
}

fn default_committer_name() -> String {
    "mergeway".into()
}

fn default_committer_email() -> String {
    "mergeway@localhost".into()
}

fn default_message_template() -> String {
    "Merge pull request #{number} from {source} into {target}".into()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.bind, "127.0.0.1:3000");
        assert_eq!(config.storage.repos_dir, PathBuf::from("repos"));
        assert_eq!(config.storage.state_dir, PathBuf::from("prs"));
        assert_eq!(config.merge.committer_name, "mergeway");
    }

    #[test]
    fn test_config_roundtrip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("mergeway.toml");

        let mut config = Config::default();
        config.server.bind = "0.0.0.0:8080".into();
        config.storage.state_dir = "/var/lib/mergeway/prs".into();
        config.merge.committer_email = "bot@example.com".into();

        config.save(&path).unwrap();
        let loaded = Config::load(&path).unwrap();

        assert_eq!(loaded.server.bind, "0.0.0.0:8080");
        assert_eq!(loaded.storage.state_dir, PathBuf::from("/var/lib/mergeway/prs"));
        assert_eq!(loaded.storage.repos_dir, PathBuf::from("repos"));
        assert_eq!(loaded.merge.committer_email, "bot@example.com");
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: Config = toml::from_str("[merge]\ncommitter_name = \"Bot\"\n").unwrap();
        assert_eq!(config.merge.committer_name, "Bot");
        assert_eq!(config.merge.committer_email, "mergeway@localhost");
        assert_eq!(config.server.bind, "127.0.0.1:3000");
    }

    #[test]
    fn test_missing_config_returns_default() {
        let config = Config::load("/nonexistent/path/mergeway.toml").unwrap();
        assert_eq!(config.server.bind, "127.0.0.1:3000");
    }

    #[test]
    fn test_malformed_config_fails() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("mergeway.toml");
        fs::write(&path, "[server\nbind = 1").unwrap();

        assert!(matches!(Config::load(&path), Err(Error::Toml(_))));
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = [(ENV_BIND, "127.0.0.1:9999"), (ENV_STATE_DIR, "/tmp/prs")]
            .into_iter()
            .collect();

        let mut config = Config::default();
        config.apply_overrides(|key| env.get(key).map(|v| (*v).to_string()));

        assert_eq!(config.server.bind, "127.0.0.1:9999");
        assert_eq!(config.storage.state_dir, PathBuf::from("/tmp/prs"));
        assert_eq!(config.storage.repos_dir, PathBuf::from("repos"));
    }

    #[test]
    fn test_bind_addr() {
        let mut server = ServerConfig::default();
        assert_eq!(server.bind_addr().unwrap().port(), 3000);

        server.bind = "not an address".into();
        assert!(matches!(server.bind_addr(), Err(Error::Config(_))));
    }

    #[test]
    fn test_merge_message() {
        let merge = MergeConfig::default();
        assert_eq!(
            merge.message("feature", "main", 7),
            "Merge pull request #7 from feature into main"
        );
        assert_eq!(merge.committer().to_string(), "mergeway <mergeway@localhost>");
    }
}
