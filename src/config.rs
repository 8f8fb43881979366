//! Client configuration: `~/.kanban-sync/config.json`, then environment,
//! then command-line flags.

use crate::error::{BoardError, Result};
use crate::models::{EntityId, UserId};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_SERVER_URL: &str = "KANBAN_SERVER_URL";
pub const ENV_USER: &str = "KANBAN_USER";
pub const ENV_PROJECT: &str = "KANBAN_PROJECT";
pub const ENV_TIMEOUT_MS: &str = "KANBAN_TIMEOUT_MS";
/// Overrides the config file location
pub const ENV_CONFIG: &str = "KANBAN_CONFIG";

const DEFAULT_SERVER_URL: &str = "http://localhost:3000";
const DEFAULT_TIMEOUT_MS: u64 = 10_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ClientConfig {
    pub server_url: String,
    pub user_id: Option<UserId>,
    pub project_id: Option<EntityId>,
    pub request_timeout_ms: u64,
    pub log_file: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            user_id: None,
            project_id: None,
            request_timeout_ms: DEFAULT_TIMEOUT_MS,
            log_file: None,
        }
    }
}

/// Values given on the command line; `None` leaves the lower layers alone
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub server_url: Option<String>,
    pub user_id: Option<String>,
    pub project_id: Option<String>,
}

/// `~/.kanban-sync/config.json`, or `KANBAN_CONFIG` when set
pub fn default_config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var(ENV_CONFIG) {
        return Some(PathBuf::from(path));
    }
    dirs::home_dir().map(|home| home.join(".kanban-sync").join("config.json"))
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl ClientConfig {
    /// Read a config file; a missing file yields the defaults
    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| {
            BoardError::Config(format!("Invalid config file {}: {}", path.display(), e))
        })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn apply_env(&mut self) -> Result<()> {
        if let Some(url) = non_empty_env(ENV_SERVER_URL) {
            self.server_url = url;
        }
        if let Some(user) = non_empty_env(ENV_USER) {
            self.user_id = Some(UserId::from(user));
        }
        if let Some(project) = non_empty_env(ENV_PROJECT) {
            self.project_id = Some(EntityId::from(project));
        }
        if let Some(timeout) = non_empty_env(ENV_TIMEOUT_MS) {
            self.request_timeout_ms = timeout.trim().parse().map_err(|_| {
                BoardError::Config(format!("{} must be a number of milliseconds", ENV_TIMEOUT_MS))
            })?;
        }
        Ok(())
    }

    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(url) = &overrides.server_url {
            self.server_url = url.clone();
        }
        if let Some(user) = &overrides.user_id {
            self.user_id = Some(UserId::from(user.as_str()));
        }
        if let Some(project) = &overrides.project_id {
            self.project_id = Some(EntityId::from(project.as_str()));
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.server_url.starts_with("http://") || self.server_url.starts_with("https://")) {
            return Err(BoardError::Config(format!(
                "Server URL must start with http:// or https://, got '{}'",
                self.server_url
            )));
        }
        if self.request_timeout_ms == 0 {
            return Err(BoardError::Config(
                "Request timeout must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    /// All layers: file, environment, then `overrides`
    pub fn load(path: Option<&Path>, overrides: &ConfigOverrides) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env()?;
        config.apply_overrides(overrides);
        config.validate()?;
        tracing::debug!(server = %config.server_url, "Configuration loaded");
        Ok(config)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// The project to operate on, or a config error naming how to set one
    pub fn require_project(&self) -> Result<EntityId> {
        self.project_id.clone().ok_or_else(|| {
            BoardError::Config(format!(
                "No project selected; pass --project or set {}",
                ENV_PROJECT
            ))
        })
    }
}
