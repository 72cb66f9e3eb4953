use crate::CoreError;
use corral_exec::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    /// Control-plane executable.
    pub lxc_binary: String,
    /// Bridge whose DHCP leases identify container addresses.
    pub bridge: String,
    pub image_remote: String,
    pub architecture: String,
    pub staging_root: PathBuf,
    pub retry_attempts: u32,
    pub retry_interval_secs: u64,
    pub readiness_attempts: u32,
    pub readiness_interval_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            lxc_binary: "lxc".to_owned(),
            bridge: "lxdbr0".to_owned(),
            image_remote: "images".to_owned(),
            architecture: "amd64".to_owned(),
            staging_root: default_staging_root(),
            retry_attempts: 3,
            retry_interval_secs: 5,
            readiness_attempts: 36,
            readiness_interval_secs: 5,
        }
    }
}

impl Settings {
    /// Load settings from `~/.config/corral/corral.toml`, falling back to
    /// defaults when the file does not exist.
    pub fn load_default() -> Result<Self, CoreError> {
        match default_config_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn load(path: &Path) -> Result<Self, CoreError> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| CoreError::Config(format!("invalid config {}: {e}", path.display())))
    }

    pub fn save(&self, path: &Path) -> Result<(), CoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| CoreError::Config(format!("cannot serialize config: {e}")))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    #[must_use]
    pub fn with_staging_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.staging_root = root.into();
        self
    }

    /// Bounds for lease discovery.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry_attempts,
            Duration::from_secs(self.retry_interval_secs),
        )
    }

    /// Bounds for the guest readiness loop.
    pub fn readiness_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.readiness_attempts,
            Duration::from_secs(self.readiness_interval_secs),
        )
    }
}

fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .filter(|h| !h.is_empty())
        .map(PathBuf::from)
}

pub fn default_config_path() -> Option<PathBuf> {
    home_dir().map(|home| home.join(".config/corral/corral.toml"))
}

fn default_staging_root() -> PathBuf {
    home_dir().map_or_else(
        || std::env::temp_dir().join("corral"),
        |home| home.join(".local/share/corral"),
    )
}
