use crate::auth::Auth;
use crate::network::Network;
use chrono::{DateTime, NaiveDateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

/// Timestamp layout embedded in snapshot names, e.g. `2021-01-18T10HH05MM33SS-UTC`.
///
/// Colons are not allowed in snapshot names, so each field carries a suffix instead.
pub const SNAPSHOT_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%HHH%MMM%SSS-UTC";

const SNAPSHOT_INFIX: &str = "-snap-";

/// Last state reported by the control plane. Refreshed only by a scan.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(from = "String", into = "String")]
pub enum ContainerStatus {
    #[default]
    Initializing,
    Running,
    Stopped,
    Deleted,
    Other(String),
}

impl From<&str> for ContainerStatus {
    fn from(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "initializing" => Self::Initializing,
            "running" => Self::Running,
            "stopped" => Self::Stopped,
            "deleted" => Self::Deleted,
            _ => Self::Other(s.trim().to_owned()),
        }
    }
}

impl From<String> for ContainerStatus {
    fn from(s: String) -> Self {
        Self::from(s.as_str())
    }
}

impl From<ContainerStatus> for String {
    fn from(status: ContainerStatus) -> Self {
        status.to_string()
    }
}

impl std::fmt::Display for ContainerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Initializing => write!(f, "Initializing"),
            Self::Running => write!(f, "Running"),
            Self::Stopped => write!(f, "Stopped"),
            Self::Deleted => write!(f, "Deleted"),
            Self::Other(s) => write!(f, "{s}"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Snapshot {
    pub name: String,
    pub taken_at: NaiveDateTime,
}

impl Snapshot {
    /// Build the deterministic `<container>-snap-<timestamp>` snapshot for `at`.
    pub fn for_container(container: &str, at: DateTime<Utc>) -> Self {
        let at = at.naive_utc().trunc_subsecs(0);
        Self {
            name: format!(
                "{container}{SNAPSHOT_INFIX}{}",
                at.format(SNAPSHOT_TIMESTAMP_FORMAT)
            ),
            taken_at: at,
        }
    }

    /// Recover a snapshot from its name, if it follows the naming convention
    /// for `container`.
    pub fn parse_name(container: &str, name: &str) -> Option<Self> {
        let stamp = name
            .strip_prefix(container)?
            .strip_prefix(SNAPSHOT_INFIX)?;
        let taken_at = NaiveDateTime::parse_from_str(stamp, SNAPSHOT_TIMESTAMP_FORMAT).ok()?;
        Some(Self {
            name: name.to_owned(),
            taken_at,
        })
    }
}

/// A system container and the state last observed for it.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Container {
    pub name: String,
    #[serde(default)]
    pub controller: bool,
    /// Distribution, e.g. `ubuntu`.
    pub kind: String,
    pub release: String,
    #[serde(default)]
    pub services: Vec<String>,
    /// Cloud-config payload passed as user-data on first boot.
    #[serde(skip)]
    pub bootstrap: Vec<u8>,
    /// Storage pool; empty means the profile default.
    #[serde(default)]
    pub storage: String,
    #[serde(default)]
    pub network: Network,
    #[serde(default)]
    pub auth: Option<Auth>,
    #[serde(default)]
    pub snapshots: Vec<Snapshot>,
    #[serde(default)]
    pub status: ContainerStatus,
}

impl Container {
    pub fn new(name: &str, kind: &str, release: &str) -> Self {
        Self {
            name: name.to_owned(),
            kind: kind.to_owned(),
            release: release.to_owned(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_auth(mut self, auth: Auth) -> Self {
        self.auth = Some(auth);
        self
    }

    #[must_use]
    pub fn with_bootstrap(mut self, bootstrap: impl Into<Vec<u8>>) -> Self {
        self.bootstrap = bootstrap.into();
        self
    }

    #[must_use]
    pub fn with_storage(mut self, pool: &str) -> Self {
        pool.clone_into(&mut self.storage);
        self
    }

    #[must_use]
    pub fn as_controller(mut self) -> Self {
        self.controller = true;
        self
    }

    /// Append a snapshot unless one with the same name and timestamp is known.
    /// Returns whether it was added.
    pub fn add_snapshot(&mut self, snapshot: Snapshot) -> bool {
        if self.snapshots.contains(&snapshot) {
            return false;
        }
        self.snapshots.push(snapshot);
        true
    }

    pub fn snapshot(&self, name: &str) -> Option<&Snapshot> {
        self.snapshots.iter().find(|s| s.name == name)
    }
}
