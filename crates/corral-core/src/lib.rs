//! Lifecycle orchestration for Corral containers and clusters.
//!
//! The `Engine` composes command batches from `corral-exec` with the parsers
//! and entities from `corral-schema` into multi-step workflows: create with
//! readiness polling, power transitions, delete, snapshots, image publish,
//! export and import, network discovery, and cluster scans. Every workflow
//! stops at the first failing step and returns a typed error.

pub mod cluster;
pub mod config;
pub mod container;
pub mod engine;
pub mod image;

pub use cluster::Freshness;
pub use config::Settings;
pub use engine::Engine;

use corral_exec::ExecError;
use corral_schema::{AuthError, ParseError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("exec error: {0}")]
    Exec(#[from] ExecError),
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),
    #[error("auth error: {0}")]
    Auth(#[from] AuthError),
    #[error("container '{container}' not ready after {attempts} attempts")]
    ReadinessTimeout { container: String, attempts: u32 },
    #[error("container not found: {0}")]
    ContainerNotFound(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config error: {0}")]
    Config(String),
    #[error("image '{0}' has no staged files")]
    EmptyImage(String),
    #[error("container '{0}' has no known address")]
    NoAddress(String),
}

impl CoreError {
    /// A local precondition failed before any external call was made.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Self::Auth(_) | Self::Exec(ExecError::Auth(_)) | Self::NoAddress(_)
        )
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::ReadinessTimeout { .. })
    }
}
