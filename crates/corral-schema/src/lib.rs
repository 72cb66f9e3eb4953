//! Entity model and control-plane output parsers for Corral.
//!
//! This crate defines the state layer: the `Container`, `Cluster`, `Network`,
//! `Snapshot`, `Image`, and `Auth` entities that mirror what the external
//! container CLI reports, the pure parsers that turn its JSON and free-text
//! output into those entities, and the cloud-config bootstrap template.

pub mod auth;
pub mod bootstrap;
pub mod cluster;
pub mod container;
pub mod image;
pub mod network;
pub mod parse;

pub use auth::{Auth, AuthError, CredentialKind};
pub use bootstrap::{render_bootstrap, BOOTSTRAP_TEMPLATE};
pub use cluster::Cluster;
pub use container::{Container, ContainerStatus, Snapshot, SNAPSHOT_TIMESTAMP_FORMAT};
pub use image::{Image, ImageKind, StagedFile};
pub use network::{Connection, Network};
pub use parse::{
    network_for, parse_container_list, parse_fingerprint, parse_image_list, parse_leases,
    parse_snapshots, parse_system_state, LeaseEntry, SystemState,
};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("malformed JSON output: {0}")]
    Json(#[from] serde_json::Error),
    #[error("no fingerprint line in publish output: {0}")]
    MissingFingerprint(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_error_display_missing_fingerprint() {
        let e = ParseError::MissingFingerprint("Instance published".to_owned());
        assert!(e.to_string().contains("Instance published"));
    }

    #[test]
    fn parse_error_wraps_json_message() {
        let err = serde_json::from_str::<Vec<u8>>("{").unwrap_err();
        let msg = ParseError::from(err).to_string();
        assert!(msg.starts_with("malformed JSON output"));
    }
}
