use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CredentialKind {
    #[default]
    None,
    Password,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("auth user is not set")]
    MissingUser,
    #[error("auth credential kind is not set")]
    MissingCredentialKind,
    #[error("auth secret is not set")]
    MissingSecret,
    #[error("auth port is not set")]
    MissingPort,
}

/// Login credentials for a container's guest.
///
/// Supplied by the caller and only read by lifecycle operations. An `Auth`
/// whose kind is [`CredentialKind::None`] grants no remote session and
/// produces no bootstrap script.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Auth {
    pub user: String,
    #[serde(default)]
    pub kind: CredentialKind,
    #[serde(default, skip_serializing)]
    pub secret: String,
    #[serde(default)]
    pub port: Option<u16>,
}

impl Auth {
    pub fn password(user: &str, secret: &str, port: u16) -> Self {
        Self {
            user: user.to_owned(),
            kind: CredentialKind::Password,
            secret: secret.to_owned(),
            port: Some(port),
        }
    }

    pub fn has_credentials(&self) -> bool {
        self.kind != CredentialKind::None
    }

    /// Check that every field needed to dial a session is populated.
    pub fn validate(&self) -> Result<(), AuthError> {
        if self.user.is_empty() {
            return Err(AuthError::MissingUser);
        }
        if !self.has_credentials() {
            return Err(AuthError::MissingCredentialKind);
        }
        if self.secret.is_empty() {
            return Err(AuthError::MissingSecret);
        }
        if matches!(self.port, None | Some(0)) {
            return Err(AuthError::MissingPort);
        }
        Ok(())
    }
}
