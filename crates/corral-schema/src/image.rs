use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ImageKind {
    Container,
    Snapshot,
}

/// One file exchanged with the control plane through a job directory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StagedFile {
    pub name: String,
    #[serde(skip)]
    pub contents: Vec<u8>,
}

impl StagedFile {
    pub fn new(name: &str, contents: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.to_owned(),
            contents: contents.into(),
        }
    }
}

/// A published image, optionally carrying its exported files.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Image {
    /// Alias in the control plane's image store.
    pub name: String,
    pub kind: ImageKind,
    pub fingerprint: String,
    #[serde(default)]
    pub files: Vec<StagedFile>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Image {
    pub fn new(name: &str, kind: ImageKind, fingerprint: &str) -> Self {
        Self {
            name: name.to_owned(),
            kind,
            fingerprint: fingerprint.to_owned(),
            files: Vec::new(),
            created_at: None,
        }
    }

    pub fn size(&self) -> usize {
        self.files.iter().map(|f| f.contents.len()).sum()
    }
}
