//! SyncState persistence.
//!
//! The record lives at `.chromaforge/sync-state.json` and is only ever
//! replaced wholesale by an atomic rename, so a reader sees either the
//! previous record or the new one.
//!
//! ```json
//! {
//!   "version": 1,
//!   "revision": { "version": "124.0.6315.2", "digest": "a1b2c3d4e5f6a7b8c9d0" },
//!   "source": "5f1c...",
//!   "deps": {
//!     "ninja": { "path": "third_party/ninja", "sha256": "9e0a..." }
//!   }
//! }
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::{Classify, ErrorKind, classify_io};
use crate::revision::{Revision, RevisionStamp};
use crate::util::fs::write_atomic;

/// Current sync state format version.
pub const SYNC_STATE_VERSION: u32 = 1;

/// A directory checked out from a pinned archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkout {
  pub path: String,
  pub sha256: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncState {
  pub version: u32,
  /// The revision the workspace was last fully synced to; `None` means unsynced.
  pub revision: Option<RevisionStamp>,
  /// Pin of the main source tree.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub source: Option<String>,
  #[serde(default)]
  pub deps: BTreeMap<String, Checkout>,
}

#[derive(Debug, Error)]
pub enum StateError {
  #[error("failed to read {file}: {source}")]
  Read {
    file: &'static str,
    #[source]
    source: io::Error,
  },

  #[error("failed to write {file}: {source}")]
  Write {
    file: &'static str,
    #[source]
    source: io::Error,
  },

  #[error("failed to parse {file}: {source}")]
  Parse {
    file: &'static str,
    #[source]
    source: serde_json::Error,
  },

  #[error("failed to serialize {file}: {source}")]
  Serialize {
    file: &'static str,
    #[source]
    source: serde_json::Error,
  },

  #[error("unsupported {file} version {found}, expected {expected}")]
  UnsupportedVersion {
    file: &'static str,
    found: u32,
    expected: u32,
  },
}

impl Classify for StateError {
  fn kind(&self) -> ErrorKind {
    match self {
      StateError::Read { source, .. } | StateError::Write { source, .. } => classify_io(source),
      _ => ErrorKind::Integrity,
    }
  }
}

impl Default for SyncState {
  fn default() -> Self {
    Self::unsynced()
  }
}

impl SyncState {
  /// The explicit "nothing trustworthy on disk" record.
  pub fn unsynced() -> Self {
    Self {
      version: SYNC_STATE_VERSION,
      revision: None,
      source: None,
      deps: BTreeMap::new(),
    }
  }

  /// The record describing a workspace fully synced to `revision`.
  pub fn synced_to(revision: &Revision) -> Self {
    Self {
      version: SYNC_STATE_VERSION,
      revision: Some(revision.stamp().clone()),
      source: Some(revision.source().sha256.clone()),
      deps: revision
        .deps()
        .iter()
        .map(|(name, dep)| {
          (
            name.clone(),
            Checkout {
              path: dep.path.clone(),
              sha256: dep.pin.sha256.clone(),
            },
          )
        })
        .collect(),
    }
  }

  pub fn is_synced_to(&self, revision: &Revision) -> bool {
    self.revision.as_ref() == Some(revision.stamp())
  }

  /// Load the record; a missing file reads as [`SyncState::unsynced`].
  pub fn load(path: &Path) -> Result<Self, StateError> {
    let content = match fs::read_to_string(path) {
      Ok(content) => content,
      Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Self::unsynced()),
      Err(source) => return Err(StateError::Read { file: FILE, source }),
    };

    let state: SyncState = serde_json::from_str(&content).map_err(|source| StateError::Parse { file: FILE, source })?;

    if state.version != SYNC_STATE_VERSION {
      return Err(StateError::UnsupportedVersion {
        file: FILE,
        found: state.version,
        expected: SYNC_STATE_VERSION,
      });
    }

    Ok(state)
  }

  /// Publish the record atomically.
  pub fn save(&self, path: &Path) -> Result<(), StateError> {
    let content = serde_json::to_string_pretty(self).map_err(|source| StateError::Serialize { file: FILE, source })?;
    write_atomic(path, content.as_bytes()).map_err(|source| StateError::Write { file: FILE, source })
  }
}

const FILE: &str = "sync state";
