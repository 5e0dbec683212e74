//! The on-disk workspace shared by all pipeline stages.
//!
//! # Layout
//!
//! ```text
//! <root>/
//! ├── src/                       # main source tree (+ nested dependencies)
//! │   ├── .chromaforge-pin       # SHA-256 the tree was extracted from
//! │   └── third_party/ninja/
//! │       └── .chromaforge-pin
//! ├── out/<os>-<cpu>/            # one generated configuration per matrix cell
//! └── .chromaforge/
//!     ├── sync-state.json        # SyncState, published atomically
//!     ├── configuration.json     # most recently generated configuration
//!     ├── workspace.lock
//!     └── downloads/
//! ```

pub mod lock;
pub mod state;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::consts::{PIN_MARKER, STATE_DIR_NAME};
use crate::platform::Platform;

pub use lock::{LockError, WorkspaceLock};
pub use state::{Checkout, StateError, SyncState};

const SRC_DIR: &str = "src";
const OUT_DIR: &str = "out";
const DOWNLOADS_DIR: &str = "downloads";
const SYNC_STATE_FILENAME: &str = "sync-state.json";
const CONFIGURATION_FILENAME: &str = "configuration.json";

/// Handle to a workspace directory. Cheap to clone; holds no open files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
  root: PathBuf,
}

impl Workspace {
  /// Open (creating if needed) the workspace at `root`.
  pub fn open(root: impl AsRef<Path>) -> io::Result<Self> {
    let root = root.as_ref();
    fs::create_dir_all(root.join(STATE_DIR_NAME))?;
    let root = dunce::canonicalize(root)?;
    debug!(root = %root.display(), "opened workspace");
    Ok(Self { root })
  }

  /// Handle to the workspace at `root` without touching the disk. A root that
  /// does not exist yet reads as an empty, unsynced workspace.
  pub fn existing(root: impl AsRef<Path>) -> io::Result<Self> {
    let root = root.as_ref();
    let root = match dunce::canonicalize(root) {
      Ok(root) => root,
      Err(e) if e.kind() == io::ErrorKind::NotFound => std::path::absolute(root)?,
      Err(e) => return Err(e),
    };
    Ok(Self { root })
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  pub fn src_dir(&self) -> PathBuf {
    self.root.join(SRC_DIR)
  }

  /// Directory of a nested dependency, `path` being relative to `src/`.
  pub fn dep_dir(&self, path: &str) -> PathBuf {
    self.src_dir().join(path)
  }

  pub fn state_dir(&self) -> PathBuf {
    self.root.join(STATE_DIR_NAME)
  }

  pub fn downloads_dir(&self) -> PathBuf {
    self.state_dir().join(DOWNLOADS_DIR)
  }

  pub fn sync_state_path(&self) -> PathBuf {
    self.state_dir().join(SYNC_STATE_FILENAME)
  }

  pub fn configuration_record_path(&self) -> PathBuf {
    self.state_dir().join(CONFIGURATION_FILENAME)
  }

  /// Output directory of the configuration for `platform`.
  pub fn out_dir(&self, platform: &Platform) -> PathBuf {
    self.root.join(OUT_DIR).join(platform.key())
  }

  pub fn load_sync_state(&self) -> Result<SyncState, StateError> {
    SyncState::load(&self.sync_state_path())
  }

  pub fn publish_sync_state(&self, state: &SyncState) -> Result<(), StateError> {
    state.save(&self.sync_state_path())
  }

  /// The recorded state, but only if every directory it lists still carries
  /// the pin it claims. Anything else reads as `None`.
  pub fn verified_sync_state(&self) -> Result<Option<SyncState>, StateError> {
    let state = self.load_sync_state()?;
    Ok(self.verify(&state).then_some(state))
  }

  /// Existence and pin-marker check of the main tree and every dependency.
  pub fn verify(&self, state: &SyncState) -> bool {
    let Some(source) = state.source.as_deref() else {
      return false;
    };
    if state.revision.is_none() || !has_pin(&self.src_dir(), source) {
      return false;
    }
    state.deps.iter().all(|(name, checkout)| {
      let ok = has_pin(&self.dep_dir(&checkout.path), &checkout.sha256);
      if !ok {
        debug!(dep = %name, path = %checkout.path, "dependency failed verification");
      }
      ok
    })
  }
}

/// The pin recorded in `dir`, if any.
pub fn read_pin(dir: &Path) -> Option<String> {
  fs::read_to_string(dir.join(PIN_MARKER))
    .ok()
    .map(|s| s.trim().to_string())
}

/// Whether `dir` exists and was extracted from the archive with `sha256`.
pub fn has_pin(dir: &Path, sha256: &str) -> bool {
  dir.is_dir() && read_pin(dir).is_some_and(|pin| pin.eq_ignore_ascii_case(sha256))
}

/// Record the pin `dir` was extracted from.
pub fn write_pin(dir: &Path, sha256: &str) -> io::Result<()> {
  fs::write(dir.join(PIN_MARKER), format!("{sha256}\n"))
}
