//! Bringing a workspace to match a [`Revision`].
//!
//! Every extracted directory carries a pin marker naming the archive it came
//! from, which makes reuse content-addressed: a directory already at the right
//! pin is never fetched again, whatever the recorded state says. Extraction
//! happens in a `*.partial` sibling that is renamed into place only once its
//! marker is written.

mod archive;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info};

use crate::error::{Classify, ErrorKind, is_out_of_space};
use crate::host::{HostError, SourceHost};
use crate::retry::RetryPolicy;
use crate::revision::{Pin, Revision};
use crate::util::fs::{remove_dir_all_if_exists, temp_sibling};
use crate::util::hash::hash_file;
use crate::workspace::{StateError, SyncState, Workspace, has_pin, write_pin};

const SOURCE_NAME: &str = "src";

#[derive(Debug, Error)]
pub enum SyncError {
  #[error("network failure fetching {name}: {source}")]
  Network {
    name: String,
    #[source]
    source: HostError,
  },

  #[error("archive for {name} is unavailable: {source}")]
  Unavailable {
    name: String,
    #[source]
    source: HostError,
  },

  #[error("integrity mismatch for {name}: expected sha256 {expected}, got {actual}")]
  IntegrityMismatch {
    name: String,
    expected: String,
    actual: String,
  },

  #[error("fetching {name} timed out after {}", humantime::format_duration(*after))]
  TimedOut { name: String, after: Duration },

  #[error("failed to extract {name}: {source}")]
  Extract {
    name: String,
    #[source]
    source: io::Error,
  },

  #[error("out of disk space at {}: {source}", path.display())]
  DiskSpace {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("I/O error at {}: {source}", path.display())]
  Io {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error(transparent)]
  State(#[from] StateError),
}

impl Classify for SyncError {
  fn kind(&self) -> ErrorKind {
    match self {
      SyncError::Network { .. } => ErrorKind::TransientInfra,
      SyncError::Unavailable { .. } | SyncError::IntegrityMismatch { .. } | SyncError::Extract { .. } => {
        ErrorKind::Integrity
      }
      SyncError::TimedOut { .. } => ErrorKind::Timeout,
      SyncError::DiskSpace { .. } => ErrorKind::Resource,
      SyncError::Io { .. } => ErrorKind::Integrity,
      SyncError::State(e) => e.kind(),
    }
  }
}

impl SyncError {
  fn io(path: &Path, source: io::Error) -> Self {
    if is_out_of_space(&source) {
      SyncError::DiskSpace {
        path: path.to_path_buf(),
        source,
      }
    } else {
      SyncError::Io {
        path: path.to_path_buf(),
        source,
      }
    }
  }

  fn from_host(name: &str, source: HostError) -> Self {
    match source {
      HostError::Io { path, source } => SyncError::io(&path, source),
      source if source.kind().is_retryable() => SyncError::Network {
        name: name.to_string(),
        source,
      },
      source => SyncError::Unavailable {
        name: name.to_string(),
        source,
      },
    }
  }
}

/// A directory to install from a verified archive.
struct Install {
  name: String,
  archive: PathBuf,
  target: PathBuf,
  sha256: String,
  /// Nested directories (relative to `target`) to carry over from the old
  /// tree when they already sit at these pins.
  carry: Vec<(String, String)>,
}

pub struct SourceSynchronizer<'a, H> {
  host: &'a H,
  timeout: Duration,
  retry: RetryPolicy,
}

impl<'a, H: SourceHost> SourceSynchronizer<'a, H> {
  pub fn new(host: &'a H, timeout: Duration, retry: RetryPolicy) -> Self {
    Self { host, timeout, retry }
  }

  /// Sync `workspace` to `revision` and return the published state.
  ///
  /// The state is published only after every directory is in place. On
  /// failure the previous record stays, unless the previous record named a
  /// revision and a directory had to be replaced, in which case it is
  /// downgraded to "unsynced" first.
  pub async fn sync(&self, workspace: &Workspace, revision: &Revision) -> Result<SyncState, SyncError> {
    let previous = workspace.load_sync_state()?;
    if previous.is_synced_to(revision) && workspace.verify(&previous) {
      info!(revision = %revision.stamp(), "workspace already up to date");
      return Ok(previous);
    }

    info!(revision = %revision.stamp(), deps = revision.deps().len(), "syncing workspace");

    let downloads = workspace.downloads_dir();
    fs::create_dir_all(&downloads).map_err(|e| SyncError::io(&downloads, e))?;

    let mut invalidated = previous.revision.is_none();
    let mut fetched = 0usize;

    let src = workspace.src_dir();
    let source = revision.source();
    if has_pin(&src, &source.sha256) {
      debug!(path = %src.display(), "main tree already at pin");
    } else {
      self.invalidate(workspace, &mut invalidated)?;
      let archive = self.fetch(workspace, SOURCE_NAME, source).await?;
      let carry = revision
        .deps()
        .values()
        .map(|dep| (dep.path.clone(), dep.pin.sha256.clone()))
        .collect();
      install(Install {
        name: SOURCE_NAME.to_string(),
        archive,
        target: src.clone(),
        sha256: source.sha256.clone(),
        carry,
      })
      .await?;
      fetched += 1;
    }

    for (name, dep) in revision.deps() {
      let target = workspace.dep_dir(&dep.path);
      if has_pin(&target, &dep.pin.sha256) {
        debug!(dep = %name, path = %dep.path, "dependency already at pin");
        continue;
      }

      self.invalidate(workspace, &mut invalidated)?;
      let archive = self.fetch(workspace, name, &dep.pin).await?;
      let prefix = format!("{}/", dep.path);
      let carry = revision
        .deps()
        .values()
        .filter_map(|other| {
          other
            .path
            .strip_prefix(&prefix)
            .map(|rel| (rel.to_string(), other.pin.sha256.clone()))
        })
        .collect();
      install(Install {
        name: name.clone(),
        archive,
        target,
        sha256: dep.pin.sha256.clone(),
        carry,
      })
      .await?;
      fetched += 1;
    }

    let state = SyncState::synced_to(revision);
    workspace.publish_sync_state(&state)?;
    info!(revision = %revision.stamp(), fetched, reused = revision.deps().len() + 1 - fetched, "sync complete");
    Ok(state)
  }

  /// Downgrade a record that names a revision before touching the tree it
  /// describes.
  fn invalidate(&self, workspace: &Workspace, invalidated: &mut bool) -> Result<(), SyncError> {
    if !*invalidated {
      debug!("marking workspace unsynced before replacing content");
      workspace.publish_sync_state(&SyncState::unsynced())?;
      *invalidated = true;
    }
    Ok(())
  }

  /// Download `pin` into the downloads directory and verify it, returning
  /// the archive path. A verified leftover from an earlier run is reused.
  async fn fetch(&self, workspace: &Workspace, name: &str, pin: &Pin) -> Result<PathBuf, SyncError> {
    let dest = workspace.downloads_dir().join(format!("{}.part", pin.sha256));

    if dest.is_file() {
      let actual = hash_blocking(&dest).await?;
      if actual.matches(&pin.sha256) {
        debug!(name, path = %dest.display(), "reusing verified download");
        return Ok(dest);
      }
      debug!(name, path = %dest.display(), "discarding stale download");
    }

    info!(name, url = %pin.url, "fetching archive");
    let bytes = self
      .retry
      .run(&format!("fetch {name}"), || self.download_once(name, &pin.url, &dest))
      .await?;

    let actual = hash_blocking(&dest).await?;
    if !actual.matches(&pin.sha256) {
      let _ = fs::remove_file(&dest);
      return Err(SyncError::IntegrityMismatch {
        name: name.to_string(),
        expected: pin.sha256.clone(),
        actual: actual.0,
      });
    }

    debug!(name, bytes, "archive verified");
    Ok(dest)
  }

  async fn download_once(&self, name: &str, url: &str, dest: &Path) -> Result<u64, SyncError> {
    tokio::time::timeout(self.timeout, self.host.download(url, dest))
      .await
      .map_err(|_| SyncError::TimedOut {
        name: name.to_string(),
        after: self.timeout,
      })?
      .map_err(|e| SyncError::from_host(name, e))
  }
}

async fn hash_blocking(path: &Path) -> Result<crate::util::hash::ContentHash, SyncError> {
  let owned = path.to_path_buf();
  tokio::task::spawn_blocking(move || hash_file(&owned))
    .await
    .map_err(|e| SyncError::io(path, io::Error::other(e)))?
    .map_err(|e| SyncError::io(path, e))
}

async fn install(job: Install) -> Result<(), SyncError> {
  let target = job.target.clone();
  tokio::task::spawn_blocking(move || install_blocking(&job))
    .await
    .map_err(|e| SyncError::io(&target, io::Error::other(e)))?
}

fn install_blocking(job: &Install) -> Result<(), SyncError> {
  let staging = temp_sibling(&job.target, ".partial");
  remove_dir_all_if_exists(&staging).map_err(|e| SyncError::io(&staging, e))?;

  let entries = archive::unpack(&job.archive, &staging).map_err(|source| {
    if is_out_of_space(&source) {
      SyncError::DiskSpace {
        path: staging.clone(),
        source,
      }
    } else {
      SyncError::Extract {
        name: job.name.clone(),
        source,
      }
    }
  })?;
  debug!(name = %job.name, entries, path = %staging.display(), "extracted");

  let mut carry = job.carry.clone();
  carry.sort();
  for (rel, sha256) in &carry {
    let old = job.target.join(rel);
    if !has_pin(&old, sha256) {
      continue;
    }
    let new = staging.join(rel);
    remove_dir_all_if_exists(&new).map_err(|e| SyncError::io(&new, e))?;
    if let Some(parent) = new.parent() {
      fs::create_dir_all(parent).map_err(|e| SyncError::io(parent, e))?;
    }
    fs::rename(&old, &new).map_err(|e| SyncError::io(&new, e))?;
    debug!(path = %rel, "carried over nested checkout");
  }

  write_pin(&staging, &job.sha256).map_err(|e| SyncError::io(&staging, e))?;

  if let Some(parent) = job.target.parent() {
    fs::create_dir_all(parent).map_err(|e| SyncError::io(parent, e))?;
  }
  let retired = temp_sibling(&job.target, ".old");
  remove_dir_all_if_exists(&retired).map_err(|e| SyncError::io(&retired, e))?;
  if job.target.exists() {
    fs::rename(&job.target, &retired).map_err(|e| SyncError::io(&job.target, e))?;
  }
  fs::rename(&staging, &job.target).map_err(|e| SyncError::io(&job.target, e))?;
  remove_dir_all_if_exists(&retired).map_err(|e| SyncError::io(&retired, e))?;
  fs::remove_file(&job.archive).map_err(|e| SyncError::io(&job.archive, e))?;
  Ok(())
}
