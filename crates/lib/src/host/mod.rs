//! Access to the upstream source host.
//!
//! The resolver and synchronizer only ever need two things from the host:
//! a small document fetched into memory (the revision index) and a large
//! archive streamed to disk. [`SourceHost`] captures exactly that, so tests can
//! substitute a counting in-memory host for [`HttpSourceHost`].

mod http;

use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::error::{Classify, ErrorKind, classify_io};

pub use http::HttpSourceHost;

#[derive(Debug, Error)]
pub enum HostError {
  /// The host answered, but has nothing at this URL.
  #[error("not found: {url}")]
  NotFound { url: String },

  /// The host answered with a non-success status other than 404.
  #[error("HTTP {status} for {url}")]
  Status { url: String, status: u16 },

  /// The host could not be reached or the transfer broke off.
  #[error("network error for {url}: {message}")]
  Network { url: String, message: String },

  /// Writing the downloaded bytes locally failed.
  #[error("failed to write {}: {source}", path.display())]
  Io {
    path: PathBuf,
    #[source]
    source: io::Error,
  },
}

impl Classify for HostError {
  fn kind(&self) -> ErrorKind {
    match self {
      HostError::NotFound { .. } => ErrorKind::Lookup,
      HostError::Status { status, .. } if is_transient_status(*status) => ErrorKind::TransientInfra,
      HostError::Status { .. } => ErrorKind::Integrity,
      HostError::Network { .. } => ErrorKind::TransientInfra,
      HostError::Io { source, .. } => classify_io(source),
    }
  }
}

/// Server errors, throttling and request timeouts are worth another attempt.
pub fn is_transient_status(status: u16) -> bool {
  status >= 500 || status == 408 || status == 429
}

/// Read-only access to the upstream index and archives.
pub trait SourceHost: Send + Sync {
  /// Fetch a small document into memory.
  fn get(&self, url: &str) -> impl Future<Output = Result<Vec<u8>, HostError>> + Send;

  /// Stream `url` into the file at `dest`, replacing it. Returns the byte count.
  fn download(&self, url: &str, dest: &Path) -> impl Future<Output = Result<u64, HostError>> + Send;
}
