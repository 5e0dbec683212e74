//! Failure classification shared by every pipeline stage.
//!
//! Each stage error maps onto exactly one [`ErrorKind`]. Callers branch on the
//! kind only; the diagnostic text is carried along for display.

use std::fmt;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
  /// The requested revision cannot be resolved.
  Lookup,
  /// Network or availability problem; may succeed on retry.
  TransientInfra,
  /// Fetched or generated content does not match what was pinned.
  Integrity,
  /// Disk or other host resource exhaustion.
  Resource,
  /// Unsupported or conflicting build option.
  Configuration,
  /// The native build reported failure.
  BuildFailure,
  /// A bounded operation exceeded its deadline.
  Timeout,
}

impl ErrorKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Lookup => "lookup-error",
      Self::TransientInfra => "transient-infra-error",
      Self::Integrity => "integrity-error",
      Self::Resource => "resource-error",
      Self::Configuration => "configuration-error",
      Self::BuildFailure => "build-failure",
      Self::Timeout => "timeout-error",
    }
  }

  /// Only transient infrastructure failures are worth retrying.
  pub fn is_retryable(&self) -> bool {
    matches!(self, Self::TransientInfra)
  }
}

impl fmt::Display for ErrorKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

/// Implemented by every stage error.
pub trait Classify {
  fn kind(&self) -> ErrorKind;
}

/// Classify an I/O error: exhausted storage is a resource failure, anything
/// else is treated as an integrity problem with the workspace.
pub fn classify_io(err: &std::io::Error) -> ErrorKind {
  if is_out_of_space(err) {
    ErrorKind::Resource
  } else {
    ErrorKind::Integrity
  }
}

pub fn is_out_of_space(err: &std::io::Error) -> bool {
  matches!(
    err.kind(),
    std::io::ErrorKind::StorageFull | std::io::ErrorKind::QuotaExceeded
  )
}
