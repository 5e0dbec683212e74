use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::PlatformError;

/// Target operating systems, named the way the upstream build graph spells them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetOs {
  Linux,
  Mac,
  Win,
}

impl TargetOs {
  /// Detect the host operating system at runtime
  pub fn current() -> Option<Self> {
    match std::env::consts::OS {
      "linux" => Some(Self::Linux),
      "macos" => Some(Self::Mac),
      "windows" => Some(Self::Win),
      _ => None,
    }
  }

  /// Returns the identifier used in `target_os` build arguments
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Linux => "linux",
      Self::Mac => "mac",
      Self::Win => "win",
    }
  }
}

impl fmt::Display for TargetOs {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

impl FromStr for TargetOs {
  type Err = PlatformError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "linux" => Ok(Self::Linux),
      "mac" | "macos" | "darwin" => Ok(Self::Mac),
      "win" | "windows" => Ok(Self::Win),
      _ => Err(PlatformError::UnknownOs(s.to_string())),
    }
  }
}
