use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::PlatformError;

/// Target CPU architectures, named the way the upstream build graph spells them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetCpu {
  X64,
  X86,
  Arm64,
  Arm,
}

impl TargetCpu {
  /// Detect the host CPU architecture at runtime
  pub fn current() -> Option<Self> {
    match std::env::consts::ARCH {
      "x86_64" => Some(Self::X64),
      "x86" => Some(Self::X86),
      "aarch64" => Some(Self::Arm64),
      "arm" => Some(Self::Arm),
      _ => None,
    }
  }

  /// Returns the identifier used in `target_cpu` build arguments
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::X64 => "x64",
      Self::X86 => "x86",
      Self::Arm64 => "arm64",
      Self::Arm => "arm",
    }
  }
}

impl fmt::Display for TargetCpu {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

impl FromStr for TargetCpu {
  type Err = PlatformError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "x64" | "amd64" | "x86_64" => Ok(Self::X64),
      "x86" | "ia32" => Ok(Self::X86),
      "arm64" | "aarch64" => Ok(Self::Arm64),
      "arm" => Ok(Self::Arm),
      _ => Err(PlatformError::UnknownCpu(s.to_string())),
    }
  }
}
