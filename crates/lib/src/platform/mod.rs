pub mod arch;
pub mod os;

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use arch::TargetCpu;
pub use os::TargetOs;

#[derive(Debug, Error)]
pub enum PlatformError {
  #[error("unknown target OS '{0}' (expected linux, mac or win)")]
  UnknownOs(String),

  #[error("unknown target CPU '{0}' (expected x64, x86, arm64 or arm)")]
  UnknownCpu(String),

  #[error("host platform {os}/{arch} is not supported")]
  UnsupportedHost { os: &'static str, arch: &'static str },
}

/// One matrix cell: the (target OS, target CPU) pair a configuration is keyed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Platform {
  pub os: TargetOs,
  pub cpu: TargetCpu,
}

impl Platform {
  pub fn new(os: TargetOs, cpu: TargetCpu) -> Self {
    Self { os, cpu }
  }

  /// Detect the host platform.
  pub fn host() -> Result<Self, PlatformError> {
    match (TargetOs::current(), TargetCpu::current()) {
      (Some(os), Some(cpu)) => Ok(Self { os, cpu }),
      _ => Err(PlatformError::UnsupportedHost {
        os: std::env::consts::OS,
        arch: std::env::consts::ARCH,
      }),
    }
  }

  /// The host OS paired with the given CPU, which is what `bootstrap` and
  /// `configure` target when no OS is given.
  pub fn host_os_with(cpu: TargetCpu) -> Result<Self, PlatformError> {
    Ok(Self::new(Self::host()?.os, cpu))
  }

  /// Directory-safe key, e.g. `linux-x64`.
  pub fn key(&self) -> String {
    format!("{}-{}", self.os, self.cpu)
  }
}

impl fmt::Display for Platform {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.key())
  }
}
