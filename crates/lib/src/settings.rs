//! Orchestrator settings.
//!
//! Values resolve from built-in defaults, then `CHROMAFORGE_*` environment
//! variables. The CLI applies its flags on top of the result.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::retry::RetryPolicy;

pub const ENV_WORKSPACE: &str = "CHROMAFORGE_WORKSPACE";
pub const ENV_INDEX_URL: &str = "CHROMAFORGE_INDEX_URL";
pub const ENV_FETCH_TIMEOUT: &str = "CHROMAFORGE_FETCH_TIMEOUT";
pub const ENV_BUILD_TIMEOUT: &str = "CHROMAFORGE_BUILD_TIMEOUT";
pub const ENV_FETCH_ATTEMPTS: &str = "CHROMAFORGE_FETCH_ATTEMPTS";
pub const ENV_GN: &str = "CHROMAFORGE_GN";
pub const ENV_NINJA: &str = "CHROMAFORGE_NINJA";

const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30 * 60);

#[derive(Debug, Error)]
pub enum SettingsError {
  #[error("{var}: invalid duration '{value}': {source}")]
  InvalidDuration {
    var: &'static str,
    value: String,
    #[source]
    source: humantime::DurationError,
  },

  #[error("{var}: expected a positive integer, got '{value}'")]
  InvalidNumber { var: &'static str, value: String },

  #[error("failed to determine current directory: {0}")]
  CurrentDir(#[source] std::io::Error),
}

#[derive(Debug, Clone)]
pub struct Settings {
  /// Workspace root holding `src/`, `out/` and orchestrator state.
  pub workspace: PathBuf,
  /// Base URL of the revision index. There is no public default; without one
  /// only explicitly pinned tarballs can be bootstrapped.
  pub index_url: Option<String>,
  /// Upper bound for a single network fetch.
  pub fetch_timeout: Duration,
  /// Upper bound for a native build; `None` waits indefinitely.
  pub build_timeout: Option<Duration>,
  pub retry: RetryPolicy,
  /// Graph generator binary; defaults to `gn` resolved through the tool PATH.
  pub gn: Option<PathBuf>,
  /// Build tool binary; defaults to `ninja` resolved through the tool PATH.
  pub ninja: Option<PathBuf>,
}

impl Settings {
  /// Defaults rooted at `workspace`, ignoring the environment.
  pub fn with_workspace(workspace: PathBuf) -> Self {
    Self {
      workspace,
      index_url: None,
      fetch_timeout: DEFAULT_FETCH_TIMEOUT,
      build_timeout: None,
      retry: RetryPolicy::default(),
      gn: None,
      ninja: None,
    }
  }

  /// Defaults overlaid with `CHROMAFORGE_*` environment variables.
  pub fn from_env() -> Result<Self, SettingsError> {
    let workspace = match env::var_os(ENV_WORKSPACE) {
      Some(path) => PathBuf::from(path),
      None => env::current_dir().map_err(SettingsError::CurrentDir)?,
    };

    let mut settings = Self::with_workspace(workspace);

    settings.index_url = env::var(ENV_INDEX_URL)
      .ok()
      .map(|url| url.trim().to_string())
      .filter(|url| !url.is_empty());
    if let Some(timeout) = duration_var(ENV_FETCH_TIMEOUT)? {
      settings.fetch_timeout = timeout;
    }
    settings.build_timeout = duration_var(ENV_BUILD_TIMEOUT)?;
    if let Ok(value) = env::var(ENV_FETCH_ATTEMPTS) {
      let attempts = value
        .trim()
        .parse::<u32>()
        .ok()
        .filter(|n| *n > 0)
        .ok_or(SettingsError::InvalidNumber {
          var: ENV_FETCH_ATTEMPTS,
          value,
        })?;
      settings.retry.max_attempts = attempts;
    }
    settings.gn = env::var_os(ENV_GN).map(PathBuf::from);
    settings.ninja = env::var_os(ENV_NINJA).map(PathBuf::from);

    Ok(settings)
  }
}

fn duration_var(var: &'static str) -> Result<Option<Duration>, SettingsError> {
  match env::var(var) {
    Ok(value) => humantime::parse_duration(value.trim())
      .map(Some)
      .map_err(|source| SettingsError::InvalidDuration { var, value, source }),
    Err(_) => Ok(None),
  }
}
