//! The native build tools.
//!
//! [`GraphGenerator`] (gn) and [`BuildTool`] (ninja) only translate a request
//! into a [`ToolCommand`]. Spawning, output streaming, timeouts and
//! cancellation live in [`process`] and are shared by both.

mod gn;
mod ninja;
pub mod process;

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::error::{Classify, ErrorKind};
use crate::platform::TargetOs;

pub use gn::Gn;
pub use ninja::Ninja;

#[derive(Debug, Error)]
pub enum ToolError {
  #[error("failed to start {}: {source}", program.display())]
  Spawn {
    program: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed waiting for {}: {source}", program.display())]
  Wait {
    program: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("cannot build tool PATH: {0}")]
  Path(#[from] std::env::JoinPathsError),
}

impl Classify for ToolError {
  fn kind(&self) -> ErrorKind {
    match self {
      ToolError::Spawn { .. } | ToolError::Path(_) => ErrorKind::Configuration,
      ToolError::Wait { .. } => ErrorKind::BuildFailure,
    }
  }
}

/// A fully specified invocation of a native tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
  pub program: PathBuf,
  pub args: Vec<OsString>,
  pub cwd: PathBuf,
  pub env: BTreeMap<String, OsString>,
}

impl ToolCommand {
  pub fn new(program: impl Into<PathBuf>, cwd: impl Into<PathBuf>) -> Self {
    Self {
      program: program.into(),
      args: Vec::new(),
      cwd: cwd.into(),
      env: BTreeMap::new(),
    }
  }

  pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
    self.args.push(arg.into());
    self
  }

  pub fn args<I, S>(mut self, args: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<OsString>,
  {
    self.args.extend(args.into_iter().map(Into::into));
    self
  }

  pub fn envs(mut self, env: BTreeMap<String, OsString>) -> Self {
    self.env.extend(env);
    self
  }

  /// Human readable rendering for logs.
  pub fn display(&self) -> String {
    let mut parts = vec![self.program.display().to_string()];
    parts.extend(self.args.iter().map(|a| a.to_string_lossy().into_owned()));
    parts.join(" ")
  }
}

/// Turns a source tree into a build graph in an output directory.
pub trait GraphGenerator: Send + Sync {
  fn name(&self) -> &str;

  fn generate_command(&self, src_dir: &Path, out_dir: &Path) -> ToolCommand;
}

/// Builds named targets of a generated build graph.
pub trait BuildTool: Send + Sync {
  fn name(&self) -> &str;

  fn build_command(&self, src_dir: &Path, out_dir: &Path, targets: &[String]) -> ToolCommand;

  /// File names `target` may produce in the output directory on `os`.
  fn artifact_candidates(&self, target: &str, os: TargetOs) -> Vec<String>;
}

/// Environment the toolchain expects when run from a synced tree.
pub fn tool_env(src_dir: &Path) -> Result<BTreeMap<String, OsString>, ToolError> {
  let mut env = BTreeMap::new();
  env.insert("DEPOT_TOOLS_UPDATE".to_string(), OsString::from("0"));
  env.insert("DEPOT_TOOLS_WIN_TOOLCHAIN".to_string(), OsString::from("0"));
  env.insert(
    "CHROMIUM_BUILDTOOLS_PATH".to_string(),
    src_dir.join("buildtools").into_os_string(),
  );

  let mut path = vec![
    src_dir.join("third_party").join("ninja"),
    src_dir.join("third_party").join("depot_tools"),
  ];
  if let Some(existing) = std::env::var_os("PATH") {
    path.extend(std::env::split_paths(&existing));
  }
  env.insert("PATH".to_string(), std::env::join_paths(path)?);
  Ok(env)
}

/// The last path segment of a gn label (`//base:base_unittests` -> `base_unittests`).
pub(crate) fn target_stem(target: &str) -> &str {
  target.rsplit([':', '/']).next().unwrap_or(target)
}
