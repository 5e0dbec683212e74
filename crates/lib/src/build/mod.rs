//! Running the native build for named targets.
//!
//! [`BuildExecutor::start`] spawns the build tool and hands back a
//! [`BuildRun`] whose output can be consumed line by line while the build
//! runs. [`BuildRun::finish`] always yields a [`BuildResult`]: spawn
//! failures, non-zero exits, timeouts and cancellation are all reported as a
//! status rather than an error.

use std::collections::VecDeque;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{Notify, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::configure::Configuration;
use crate::consts::LOG_TAIL_LINES;
use crate::error::ErrorKind;
use crate::tool::process::{self, Exit};
use crate::tool::{BuildTool, ToolError, tool_env};
use crate::workspace::Workspace;

const BUILD_FILE: &str = "build.ninja";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildStatus {
  Success,
  Failure { code: Option<i32>, message: String },
  TimedOut { after: Duration },
  Cancelled,
}

impl BuildStatus {
  pub fn as_str(&self) -> &'static str {
    match self {
      BuildStatus::Success => "success",
      BuildStatus::Failure { .. } => "failure",
      BuildStatus::TimedOut { .. } => "timed-out",
      BuildStatus::Cancelled => "cancelled",
    }
  }
}

impl fmt::Display for BuildStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      BuildStatus::Success => write!(f, "success"),
      BuildStatus::Failure { message, .. } => write!(f, "failure: {message}"),
      BuildStatus::TimedOut { after } => write!(f, "timed out after {}", humantime::format_duration(*after)),
      BuildStatus::Cancelled => write!(f, "cancelled"),
    }
  }
}

/// Outcome of one build invocation.
#[derive(Debug, Clone)]
pub struct BuildResult {
  pub status: BuildStatus,
  pub targets: Vec<String>,
  /// Output files found for the requested targets.
  pub artifacts: Vec<PathBuf>,
  /// The last lines of combined tool output.
  pub log_tail: Vec<String>,
  pub elapsed: Duration,
}

impl BuildResult {
  /// A build refused before the tool was started.
  pub fn rejected(targets: &[String], message: impl Into<String>) -> Self {
    Self {
      status: BuildStatus::Failure {
        code: None,
        message: message.into(),
      },
      targets: targets.to_vec(),
      artifacts: Vec::new(),
      log_tail: Vec::new(),
      elapsed: Duration::ZERO,
    }
  }

  pub fn success(&self) -> bool {
    self.status == BuildStatus::Success
  }

  /// Error kind of an unsuccessful build.
  pub fn kind(&self) -> Option<ErrorKind> {
    match self.status {
      BuildStatus::Success => None,
      BuildStatus::TimedOut { .. } => Some(ErrorKind::Timeout),
      BuildStatus::Failure { .. } | BuildStatus::Cancelled => Some(ErrorKind::BuildFailure),
    }
  }

  /// The line that best explains a failure: the tool's last non-empty output
  /// line, or the status itself when the tool said nothing.
  pub fn diagnostic(&self) -> String {
    self
      .log_tail
      .iter()
      .rev()
      .find(|line| !line.trim().is_empty())
      .cloned()
      .unwrap_or_else(|| self.status.to_string())
  }
}

/// A build in progress.
pub struct BuildRun {
  lines: mpsc::Receiver<String>,
  tail: VecDeque<String>,
  cancel: Arc<Notify>,
  task: Option<JoinHandle<Result<Exit, ToolError>>>,
  rejected: Option<String>,
  timeout: Option<Duration>,
  targets: Vec<String>,
  out_dir: PathBuf,
  candidates: Vec<Vec<String>>,
  started: Instant,
}

impl BuildRun {
  /// The next line of tool output, or `None` once the tool's output is closed.
  pub async fn next_line(&mut self) -> Option<String> {
    let line = self.lines.recv().await?;
    self.remember(line.clone());
    Some(line)
  }

  /// Ask the running tool to stop; the result reports `Cancelled`.
  pub fn cancel(&self) {
    self.cancel.notify_one();
  }

  /// Wait for the build to end and collect its result.
  pub async fn finish(mut self) -> BuildResult {
    let outcome = match self.task.take() {
      Some(task) => {
        // Output ends when the runner drops its readers, at the latest when
        // the task returns.
        while let Some(line) = self.lines.recv().await {
          self.remember(line);
        }
        Some(task.await)
      }
      None => None,
    };

    let status = match outcome {
      Some(outcome) => match outcome {
        Ok(Ok(Exit::Code(Some(0)))) => BuildStatus::Success,
        Ok(Ok(Exit::Code(code))) => BuildStatus::Failure {
          code,
          message: match code {
            Some(code) => format!("build tool exited with code {code}"),
            None => "build tool was terminated by a signal".to_string(),
          },
        },
        Ok(Ok(Exit::TimedOut)) => BuildStatus::TimedOut {
          after: self.timeout.unwrap_or_default(),
        },
        Ok(Ok(Exit::Cancelled)) => BuildStatus::Cancelled,
        Ok(Err(err)) => BuildStatus::Failure {
          code: None,
          message: err.to_string(),
        },
        Err(err) => BuildStatus::Failure {
          code: None,
          message: format!("build task failed: {err}"),
        },
      },
      None => BuildStatus::Failure {
        code: None,
        message: self
          .rejected
          .take()
          .unwrap_or_else(|| "build was not started".to_string()),
      },
    };

    let artifacts = if status == BuildStatus::Success {
      self.find_artifacts()
    } else {
      Vec::new()
    };

    let result = BuildResult {
      status,
      targets: self.targets,
      artifacts,
      log_tail: self.tail.into(),
      elapsed: self.started.elapsed(),
    };
    info!(status = %result.status.as_str(), elapsed = ?result.elapsed, artifacts = result.artifacts.len(), "build finished");
    result
  }

  fn remember(&mut self, line: String) {
    if self.tail.len() == LOG_TAIL_LINES {
      self.tail.pop_front();
    }
    self.tail.push_back(line);
  }

  fn find_artifacts(&self) -> Vec<PathBuf> {
    let mut found = Vec::new();
    for (target, candidates) in self.targets.iter().zip(&self.candidates) {
      match candidates.iter().map(|name| self.out_dir.join(name)).find(|p| p.exists()) {
        Some(path) => found.push(path),
        None => debug!(target = %target, "no artifact found for target"),
      }
    }
    found
  }
}

pub struct BuildExecutor<'a, T> {
  tool: &'a T,
  timeout: Option<Duration>,
}

impl<'a, T: BuildTool> BuildExecutor<'a, T> {
  pub fn new(tool: &'a T, timeout: Option<Duration>) -> Self {
    Self { tool, timeout }
  }

  /// Build exactly `targets` of `configuration`, waiting for the result.
  pub async fn build(&self, workspace: &Workspace, configuration: &Configuration, targets: &[String]) -> BuildResult {
    self.start(workspace, configuration, targets).finish().await
  }

  /// Start building `targets`. Must be called inside a tokio runtime.
  pub fn start(&self, workspace: &Workspace, configuration: &Configuration, targets: &[String]) -> BuildRun {
    let (tx, rx) = mpsc::channel::<String>(process::OUTPUT_BUFFER);
    let cancel = Arc::new(Notify::new());
    let out_dir = configuration.out_dir.clone();

    let mut run = BuildRun {
      lines: rx,
      tail: VecDeque::new(),
      cancel: cancel.clone(),
      task: None,
      rejected: None,
      timeout: self.timeout,
      targets: targets.to_vec(),
      out_dir: out_dir.clone(),
      candidates: targets
        .iter()
        .map(|t| self.tool.artifact_candidates(t, configuration.platform.os))
        .collect(),
      started: Instant::now(),
    };

    if targets.is_empty() {
      warn!("no build targets requested");
      run.rejected = Some("no targets requested".to_string());
      return run;
    }
    if !out_dir.join(BUILD_FILE).is_file() {
      run.rejected = Some(format!(
        "{} has no generated build graph; run configure first",
        out_dir.display()
      ));
      return run;
    }

    let src = workspace.src_dir();
    let env = match tool_env(&src) {
      Ok(env) => env,
      Err(err) => {
        run.rejected = Some(err.to_string());
        return run;
      }
    };
    let command = self.tool.build_command(&src, &out_dir, targets).envs(env);
    info!(tool = self.tool.name(), platform = %configuration.platform, targets = ?targets, "starting build");

    let timeout = self.timeout;
    run.task = Some(tokio::spawn(async move {
      process::run(&command, tx, timeout, cancel).await
    }));
    run
  }
}
