//! Running a [`ToolCommand`] with streamed output.
//!
//! Stdout and stderr are forwarded line by line, interleaved, into a channel
//! while the child runs. The child is killed when the timeout elapses or the
//! run is cancelled. On unix the child leads its own process group so the
//! compilers it spawned go down with it.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{Notify, mpsc};
use tracing::{debug, warn};

use super::{ToolCommand, ToolError};

/// Bound on waiting for output readers after the child is gone.
const DRAIN_GRACE: Duration = Duration::from_secs(5);

/// Capacity of an output channel. A consumer that falls this far behind
/// applies backpressure to the tool's pipes.
pub const OUTPUT_BUFFER: usize = 1024;

/// How a tool process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
  /// Exited on its own. `None` when terminated by a signal.
  Code(Option<i32>),
  TimedOut,
  Cancelled,
}

impl Exit {
  pub fn success(&self) -> bool {
    matches!(self, Exit::Code(Some(0)))
  }
}

enum Stop {
  Exited(std::io::Result<std::process::ExitStatus>),
  TimedOut,
  Cancelled,
}

/// Run `command` to completion, sending every output line to `lines`.
///
/// The receiver must be drained while this runs; once every sender is gone
/// the receiver sees the end of output. Returns an error only when the process
/// could not be started or waited on.
pub async fn run(
  command: &ToolCommand,
  lines: mpsc::Sender<String>,
  timeout: Option<Duration>,
  cancel: Arc<Notify>,
) -> Result<Exit, ToolError> {
  debug!(cmd = %command.display(), cwd = %command.cwd.display(), "spawning tool");

  let mut cmd = Command::new(&command.program);
  cmd
    .args(&command.args)
    .current_dir(&command.cwd)
    .envs(&command.env)
    .stdin(Stdio::null())
    .stdout(Stdio::piped())
    .stderr(Stdio::piped())
    .kill_on_drop(true);
  #[cfg(unix)]
  cmd.process_group(0);

  let mut child = cmd.spawn().map_err(|source| ToolError::Spawn {
    program: command.program.clone(),
    source,
  })?;

  let mut readers = Vec::new();
  if let Some(stdout) = child.stdout.take() {
    readers.push(tokio::spawn(forward(stdout, lines.clone())));
  }
  if let Some(stderr) = child.stderr.take() {
    readers.push(tokio::spawn(forward(stderr, lines)));
  }

  let deadline = async {
    match timeout {
      Some(after) => tokio::time::sleep(after).await,
      None => std::future::pending().await,
    }
  };

  let stop = tokio::select! {
    status = child.wait() => Stop::Exited(status),
    _ = deadline => Stop::TimedOut,
    _ = cancel.notified() => Stop::Cancelled,
  };

  let exit = match stop {
    Stop::Exited(status) => {
      let status = status.map_err(|source| ToolError::Wait {
        program: command.program.clone(),
        source,
      })?;
      Exit::Code(status.code())
    }
    Stop::TimedOut => {
      warn!(cmd = %command.display(), "tool timed out, killing");
      terminate(&mut child).await;
      Exit::TimedOut
    }
    Stop::Cancelled => {
      warn!(cmd = %command.display(), "tool cancelled, killing");
      terminate(&mut child).await;
      Exit::Cancelled
    }
  };

  // Aborting a stuck reader drops its sender so consumers see the end of output.
  for reader in readers {
    let abort = reader.abort_handle();
    if tokio::time::timeout(DRAIN_GRACE, reader).await.is_err() {
      debug!("output reader still open after exit, abandoning");
      abort.abort();
    }
  }

  debug!(?exit, "tool finished");
  Ok(exit)
}

async fn forward<R: AsyncRead + Unpin>(reader: R, lines: mpsc::Sender<String>) {
  let mut reader = BufReader::new(reader).lines();
  while let Ok(Some(line)) = reader.next_line().await {
    if lines.send(line).await.is_err() {
      break;
    }
  }
}

async fn terminate(child: &mut Child) {
  #[cfg(unix)]
  if let Some(pid) = child.id().and_then(|id| rustix::process::Pid::from_raw(id as i32)) {
    let _ = rustix::process::kill_process_group(pid, rustix::process::Signal::KILL);
  }
  let _ = child.kill().await;
}
