use std::path::{Path, PathBuf};

use super::{BuildTool, ToolCommand, target_stem};
use crate::platform::TargetOs;

#[derive(Debug, Clone)]
pub struct Ninja {
  program: PathBuf,
}

impl Ninja {
  pub fn new(program: impl Into<PathBuf>) -> Self {
    Self {
      program: program.into(),
    }
  }
}

impl Default for Ninja {
  fn default() -> Self {
    Self::new("ninja")
  }
}

impl BuildTool for Ninja {
  fn name(&self) -> &str {
    "ninja"
  }

  /// `ninja -C <out> <targets...>`; only the named targets are built.
  fn build_command(&self, src_dir: &Path, out_dir: &Path, targets: &[String]) -> ToolCommand {
    ToolCommand::new(&self.program, src_dir)
      .arg("-C")
      .arg(out_dir.as_os_str())
      .args(targets.iter().map(String::as_str))
  }

  fn artifact_candidates(&self, target: &str, os: TargetOs) -> Vec<String> {
    let stem = target_stem(target);
    match os {
      TargetOs::Linux => vec![format!("lib{stem}.so"), format!("lib{stem}.a"), stem.to_string()],
      TargetOs::Mac => vec![
        format!("lib{stem}.dylib"),
        format!("lib{stem}.a"),
        format!("{stem}.app"),
        format!("{stem}.framework"),
        stem.to_string(),
      ],
      TargetOs::Win => vec![format!("{stem}.dll"), format!("{stem}.lib"), format!("{stem}.exe")],
    }
  }
}
