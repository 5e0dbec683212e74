use std::path::{Path, PathBuf};

use super::{GraphGenerator, ToolCommand};

#[derive(Debug, Clone)]
pub struct Gn {
  program: PathBuf,
}

impl Gn {
  pub fn new(program: impl Into<PathBuf>) -> Self {
    Self {
      program: program.into(),
    }
  }
}

impl Default for Gn {
  /// `gn` as found on the tool PATH (depot_tools ships a batch wrapper on Windows).
  fn default() -> Self {
    if cfg!(windows) { Self::new("gn.bat") } else { Self::new("gn") }
  }
}

impl GraphGenerator for Gn {
  fn name(&self) -> &str {
    "gn"
  }

  fn generate_command(&self, src_dir: &Path, out_dir: &Path) -> ToolCommand {
    ToolCommand::new(&self.program, src_dir)
      .arg("gen")
      .arg(out_dir.as_os_str())
  }
}
