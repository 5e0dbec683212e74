//! Filesystem helpers for publishing state atomically.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Path of the temporary sibling used while publishing `path`.
pub fn temp_sibling(path: &Path, suffix: &str) -> PathBuf {
  let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
  name.push(suffix);
  path.with_file_name(name)
}

/// Write `contents` to `path` so readers only ever see the old or the new
/// file: write to a temp sibling, fsync, then rename over the target.
pub fn write_atomic(path: &Path, contents: &[u8]) -> io::Result<()> {
  let temp_path = temp_sibling(path, ".tmp");
  {
    let mut file = fs::File::create(&temp_path)?;
    file.write_all(contents)?;
    file.sync_all()?;
  }
  fs::rename(&temp_path, path)
}

/// Remove a directory tree, treating "already gone" as success.
pub fn remove_dir_all_if_exists(path: &Path) -> io::Result<()> {
  match fs::remove_dir_all(path) {
    Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
    other => other,
  }
}
