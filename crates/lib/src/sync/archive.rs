//! Archive extraction.
//!
//! Supports xz- and gzip-compressed and plain tarballs, detected by content
//! rather than file name since downloads are stored under their pin. The first
//! path component (e.g. `chromium-124.0.6315.2/`) is stripped.
//!
//! Nothing is written outside the destination: symlinks must stay inside the
//! tree, hard links are resolved against the destination, and no entry is
//! written through an existing symlink.

use std::fs::{self, File};
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::{Component, Path, PathBuf};

use flate2::read::GzDecoder;
use tar::{Archive, Entry, EntryType};
use tracing::{debug, warn};
use xz2::read::XzDecoder;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
const XZ_MAGIC: [u8; 6] = [0xfd, 0x37, 0x7a, 0x58, 0x5a, 0x00];
const PROGRESS_INTERVAL: usize = 5000;

/// Unpack `archive_path` into `dest`, returning the number of entries written.
pub fn unpack(archive_path: &Path, dest: &Path) -> io::Result<usize> {
  fs::create_dir_all(dest)?;

  let mut file = File::open(archive_path)?;
  let mut magic = [0u8; 6];
  let read = read_prefix(&mut file, &mut magic)?;
  file.seek(SeekFrom::Start(0))?;

  let reader = BufReader::new(file);
  let count = if read == XZ_MAGIC.len() && magic == XZ_MAGIC {
    unpack_entries(Archive::new(XzDecoder::new(reader)), dest)?
  } else if read >= GZIP_MAGIC.len() && magic[..2] == GZIP_MAGIC {
    unpack_entries(Archive::new(GzDecoder::new(reader)), dest)?
  } else {
    unpack_entries(Archive::new(reader), dest)?
  };

  debug!(archive = %archive_path.display(), dest = %dest.display(), entries = count, "unpacked archive");
  Ok(count)
}

/// Fill `buf` as far as the file allows, returning how much was read.
fn read_prefix(file: &mut File, buf: &mut [u8]) -> io::Result<usize> {
  let mut filled = 0;
  while filled < buf.len() {
    match file.read(&mut buf[filled..]) {
      Ok(0) => break,
      Ok(n) => filled += n,
      Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
      Err(e) => return Err(e),
    }
  }
  Ok(filled)
}

fn unpack_entries<R: Read>(mut archive: Archive<R>, dest: &Path) -> io::Result<usize> {
  let mut count = 0;

  for entry in archive.entries()? {
    let mut entry = entry?;
    let stripped = strip_first_component(&entry.path()?)?;

    if stripped.as_os_str().is_empty() {
      continue;
    }

    if let Some(link) = symlinked_ancestor(dest, &stripped) {
      return Err(io::Error::new(
        io::ErrorKind::InvalidData,
        format!(
          "archive entry {} would be written through symlink {}",
          stripped.display(),
          link.display()
        ),
      ));
    }

    let dest_path = dest.join(&stripped);

    if let Some(parent) = dest_path.parent() {
      fs::create_dir_all(parent)?;
    }
    // A later entry replaces an earlier symlink rather than following it.
    if fs::symlink_metadata(&dest_path).is_ok_and(|m| m.file_type().is_symlink()) {
      fs::remove_file(&dest_path)?;
    }

    let entry_type = entry.header().entry_type();
    let result = match entry_type {
      EntryType::Symlink => unpack_symlink(&mut entry, &stripped, &dest_path),
      EntryType::Link => unpack_hard_link(&entry, dest, &dest_path),
      _ => entry.unpack(&dest_path).map(|_| ()),
    };
    match result {
      Ok(()) => {}
      // Tarballs produced on Linux carry links that cannot always be
      // materialized on other hosts, and links leaving the tree are dropped.
      Err(err) if matches!(entry_type, EntryType::Symlink | EntryType::Link) => {
        warn!(path = %stripped.display(), error = %err, "skipping link entry");
      }
      Err(err) => return Err(err),
    }

    count += 1;
    if count % PROGRESS_INTERVAL == 0 {
      debug!(entries = count, "extracting");
    }
  }

  Ok(count)
}

fn unpack_symlink<R: Read>(entry: &mut Entry<'_, R>, stripped: &Path, dest_path: &Path) -> io::Result<()> {
  let target = entry
    .link_name()?
    .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "symlink entry without a target"))?
    .into_owned();
  if !stays_inside(stripped, &target) {
    return Err(io::Error::new(
      io::ErrorKind::InvalidData,
      format!("symlink target {} leaves the destination", target.display()),
    ));
  }
  entry.unpack(dest_path).map(|_| ())
}

/// Hard link targets name another entry of the same archive, so they are
/// resolved against the destination rather than the working directory.
fn unpack_hard_link<R: Read>(entry: &Entry<'_, R>, dest: &Path, dest_path: &Path) -> io::Result<()> {
  let target = entry
    .link_name()?
    .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "hard link entry without a target"))?;
  let target = strip_first_component(&target)?;
  if target.as_os_str().is_empty() {
    return Err(io::Error::new(io::ErrorKind::InvalidData, "hard link to the archive root"));
  }
  if let Some(link) = symlinked_ancestor(dest, &target) {
    return Err(io::Error::new(
      io::ErrorKind::InvalidData,
      format!("hard link target passes through symlink {}", link.display()),
    ));
  }
  let source = dest.join(&target);
  if fs::symlink_metadata(&source).is_ok_and(|m| m.file_type().is_symlink()) {
    return Err(io::Error::new(
      io::ErrorKind::InvalidData,
      format!("hard link target {} is a symlink", target.display()),
    ));
  }
  fs::hard_link(source, dest_path)
}

/// The first existing directory component of `relative` under `dest` that is a
/// symlink, if any.
fn symlinked_ancestor(dest: &Path, relative: &Path) -> Option<PathBuf> {
  let mut current = dest.to_path_buf();
  let parent = relative.parent()?;
  for component in parent.components() {
    current.push(component);
    match fs::symlink_metadata(&current) {
      Ok(meta) if meta.file_type().is_symlink() => return Some(current),
      Ok(_) => {}
      Err(_) => return None,
    }
  }
  None
}

/// Whether a symlink at `link` (relative to the destination) pointing at
/// `target` resolves inside the destination, judged lexically.
fn stays_inside(link: &Path, target: &Path) -> bool {
  let mut depth = link.components().count().saturating_sub(1);
  for component in target.components() {
    match component {
      Component::Normal(_) => depth += 1,
      Component::CurDir => {}
      Component::ParentDir => {
        if depth == 0 {
          return false;
        }
        depth -= 1;
      }
      Component::RootDir | Component::Prefix(_) => return false,
    }
  }
  true
}

/// Drop the archive's top-level directory, rejecting entries that would
/// escape the destination.
fn strip_first_component(path: &Path) -> io::Result<PathBuf> {
  let mut stripped = PathBuf::new();
  for component in path.components().skip(1) {
    match component {
      Component::Normal(part) => stripped.push(part),
      Component::CurDir => {}
      _ => {
        return Err(io::Error::new(
          io::ErrorKind::InvalidData,
          format!("archive entry escapes destination: {}", path.display()),
        ));
      }
    }
  }
  Ok(stripped)
}
