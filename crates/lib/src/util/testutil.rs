//! Test utilities for chromaforge-lib.
//!
//! Provides an in-memory [`SourceHost`] that counts requests, helpers for
//! building gzip and xz tarballs, and stub native tools written as shell scripts.

use std::collections::{HashMap, HashSet};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use flate2::Compression;
use flate2::write::GzEncoder;
use xz2::write::XzEncoder;

use crate::host::{HostError, SourceHost};
use crate::util::hash::hash_bytes;

#[derive(Default)]
struct StubState {
  bodies: HashMap<String, Vec<u8>>,
  transient_failures: HashMap<String, u32>,
  hanging: HashSet<String>,
  write_failures: HashMap<String, io::ErrorKind>,
  calls: HashMap<String, u32>,
}

/// A source host serving canned bodies and counting every request.
#[derive(Default)]
pub struct StubHost {
  state: Mutex<StubState>,
}

impl StubHost {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn insert(&self, url: &str, body: impl Into<Vec<u8>>) {
    self.state.lock().unwrap().bodies.insert(url.to_string(), body.into());
  }

  /// Make the next `count` requests for `url` fail as if the network dropped.
  pub fn fail_transiently(&self, url: &str, count: u32) {
    self.state.lock().unwrap().transient_failures.insert(url.to_string(), count);
  }

  /// Make every request for `url` wait forever.
  pub fn hang(&self, url: &str) {
    self.state.lock().unwrap().hanging.insert(url.to_string());
  }

  /// Make downloads of `url` fail locally with `kind`, as a full disk would.
  pub fn fail_writes(&self, url: &str, kind: io::ErrorKind) {
    self.state.lock().unwrap().write_failures.insert(url.to_string(), kind);
  }

  pub fn calls(&self, url: &str) -> u32 {
    self.state.lock().unwrap().calls.get(url).copied().unwrap_or(0)
  }

  pub fn total_calls(&self) -> u32 {
    self.state.lock().unwrap().calls.values().sum()
  }

  /// `None` means the request never completes.
  fn respond(&self, url: &str) -> Option<Result<Vec<u8>, HostError>> {
    let mut state = self.state.lock().unwrap();
    *state.calls.entry(url.to_string()).or_default() += 1;

    if state.hanging.contains(url) {
      return None;
    }

    if let Some(remaining) = state.transient_failures.get_mut(url)
      && *remaining > 0
    {
      *remaining -= 1;
      return Some(Err(HostError::Network {
        url: url.to_string(),
        message: "connection reset".to_string(),
      }));
    }

    Some(
      state
        .bodies
        .get(url)
        .cloned()
        .ok_or_else(|| HostError::NotFound { url: url.to_string() }),
    )
  }

  fn write_failure(&self, url: &str) -> Option<io::ErrorKind> {
    self.state.lock().unwrap().write_failures.get(url).copied()
  }
}

impl SourceHost for StubHost {
  async fn get(&self, url: &str) -> Result<Vec<u8>, HostError> {
    match self.respond(url) {
      Some(reply) => reply,
      None => std::future::pending().await,
    }
  }

  async fn download(&self, url: &str, dest: &Path) -> Result<u64, HostError> {
    let body = match self.respond(url) {
      Some(reply) => reply?,
      None => std::future::pending().await,
    };
    if let Some(kind) = self.write_failure(url) {
      return Err(HostError::Io {
        path: dest.to_path_buf(),
        source: io::Error::from(kind),
      });
    }
    std::fs::write(dest, &body).map_err(|source| HostError::Io {
      path: dest.to_path_buf(),
      source,
    })?;
    Ok(body.len() as u64)
  }
}

/// Build a plain tarball whose entries live under a single top-level directory.
fn tar_plain(top: &str, files: &[(&str, &str)]) -> Vec<u8> {
  let mut builder = tar::Builder::new(Vec::new());
  for (path, content) in files {
    let mut header = tar::Header::new_gnu();
    header.set_size(content.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder
      .append_data(&mut header, format!("{top}/{path}"), content.as_bytes())
      .unwrap();
  }
  builder.into_inner().unwrap()
}

pub fn tar_gz(top: &str, files: &[(&str, &str)]) -> Vec<u8> {
  let mut encoder = GzEncoder::new(Vec::new(), Compression::fast());
  encoder.write_all(&tar_plain(top, files)).unwrap();
  encoder.finish().unwrap()
}

pub fn tar_xz(top: &str, files: &[(&str, &str)]) -> Vec<u8> {
  let mut encoder = XzEncoder::new(Vec::new(), 1);
  encoder.write_all(&tar_plain(top, files)).unwrap();
  encoder.finish().unwrap()
}

pub fn sha256(bytes: &[u8]) -> String {
  hash_bytes(bytes).0
}

/// Write an executable shell script and return its path.
#[cfg(unix)]
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
  use std::os::unix::fs::PermissionsExt;

  let path = dir.join(name);
  std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
  std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
  path
}
