//! Shared fixtures: release archives, stub native tools and settings.

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use flate2::Compression;
use flate2::write::GzEncoder;
use sha2::{Digest, Sha256};

use chromaforge_lib::platform::{Platform, TargetCpu, TargetOs};
use chromaforge_lib::retry::RetryPolicy;
use chromaforge_lib::settings::Settings;

pub const VERSION: &str = "124.0.6315.2";

pub const STUB_GN: &str = r#"touch "$2/build.ninja""#;
pub const STUB_NINJA: &str = r#"out="$2"
shift 2
for t in "$@"; do touch "$out/lib$t.so"; done"#;

pub fn tar_gz(top: &str, files: &[(&str, &str)]) -> Vec<u8> {
  let encoder = GzEncoder::new(Vec::new(), Compression::fast());
  let mut builder = tar::Builder::new(encoder);
  for (name, content) in files {
    let mut header = tar::Header::new_gnu();
    header.set_size(content.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder
      .append_data(&mut header, format!("{top}/{name}"), content.as_bytes())
      .unwrap();
  }
  builder.into_inner().unwrap().finish().unwrap()
}

pub fn sha256(bytes: &[u8]) -> String {
  hex::encode(Sha256::digest(bytes))
}

pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
  let path = dir.join(name);
  std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
  std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
  path
}

pub fn linux_x64() -> Platform {
  Platform::new(TargetOs::Linux, TargetCpu::X64)
}

/// Settings rooted at `workspace`, pointing at `index_url`, with no retries.
pub fn settings(workspace: &Path, index_url: &str) -> Settings {
  let mut settings = Settings::with_workspace(workspace.to_path_buf());
  settings.index_url = Some(index_url.to_string());
  settings.fetch_timeout = Duration::from_secs(10);
  settings.build_timeout = Some(Duration::from_secs(10));
  settings.retry = RetryPolicy::none();
  settings
}

/// Archives of one release: the main tree plus a nested `ninja` dependency.
pub struct Release {
  pub src: Vec<u8>,
  pub ninja: Vec<u8>,
}

impl Release {
  pub fn new() -> Self {
    Self {
      src: tar_gz("chromium", &[("BUILD.gn", "# root"), ("base/base.gn", "# base")]),
      ninja: tar_gz("ninja", &[("README", "ninja")]),
    }
  }

  pub fn manifest(&self) -> String {
    serde_json::json!({
      "version": VERSION,
      "source": { "url": "chromium.tar.gz", "sha256": sha256(&self.src) },
      "deps": [
        { "name": "ninja", "path": "third_party/ninja", "url": "ninja.tar.gz", "sha256": sha256(&self.ninja) },
        { "name": "mac_sdk", "path": "build/mac_files", "url": "mac_sdk.tar.gz",
          "sha256": "a".repeat(64), "os": ["mac"] }
      ]
    })
    .to_string()
  }
}
