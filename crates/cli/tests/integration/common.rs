//! Shared test helpers for CLI integration tests.

use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use flate2::Compression;
use flate2::write::GzEncoder;
use mockito::{Mock, ServerGuard};
use sha2::{Digest, Sha256};
use tempfile::TempDir;

pub const VERSION: &str = "124.0.6315.2";

/// Graph generator stub: writes `build.ninja` into the output directory.
pub const STUB_GN: &str = r#"echo "gn $@" >> "$(dirname "$0")/gn.calls"
touch "$2/build.ninja""#;

/// Build tool stub: produces `lib<target>.so` for each requested target.
pub const STUB_NINJA: &str = r#"out="$2"
shift 2
for t in "$@"; do
  echo "[1/1] LINK lib$t.so"
  touch "$out/lib$t.so"
done"#;

/// Build a gzip tarball whose entries live under a single `top/` directory.
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
  let mut file = std::fs::File::create(&path).unwrap();
  writeln!(file, "#!/bin/sh\n{body}").unwrap();
  std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
  path
}

/// Isolated test environment.
///
/// Each test gets its own workspace, a directory of stub native tools, and a
/// local HTTP server standing in for the revision index.
pub struct TestEnv {
  pub server: ServerGuard,
  pub workspace: TempDir,
  pub tools: TempDir,
  mocks: Vec<Mock>,
}

impl TestEnv {
  pub fn new() -> Self {
    let tools = TempDir::new().unwrap();
    write_script(tools.path(), "gn", STUB_GN);
    write_script(tools.path(), "ninja", STUB_NINJA);
    Self {
      server: mockito::Server::new(),
      workspace: TempDir::new().unwrap(),
      tools,
      mocks: Vec::new(),
    }
  }

  /// Serve `VERSION` with a main tree and one dependency.
  pub fn with_release(mut self) -> Self {
    let src = tar_gz("chromium", &[("BUILD.gn", "# root"), ("base/base.gn", "# base")]);
    let ninja = tar_gz("ninja", &[("README", "ninja")]);
    let manifest = serde_json::json!({
      "version": VERSION,
      "source": { "url": "chromium.tar.gz", "sha256": sha256(&src) },
      "deps": [
        { "name": "ninja", "path": "third_party/ninja", "url": "ninja.tar.gz", "sha256": sha256(&ninja) },
      ]
    });

    self.serve(&format!("/{VERSION}/manifest.json"), 200, manifest.to_string().into_bytes());
    self.serve(&format!("/{VERSION}/chromium.tar.gz"), 200, src);
    self.serve(&format!("/{VERSION}/ninja.tar.gz"), 200, ninja);
    self
  }

  pub fn serve(&mut self, path: &str, status: usize, body: Vec<u8>) {
    let mock = self
      .server
      .mock("GET", path)
      .with_status(status)
      .with_body(body)
      .create();
    self.mocks.push(mock);
  }

  /// Replace the build tool stub.
  pub fn ninja(&self, body: &str) {
    write_script(self.tools.path(), "ninja", body);
  }

  pub fn gn_calls(&self) -> usize {
    std::fs::read_to_string(self.tools.path().join("gn.calls"))
      .map(|s| s.lines().count())
      .unwrap_or(0)
  }

  pub fn src_dir(&self) -> PathBuf {
    self.workspace.path().join("src")
  }

  /// Get a pre-configured Command for the chromaforge binary.
  ///
  /// Points the index at the local server, the native tools at the stubs, and
  /// disables fetch retries so failures surface immediately.
  pub fn chromaforge_cmd(&self) -> Command {
    let mut cmd: Command = cargo_bin_cmd!("chromaforge");
    cmd.env("CHROMAFORGE_WORKSPACE", self.workspace.path());
    cmd.env("CHROMAFORGE_INDEX_URL", self.server.url());
    cmd.env("CHROMAFORGE_GN", self.tools.path().join("gn"));
    cmd.env("CHROMAFORGE_NINJA", self.tools.path().join("ninja"));
    cmd.env("CHROMAFORGE_FETCH_ATTEMPTS", "1");
    cmd.env_remove("CHROMAFORGE_BUILD_TIMEOUT");
    cmd.env_remove("RUST_LOG");
    cmd
  }

  pub fn bootstrap(&self) -> assert_cmd::assert::Assert {
    self
      .chromaforge_cmd()
      .args(["bootstrap", "--revision", VERSION, "--target-cpu", "x64", "--target-os", "linux"])
      .assert()
  }

  pub fn configure(&self, extra: &[&str]) -> assert_cmd::assert::Assert {
    self
      .chromaforge_cmd()
      .args(["configure", "--target-cpu", "x64", "--target-os", "linux"])
      .args(extra)
      .assert()
  }
}
