//! bootstrap → configure → build through the binary.

use predicates::prelude::*;

use super::common::{TestEnv, VERSION, sha256, tar_gz};

#[test]
fn bootstrap_configure_build() {
  let env = TestEnv::new().with_release();

  env
    .bootstrap()
    .success()
    .stdout(predicate::str::contains(format!("synced to {VERSION}")));
  assert!(env.src_dir().join("BUILD.gn").is_file());
  assert!(env.src_dir().join("third_party/ninja/README").is_file());

  env.configure(&[]).success().stdout(predicate::str::contains("Configured linux-x64"));
  let args = std::fs::read_to_string(env.workspace.path().join("out/linux-x64/args.gn")).unwrap();
  assert!(args.contains("target_cpu = \"x64\""));

  env
    .chromaforge_cmd()
    .args(["build", "base"])
    .assert()
    .success()
    .stdout(predicate::str::contains("[1/1] LINK libbase.so"))
    .stdout(predicate::str::contains("Built base"));
  assert!(env.workspace.path().join("out/linux-x64/libbase.so").is_file());
}

#[test]
fn repeated_bootstrap_and_configure_are_idempotent() {
  let env = TestEnv::new().with_release();

  env.bootstrap().success();
  env.bootstrap().success();

  env.configure(&[]).success();
  env.configure(&[]).success().stdout(predicate::str::contains("up to date"));
  assert_eq!(env.gn_calls(), 1);

  env
    .configure(&["--config", "debug"])
    .success()
    .stdout(predicate::str::contains("debug"));
  assert_eq!(env.gn_calls(), 2);
}

#[test]
fn tarball_bootstrap_without_index() {
  let mut env = TestEnv::new();
  let src = tar_gz("chromium-124.0.6315.2", &[("BUILD.gn", "# root")]);
  let digest = sha256(&src);
  env.serve("/tarballs/chromium-124.0.6315.2.tar.gz", 200, src);
  let url = format!("{}/tarballs/chromium-124.0.6315.2.tar.gz", env.server.url());

  env
    .chromaforge_cmd()
    .env_remove("CHROMAFORGE_INDEX_URL")
    .args(["bootstrap", "--target-cpu", "x64", "--target-os", "linux"])
    .args(["--tarball-url", &url, "--sha256", &digest])
    .assert()
    .success()
    .stdout(predicate::str::contains("synced to chromium-124.0.6315.2"));
  assert!(env.src_dir().join("BUILD.gn").is_file());

  env.configure(&[]).success();
}

#[test]
fn unknown_revision_exits_10() {
  let mut env = TestEnv::new();
  env.serve("/124.0.9999.0/manifest.json", 404, Vec::new());

  env
    .chromaforge_cmd()
    .args(["bootstrap", "--revision", "124.0.9999.0", "--target-cpu", "x64"])
    .assert()
    .code(10)
    .stderr(predicate::str::contains("error[lookup-error]"));
}

#[test]
fn corrupt_archive_exits_11() {
  let mut env = TestEnv::new();
  let manifest = serde_json::json!({
    "version": VERSION,
    "source": { "url": "chromium.tar.gz", "sha256": "0".repeat(64) },
  });
  env.serve(&format!("/{VERSION}/manifest.json"), 200, manifest.to_string().into_bytes());
  env.serve(&format!("/{VERSION}/chromium.tar.gz"), 200, b"not the pinned bytes".to_vec());

  env
    .bootstrap()
    .code(11)
    .stderr(predicate::str::contains("error[integrity-error]"));
  assert!(!env.src_dir().join("BUILD.gn").exists());
}

#[test]
fn unsupported_option_exits_12() {
  let env = TestEnv::new().with_release();
  env.bootstrap().success();

  env
    .configure(&["--option", "use_goma=true"])
    .code(12)
    .stderr(predicate::str::contains("error[configuration-error]"));
  assert!(!env.workspace.path().join("out/linux-x64/args.gn").exists());
}

#[test]
fn failing_build_exits_13_with_last_line() {
  let env = TestEnv::new().with_release();
  env.bootstrap().success();
  env.configure(&[]).success();
  env.ninja("echo '[1/2] CXX base.o'\necho 'FAILED: obj/base/base.o'\nexit 1");

  env
    .chromaforge_cmd()
    .args(["build", "base"])
    .assert()
    .code(13)
    .stdout(predicate::str::contains("[1/2] CXX base.o"))
    .stderr(predicate::str::contains("error[build-failure]: FAILED: obj/base/base.o"));
}

#[test]
fn build_timeout_exits_14() {
  let env = TestEnv::new().with_release();
  env.bootstrap().success();
  env.configure(&[]).success();
  env.ninja("echo started\nsleep 30");

  env
    .chromaforge_cmd()
    .args(["build", "base", "--timeout", "500ms"])
    .timeout(std::time::Duration::from_secs(20))
    .assert()
    .code(14)
    .stderr(predicate::str::contains("error[timeout-error]"));
}

#[test]
fn status_reports_sync_and_configuration() {
  let env = TestEnv::new().with_release();
  env.bootstrap().success();
  env.configure(&[]).success();

  let output = env.chromaforge_cmd().args(["status", "--output", "json"]).output().unwrap();
  assert!(output.status.success());

  let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
  assert_eq!(json["sync"]["revision"]["version"], VERSION);
  assert_eq!(json["sync"]["verified"], true);
  assert_eq!(json["configuration"]["options"]["build_type"], "release");
}
