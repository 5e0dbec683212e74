//! The full pipeline through [`Orchestrator`] with stub native tools.

use std::collections::BTreeMap;

use chromaforge_lib::build::BuildStatus;
use chromaforge_lib::error::{Classify, ErrorKind};
use chromaforge_lib::host::HttpSourceHost;
use chromaforge_lib::orchestrator::{EXIT_BUILD_FAILED, EXIT_CONFIGURE_FAILED, Orchestrator};
use chromaforge_lib::tool::{Gn, Ninja};
use mockito::{Mock, ServerGuard};
use tempfile::TempDir;

use super::common::{Release, STUB_GN, STUB_NINJA, VERSION, linux_x64, settings, write_script};

struct Fixture {
  server: ServerGuard,
  _mocks: Vec<Mock>,
  workspace: TempDir,
  tools: TempDir,
}

impl Fixture {
  async fn new() -> Self {
    let mut server = mockito::Server::new_async().await;
    let release = Release::new();
    let mut mocks = Vec::new();
    for (name, body) in [
      ("manifest.json", release.manifest().into_bytes()),
      ("chromium.tar.gz", release.src),
      ("ninja.tar.gz", release.ninja),
    ] {
      let mock = server
        .mock("GET", format!("/{VERSION}/{name}").as_str())
        .with_body(body)
        .create_async()
        .await;
      mocks.push(mock);
    }

    Self {
      server,
      _mocks: mocks,
      workspace: TempDir::new().unwrap(),
      tools: TempDir::new().unwrap(),
    }
  }

  fn orchestrator(&self, ninja_body: &str) -> Orchestrator<HttpSourceHost, Gn, Ninja> {
    let gn = Gn::new(write_script(self.tools.path(), "gn", STUB_GN));
    let ninja = Ninja::new(write_script(self.tools.path(), "ninja", ninja_body));
    Orchestrator::with_parts(
      settings(self.workspace.path(), &self.server.url()),
      HttpSourceHost::new().unwrap(),
      gn,
      ninja,
      "test",
    )
    .unwrap()
  }
}

#[tokio::test]
async fn run_produces_artifacts_for_requested_targets() {
  let fx = Fixture::new().await;
  let orchestrator = fx.orchestrator(STUB_NINJA);

  let result = orchestrator
    .run(VERSION, linux_x64(), &BTreeMap::new(), &["base".to_string()])
    .await
    .unwrap();

  assert_eq!(result.status, BuildStatus::Success);
  assert_eq!(result.targets, vec!["base".to_string()]);
  assert_eq!(result.artifacts.len(), 1);
  assert!(result.artifacts[0].ends_with("out/linux-x64/libbase.so"));
}

#[tokio::test]
async fn configure_is_rejected_before_touching_the_tree() {
  let fx = Fixture::new().await;
  let orchestrator = fx.orchestrator(STUB_NINJA);
  orchestrator.bootstrap(VERSION, linux_x64()).await.unwrap();

  let options = BTreeMap::from([("thin_lto".to_string(), "maybe".to_string())]);
  let err = orchestrator.configure(linux_x64(), &options).await.unwrap_err();

  assert_eq!(err.kind(), ErrorKind::Configuration);
  assert_eq!(err.exit_code(), EXIT_CONFIGURE_FAILED);
  assert!(orchestrator.last_configuration().unwrap().is_none());
}

#[tokio::test]
async fn failing_build_keeps_the_log_tail() {
  let fx = Fixture::new().await;
  let orchestrator = fx.orchestrator("echo 'compiling'\necho 'FAILED: obj/base/a.o'\nexit 1");
  orchestrator.bootstrap(VERSION, linux_x64()).await.unwrap();
  orchestrator.configure(linux_x64(), &BTreeMap::new()).await.unwrap();

  let err = orchestrator.build(&["base".to_string()]).await.unwrap_err();

  assert_eq!(err.kind(), ErrorKind::BuildFailure);
  assert_eq!(err.exit_code(), EXIT_BUILD_FAILED);
  assert_eq!(err.diagnostic(), "FAILED: obj/base/a.o");
}
