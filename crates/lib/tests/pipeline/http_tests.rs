//! Resolve and sync through [`HttpSourceHost`].

use std::time::Duration;

use chromaforge_lib::error::{Classify, ErrorKind};
use chromaforge_lib::host::HttpSourceHost;
use chromaforge_lib::retry::RetryPolicy;
use chromaforge_lib::revision::{ResolveError, RevisionResolver};
use chromaforge_lib::sync::SourceSynchronizer;
use chromaforge_lib::workspace::Workspace;
use tempfile::TempDir;

use super::common::{Release, VERSION, linux_x64, sha256};

#[tokio::test]
async fn relative_archive_urls_resolve_against_the_manifest() {
  let mut server = mockito::Server::new_async().await;
  let release = Release::new();
  let _manifest = server
    .mock("GET", format!("/{VERSION}/manifest.json").as_str())
    .with_body(release.manifest())
    .create_async()
    .await;

  let host = HttpSourceHost::new().unwrap();
  let index = server.url();
  let revision = RevisionResolver::new(&host, &index, Duration::from_secs(5), RetryPolicy::none())
    .resolve(VERSION)
    .await
    .unwrap();

  assert_eq!(revision.version(), VERSION);
  assert_eq!(revision.source().url, format!("{index}/{VERSION}/chromium.tar.gz"));
  assert_eq!(revision.source().sha256, sha256(&release.src));
  assert_eq!(revision.deps().len(), 2);
}

#[tokio::test]
async fn missing_index_entry_is_a_lookup_error() {
  let mut server = mockito::Server::new_async().await;
  let _missing = server
    .mock("GET", "/124.0.0.1/manifest.json")
    .with_status(404)
    .create_async()
    .await;

  let host = HttpSourceHost::new().unwrap();
  let index = server.url();
  let err = RevisionResolver::new(&host, &index, Duration::from_secs(5), RetryPolicy::none())
    .resolve("124.0.0.1")
    .await
    .unwrap_err();

  assert!(matches!(err, ResolveError::UnknownRevision { .. }));
  assert_eq!(err.kind(), ErrorKind::Lookup);
}

#[tokio::test]
async fn server_errors_are_transient() {
  let mut server = mockito::Server::new_async().await;
  let broken = server
    .mock("GET", format!("/{VERSION}/manifest.json").as_str())
    .with_status(503)
    .expect(2)
    .create_async()
    .await;

  let host = HttpSourceHost::new().unwrap();
  let index = server.url();
  let retry = RetryPolicy {
    max_attempts: 2,
    initial_backoff: Duration::from_millis(10),
    max_backoff: Duration::from_millis(10),
  };
  let err = RevisionResolver::new(&host, &index, Duration::from_secs(5), retry)
    .resolve(VERSION)
    .await
    .unwrap_err();

  assert_eq!(err.kind(), ErrorKind::TransientInfra);
  broken.assert_async().await;
}

#[tokio::test]
async fn sync_downloads_each_archive_once() {
  let mut server = mockito::Server::new_async().await;
  let release = Release::new();
  let _manifest = server
    .mock("GET", format!("/{VERSION}/manifest.json").as_str())
    .with_body(release.manifest())
    .create_async()
    .await;
  let src = server
    .mock("GET", format!("/{VERSION}/chromium.tar.gz").as_str())
    .with_body(release.src.clone())
    .expect(1)
    .create_async()
    .await;
  let ninja = server
    .mock("GET", format!("/{VERSION}/ninja.tar.gz").as_str())
    .with_body(release.ninja.clone())
    .expect(1)
    .create_async()
    .await;
  let mac_sdk = server
    .mock("GET", format!("/{VERSION}/mac_sdk.tar.gz").as_str())
    .expect(0)
    .create_async()
    .await;

  let temp = TempDir::new().unwrap();
  let workspace = Workspace::open(temp.path()).unwrap();
  let host = HttpSourceHost::new().unwrap();
  let index = server.url();
  let revision = RevisionResolver::new(&host, &index, Duration::from_secs(5), RetryPolicy::none())
    .resolve(VERSION)
    .await
    .unwrap()
    .for_platform(&linux_x64())
    .unwrap();

  let synchronizer = SourceSynchronizer::new(&host, Duration::from_secs(10), RetryPolicy::none());
  let first = synchronizer.sync(&workspace, &revision).await.unwrap();
  let second = synchronizer.sync(&workspace, &revision).await.unwrap();

  assert_eq!(first, second);
  assert!(first.is_synced_to(&revision));
  assert!(workspace.src_dir().join("base/base.gn").is_file());
  assert!(workspace.dep_dir("third_party/ninja").join("README").is_file());
  assert!(!workspace.dep_dir("build/mac_files").exists());
  src.assert_async().await;
  ninja.assert_async().await;
  mac_sdk.assert_async().await;
}
