//! The pipeline driver.
//!
//! An [`Orchestrator`] owns one workspace for its whole lifetime, holding the
//! workspace lock, and runs the stages in order. Stage failures are wrapped in
//! [`PipelineError`], which decides the process exit code.

use std::collections::BTreeMap;
use std::io;
use std::path::PathBuf;

use thiserror::Error;
use tracing::{info, warn};

use crate::build::{BuildExecutor, BuildResult, BuildRun};
use crate::configure::{Configuration, ConfigurationGenerator, ConfigureError};
use crate::error::{Classify, ErrorKind, classify_io};
use crate::host::{HostError, HttpSourceHost, SourceHost};
use crate::platform::Platform;
use crate::revision::{self, ResolveError, Revision, RevisionResolver};
use crate::settings::Settings;
use crate::sync::{SourceSynchronizer, SyncError};
use crate::tool::{BuildTool, Gn, GraphGenerator, Ninja};
use crate::workspace::{LockError, SyncState, Workspace, WorkspaceLock};

pub const EXIT_RESOLVE_FAILED: i32 = 10;
pub const EXIT_SYNC_FAILED: i32 = 11;
pub const EXIT_CONFIGURE_FAILED: i32 = 12;
pub const EXIT_BUILD_FAILED: i32 = 13;
pub const EXIT_BUILD_TIMED_OUT: i32 = 14;
/// Failures outside any stage: opening the workspace, taking the lock.
pub const EXIT_SETUP_FAILED: i32 = 1;

#[derive(Debug, Error)]
pub enum PipelineError {
  #[error("cannot open workspace {}: {source}", path.display())]
  Workspace {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error(transparent)]
  Lock(#[from] LockError),

  #[error("cannot create source host client: {0}")]
  Host(#[source] HostError),

  #[error("resolve failed: {0}")]
  ResolveFailed(#[source] ResolveError),

  #[error("sync failed: {0}")]
  SyncFailed(#[source] SyncError),

  #[error("configure failed: {0}")]
  ConfigureFailed(#[source] ConfigureError),

  #[error("build {}: {}", .0.status, .0.diagnostic())]
  BuildFailed(Box<BuildResult>),
}

impl Classify for PipelineError {
  fn kind(&self) -> ErrorKind {
    match self {
      PipelineError::Workspace { source, .. } => classify_io(source),
      PipelineError::Lock(e) => e.kind(),
      PipelineError::Host(e) => e.kind(),
      PipelineError::ResolveFailed(e) => e.kind(),
      PipelineError::SyncFailed(e) => e.kind(),
      PipelineError::ConfigureFailed(e) => e.kind(),
      PipelineError::BuildFailed(result) => result.kind().unwrap_or(ErrorKind::BuildFailure),
    }
  }
}

impl PipelineError {
  pub fn exit_code(&self) -> i32 {
    match self {
      PipelineError::Workspace { .. } | PipelineError::Lock(_) | PipelineError::Host(_) => EXIT_SETUP_FAILED,
      PipelineError::ResolveFailed(_) => EXIT_RESOLVE_FAILED,
      PipelineError::SyncFailed(_) => EXIT_SYNC_FAILED,
      PipelineError::ConfigureFailed(_) => EXIT_CONFIGURE_FAILED,
      PipelineError::BuildFailed(result) if result.kind() == Some(ErrorKind::Timeout) => EXIT_BUILD_TIMED_OUT,
      PipelineError::BuildFailed(_) => EXIT_BUILD_FAILED,
    }
  }

  /// The final line worth showing to a user.
  pub fn diagnostic(&self) -> String {
    let message = match self {
      PipelineError::BuildFailed(result) => result.diagnostic(),
      other => other.to_string(),
    };
    message.lines().last().unwrap_or_default().to_string()
  }
}

/// Turn an unsuccessful [`BuildResult`] into a pipeline failure.
pub fn check_build(result: BuildResult) -> Result<BuildResult, PipelineError> {
  if result.success() {
    Ok(result)
  } else {
    Err(PipelineError::BuildFailed(Box::new(result)))
  }
}

/// Drives one workspace through resolve, sync, configure and build.
pub struct Orchestrator<H, G, T> {
  settings: Settings,
  workspace: Workspace,
  host: H,
  generator: G,
  build_tool: T,
  _lock: WorkspaceLock,
}

impl Orchestrator<HttpSourceHost, Gn, Ninja> {
  /// Open the workspace named by `settings` with the real host and tools.
  pub fn open(settings: Settings, command: &str) -> Result<Self, PipelineError> {
    let host = HttpSourceHost::new().map_err(PipelineError::Host)?;
    let gn = settings.gn.clone().map(Gn::new).unwrap_or_default();
    let ninja = settings.ninja.clone().map(Ninja::new).unwrap_or_default();
    Self::with_parts(settings, host, gn, ninja, command)
  }
}

impl<H: SourceHost, G: GraphGenerator, T: BuildTool> Orchestrator<H, G, T> {
  /// Open the workspace and take its lock. `command` is recorded in the lock
  /// so a contending invocation can say who holds it.
  pub fn with_parts(settings: Settings, host: H, generator: G, build_tool: T, command: &str) -> Result<Self, PipelineError> {
    let workspace = Workspace::open(&settings.workspace).map_err(|source| PipelineError::Workspace {
      path: settings.workspace.clone(),
      source,
    })?;
    let lock = WorkspaceLock::acquire(&workspace.state_dir(), command)?;

    Ok(Self {
      settings,
      workspace,
      host,
      generator,
      build_tool,
      _lock: lock,
    })
  }

  pub fn workspace(&self) -> &Workspace {
    &self.workspace
  }

  pub fn settings(&self) -> &Settings {
    &self.settings
  }

  pub async fn resolve(&self, version_spec: &str) -> Result<Revision, PipelineError> {
    let Some(index_url) = self.settings.index_url.as_deref() else {
      return Err(PipelineError::ResolveFailed(ResolveError::NoIndex));
    };
    RevisionResolver::new(
      &self.host,
      index_url,
      self.settings.fetch_timeout,
      self.settings.retry,
    )
    .resolve(version_spec)
    .await
    .map_err(PipelineError::ResolveFailed)
  }

  /// Resolve `version_spec` and sync the dependencies `platform` needs.
  pub async fn bootstrap(&self, version_spec: &str, platform: Platform) -> Result<SyncState, PipelineError> {
    info!(version = version_spec, platform = %platform, "bootstrap");
    let revision = self.resolve(version_spec).await?;
    self.sync_revision(&revision, platform).await
  }

  /// Sync a single pinned source tarball, bypassing the index.
  pub async fn bootstrap_tarball(
    &self,
    version: &str,
    url: &str,
    sha256: &str,
    platform: Platform,
  ) -> Result<SyncState, PipelineError> {
    info!(version, url, platform = %platform, "bootstrap from tarball");
    let revision = revision::pinned_tarball(version, url, sha256).map_err(PipelineError::ResolveFailed)?;
    self.sync_revision(&revision, platform).await
  }

  async fn sync_revision(&self, revision: &Revision, platform: Platform) -> Result<SyncState, PipelineError> {
    let revision = revision.for_platform(&platform).map_err(|e| {
      PipelineError::ResolveFailed(ResolveError::MalformedIndex {
        version: revision.version().to_string(),
        reason: e.to_string(),
      })
    })?;

    SourceSynchronizer::new(&self.host, self.settings.fetch_timeout, self.settings.retry)
      .sync(&self.workspace, &revision)
      .await
      .map_err(PipelineError::SyncFailed)
  }

  pub async fn configure(
    &self,
    platform: Platform,
    options: &BTreeMap<String, String>,
  ) -> Result<Configuration, PipelineError> {
    ConfigurationGenerator::new(&self.generator, self.settings.build_timeout)
      .generate(&self.workspace, platform, options)
      .await
      .map_err(PipelineError::ConfigureFailed)
  }

  /// The configuration `build` would use.
  pub fn last_configuration(&self) -> Result<Option<Configuration>, PipelineError> {
    Configuration::load(&self.workspace.configuration_record_path())
      .map_err(|e| PipelineError::ConfigureFailed(ConfigureError::State(e)))
  }

  /// Start building `targets` against the most recent configuration.
  pub fn start_build(&self, targets: &[String]) -> Result<BuildRun, PipelineError> {
    let Some(configuration) = self.last_configuration()? else {
      return Err(PipelineError::BuildFailed(Box::new(BuildResult::rejected(
        targets,
        "no configuration found; run configure first",
      ))));
    };

    if let Ok(Some(state)) = self.workspace.verified_sync_state()
      && state.revision.as_ref() != Some(&configuration.revision)
    {
      warn!(configured = %configuration.revision, "workspace was synced after the last configure");
    }

    Ok(
      BuildExecutor::new(&self.build_tool, self.settings.build_timeout).start(
        &self.workspace,
        &configuration,
        targets,
      ),
    )
  }

  /// Build `targets` and fail unless the build succeeded.
  pub async fn build(&self, targets: &[String]) -> Result<BuildResult, PipelineError> {
    let result = self.start_build(targets)?.finish().await;
    check_build(result)
  }

  /// All four stages for one matrix cell.
  pub async fn run(
    &self,
    version_spec: &str,
    platform: Platform,
    options: &BTreeMap<String, String>,
    targets: &[String],
  ) -> Result<BuildResult, PipelineError> {
    self.bootstrap(version_spec, platform).await?;
    self.configure(platform, options).await?;
    self.build(targets).await
  }
}
