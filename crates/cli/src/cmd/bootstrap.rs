//! Implementation of the `chromaforge bootstrap` command.
//!
//! Resolves a release version to a pinned revision and syncs the workspace
//! source tree to it, fetching only the dependencies the target platform needs.
//! An explicit tarball URL and digest bypass the index entirely.

use std::process::ExitCode;
use std::time::Instant;

use anyhow::Result;

use chromaforge_lib::orchestrator::{Orchestrator, PipelineError};
use chromaforge_lib::platform::{TargetCpu, TargetOs};
use chromaforge_lib::settings::Settings;

use super::{fail, runtime, target_platform};
use crate::output::{format_duration, print_info, print_stat, print_success, truncate_hash};

/// Where the source tree comes from.
pub enum BootstrapSource {
  /// A release version looked up in the revision index.
  Index(String),
  /// A single pinned tarball, labelled for the sync record.
  Tarball { label: String, url: String, sha256: String },
}

pub fn cmd_bootstrap(
  settings: Settings,
  source: BootstrapSource,
  cpu: TargetCpu,
  os: Option<TargetOs>,
) -> Result<ExitCode> {
  let start = Instant::now();
  let platform = target_platform(cpu, os)?;
  let rt = runtime()?;

  match &source {
    BootstrapSource::Index(revision) => print_info(&format!("Bootstrapping {revision} for {platform}")),
    BootstrapSource::Tarball { label, url, .. } => {
      print_info(&format!("Bootstrapping {label} from {url} for {platform}"))
    }
  }

  let outcome = rt.block_on(async {
    let orchestrator = Orchestrator::open(settings, "bootstrap")?;
    let state = match &source {
      BootstrapSource::Index(revision) => orchestrator.bootstrap(revision, platform).await?,
      BootstrapSource::Tarball { label, url, sha256 } => {
        orchestrator.bootstrap_tarball(label, url, sha256, platform).await?
      }
    };
    Ok::<_, PipelineError>((orchestrator.workspace().root().to_path_buf(), state))
  });

  let (root, state) = match outcome {
    Ok(done) => done,
    Err(err) => return Ok(fail(&err)),
  };

  match &state.revision {
    Some(stamp) => print_success(&format!(
      "Workspace synced to {} ({})",
      stamp.version,
      truncate_hash(&stamp.digest.0)
    )),
    None => print_success("Workspace synced"),
  }
  print_stat("Workspace", &root.display().to_string());
  print_stat("Platform", &platform.to_string());
  print_stat("Dependencies", &state.deps.len().to_string());
  print_stat("Time", &format_duration(start.elapsed()));

  Ok(ExitCode::SUCCESS)
}
