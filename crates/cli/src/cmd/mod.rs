mod bootstrap;
mod build;
mod configure;
mod status;

use std::process::ExitCode;

use anyhow::{Context, Result};
use tokio::runtime::Runtime;

use chromaforge_lib::orchestrator::PipelineError;
use chromaforge_lib::platform::{Platform, TargetCpu, TargetOs};

use crate::output::print_pipeline_error;

pub use bootstrap::{BootstrapSource, cmd_bootstrap};
pub use build::cmd_build;
pub use configure::cmd_configure;
pub use status::cmd_status;

/// Parse a `key=value` build option.
pub fn parse_option(s: &str) -> Result<(String, String), String> {
  match s.split_once('=') {
    Some((key, value)) if !key.trim().is_empty() => Ok((key.trim().to_string(), value.trim().to_string())),
    _ => Err(format!("expected KEY=VALUE, got '{s}'")),
  }
}

fn runtime() -> Result<Runtime> {
  Runtime::new().context("Failed to create async runtime")
}

/// The requested target, defaulting the OS to the host's.
fn target_platform(cpu: TargetCpu, os: Option<TargetOs>) -> Result<Platform> {
  match os {
    Some(os) => Ok(Platform::new(os, cpu)),
    None => Platform::host_os_with(cpu).context("Cannot determine host OS; pass --target-os"),
  }
}

/// Report a stage failure and map it to the process exit code.
fn fail(err: &PipelineError) -> ExitCode {
  print_pipeline_error(err);
  ExitCode::from(u8::try_from(err.exit_code()).unwrap_or(1))
}
