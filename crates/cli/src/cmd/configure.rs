//! Implementation of the `chromaforge configure` command.

use std::collections::BTreeMap;
use std::process::ExitCode;
use std::time::Instant;

use anyhow::Result;

use chromaforge_lib::configure::{ConfigureError, KEY_BUILD_TYPE};
use chromaforge_lib::orchestrator::{Orchestrator, PipelineError};
use chromaforge_lib::platform::{TargetCpu, TargetOs};
use chromaforge_lib::settings::Settings;

use super::{fail, runtime, target_platform};
use crate::output::{format_duration, print_stat, print_success, truncate_hash};

pub fn cmd_configure(
  settings: Settings,
  cpu: TargetCpu,
  os: Option<TargetOs>,
  config: Option<&str>,
  options: Vec<(String, String)>,
) -> Result<ExitCode> {
  let start = Instant::now();
  let platform = target_platform(cpu, os)?;

  let raw = match collect_options(config, options) {
    Ok(raw) => raw,
    Err(err) => return Ok(fail(&PipelineError::ConfigureFailed(err))),
  };

  let rt = runtime()?;
  let outcome = rt.block_on(async {
    let orchestrator = Orchestrator::open(settings, "configure")?;
    orchestrator.configure(platform, &raw).await
  });

  let configuration = match outcome {
    Ok(configuration) => configuration,
    Err(err) => return Ok(fail(&err)),
  };

  if configuration.regenerated {
    print_success(&format!("Configured {platform}"));
  } else {
    print_success(&format!("Configuration for {platform} is up to date"));
  }
  print_stat("Build type", configuration.options.build_type.as_str());
  print_stat("Output", &configuration.out_dir.display().to_string());
  print_stat("Checksum", truncate_hash(&configuration.checksum));
  print_stat("Time", &format_duration(start.elapsed()));

  Ok(ExitCode::SUCCESS)
}

/// Merge `--config` and repeated `--option` flags, rejecting contradictions.
fn collect_options(config: Option<&str>, options: Vec<(String, String)>) -> Result<BTreeMap<String, String>, ConfigureError> {
  let mut raw: BTreeMap<String, String> = BTreeMap::new();
  let config = config.map(|c| (KEY_BUILD_TYPE.to_string(), c.to_string()));

  for (key, value) in options.into_iter().chain(config) {
    if let Some(existing) = raw.get(&key)
      && !value.eq_ignore_ascii_case(existing)
    {
      return Err(ConfigureError::ConflictingOptions(format!(
        "{key} given as both '{existing}' and '{value}'"
      )));
    }
    raw.insert(key, value);
  }

  Ok(raw)
}
