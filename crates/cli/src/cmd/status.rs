//! Status command implementation.
//!
//! Displays the host platform, the workspace sync state and the most recent
//! configuration. Read-only: it neither takes the workspace lock nor creates
//! the workspace directories.

use std::process::ExitCode;

use anyhow::{Context, Result};

use chromaforge_lib::configure::Configuration;
use chromaforge_lib::platform::Platform;
use chromaforge_lib::settings::Settings;
use chromaforge_lib::workspace::Workspace;

use crate::output::{OutputFormat, print_info, print_json, print_stat, print_success, print_warning, symbols, truncate_hash};

pub fn cmd_status(settings: Settings, output: OutputFormat, verbose: bool) -> Result<ExitCode> {
  let host = Platform::host().ok();
  let workspace = Workspace::existing(&settings.workspace)
    .with_context(|| format!("Failed to open workspace {}", settings.workspace.display()))?;
  let state = workspace.load_sync_state().context("Failed to load sync state")?;
  let verified = workspace.verify(&state);
  let configuration =
    Configuration::load(&workspace.configuration_record_path()).context("Failed to load configuration record")?;

  if output.is_json() {
    let json_output = serde_json::json!({
      "host": host.map(|p| p.key()),
      "workspace": workspace.root(),
      "sync": {
        "revision": state.revision,
        "verified": verified,
        "source": state.source,
        "deps": state.deps,
      },
      "configuration": configuration,
    });
    print_json(&json_output)?;
    return Ok(ExitCode::SUCCESS);
  }

  print_info(&format!("chromaforge v{}", env!("CARGO_PKG_VERSION")));
  print_stat(
    "Host",
    &host.map(|p| p.key()).unwrap_or_else(|| "unsupported".to_string()),
  );
  print_stat("Workspace", &workspace.root().display().to_string());
  println!();

  match &state.revision {
    Some(stamp) if verified => {
      print_success(&format!("Synced to {} ({})", stamp.version, truncate_hash(&stamp.digest.0)));
      print_stat("Dependencies", &state.deps.len().to_string());
      if verbose {
        for (name, checkout) in &state.deps {
          println!(
            "    {} {} {} {}",
            symbols::INFO,
            name,
            checkout.path,
            truncate_hash(&checkout.sha256)
          );
        }
      }
    }
    Some(stamp) => print_warning(&format!(
      "Recorded revision {} no longer matches the source tree; run bootstrap",
      stamp.version
    )),
    None => print_info("Not synced. Run 'chromaforge bootstrap' first."),
  }

  match &configuration {
    Some(configuration) => {
      println!();
      print_success(&format!("Configured for {}", configuration.platform));
      print_stat("Build type", configuration.options.build_type.as_str());
      print_stat("Output", &configuration.out_dir.display().to_string());
      print_stat("Revision", &configuration.revision.version);
    }
    None => print_info("No configuration yet. Run 'chromaforge configure'."),
  }

  Ok(ExitCode::SUCCESS)
}
