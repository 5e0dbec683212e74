//! Implementation of the `chromaforge build` command.
//!
//! Streams the build tool's output as it runs. Ctrl-C stops the tool and
//! reports the build as cancelled.

use std::process::ExitCode;

use anyhow::Result;

use chromaforge_lib::orchestrator::{Orchestrator, check_build};
use chromaforge_lib::settings::Settings;

use super::{fail, runtime};
use crate::output::{format_duration, print_info, print_stat, print_success, print_warning};

pub fn cmd_build(settings: Settings, targets: Vec<String>) -> Result<ExitCode> {
  let rt = runtime()?;

  rt.block_on(async {
    let orchestrator = match Orchestrator::open(settings, "build") {
      Ok(orchestrator) => orchestrator,
      Err(err) => return Ok(fail(&err)),
    };

    let mut run = match orchestrator.start_build(&targets) {
      Ok(run) => run,
      Err(err) => return Ok(fail(&err)),
    };

    print_info(&format!("Building {}", targets.join(" ")));

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut interrupted = false;

    loop {
      let line = tokio::select! {
        line = run.next_line() => Some(line),
        _ = &mut ctrl_c, if !interrupted => None,
      };
      match line {
        Some(Some(line)) => println!("{line}"),
        Some(None) => break,
        None => {
          print_warning("Interrupted, stopping build");
          run.cancel();
          interrupted = true;
        }
      }
    }

    match check_build(run.finish().await) {
      Ok(result) => {
        print_success(&format!("Built {}", result.targets.join(" ")));
        for artifact in &result.artifacts {
          print_stat("Artifact", &artifact.display().to_string());
        }
        print_stat("Time", &format_duration(result.elapsed));
        Ok(ExitCode::SUCCESS)
      }
      Err(err) => Ok(fail(&err)),
    }
  })
}
