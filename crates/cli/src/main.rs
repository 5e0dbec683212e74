mod cmd;
mod output;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use chromaforge_lib::platform::{TargetCpu, TargetOs};
use chromaforge_lib::revision::tarball_label;
use chromaforge_lib::settings::Settings;

use crate::output::{OutputFormat, print_error};

/// Resolve, sync, configure and build a pinned browser-engine source tree
#[derive(Parser)]
#[command(name = "chromaforge")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Enable verbose output
  #[arg(short, long, global = true)]
  verbose: bool,

  /// Workspace directory (default: $CHROMAFORGE_WORKSPACE or the current directory)
  #[arg(short, long, global = true)]
  workspace: Option<PathBuf>,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Resolve a revision and sync the workspace to it
  Bootstrap {
    /// Release version, e.g. 124.0.6315.2 (labels the tree when --tarball-url is given)
    #[arg(long, required_unless_present = "tarball_url")]
    revision: Option<String>,

    /// Sync this source tarball directly instead of consulting the index
    #[arg(long, requires = "sha256")]
    tarball_url: Option<String>,

    /// SHA-256 of the tarball named by --tarball-url
    #[arg(long, requires = "tarball_url")]
    sha256: Option<String>,

    /// Target CPU (x64, x86, arm64, arm)
    #[arg(long)]
    target_cpu: TargetCpu,

    /// Target OS (default: host OS)
    #[arg(long)]
    target_os: Option<TargetOs>,
  },

  /// Generate the build configuration for a target platform
  Configure {
    /// Target CPU (x64, x86, arm64, arm)
    #[arg(long)]
    target_cpu: TargetCpu,

    /// Target OS (default: host OS)
    #[arg(long)]
    target_os: Option<TargetOs>,

    /// Build type (component, release, debug)
    #[arg(long)]
    config: Option<String>,

    /// Build option as key=value (repeatable)
    #[arg(long = "option", value_name = "KEY=VALUE", value_parser = cmd::parse_option)]
    options: Vec<(String, String)>,
  },

  /// Build targets using the most recent configuration
  Build {
    /// Targets to build, e.g. base
    #[arg(required = true)]
    targets: Vec<String>,

    /// Kill the build after this long (e.g. 90m)
    #[arg(long, value_parser = humantime::parse_duration)]
    timeout: Option<Duration>,
  },

  /// Show host platform, sync state and the last configuration
  Status {
    /// Output format
    #[arg(short, long, value_enum, default_value_t)]
    output: OutputFormat,
  },
}

fn main() -> ExitCode {
  let cli = Cli::parse();

  let default_level = if cli.verbose { "debug" } else { "warn" };
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
    .with_writer(std::io::stderr)
    .without_time()
    .init();

  match run(cli) {
    Ok(code) => code,
    Err(err) => {
      print_error(&format!("{err:#}"));
      ExitCode::FAILURE
    }
  }
}

fn run(cli: Cli) -> Result<ExitCode> {
  let mut settings = Settings::from_env().context("Invalid environment configuration")?;
  if let Some(workspace) = cli.workspace {
    settings.workspace = workspace;
  }
  debug!(workspace = %settings.workspace.display(), index = ?settings.index_url, "settings");

  match cli.command {
    Commands::Bootstrap {
      revision,
      tarball_url,
      sha256,
      target_cpu,
      target_os,
    } => {
      let source = match (tarball_url, sha256) {
        (Some(url), Some(sha256)) => cmd::BootstrapSource::Tarball {
          label: revision.unwrap_or_else(|| tarball_label(&url)),
          url,
          sha256,
        },
        _ => cmd::BootstrapSource::Index(revision.unwrap_or_default()),
      };
      cmd::cmd_bootstrap(settings, source, target_cpu, target_os)
    }
    Commands::Configure {
      target_cpu,
      target_os,
      config,
      options,
    } => cmd::cmd_configure(settings, target_cpu, target_os, config.as_deref(), options),
    Commands::Build { targets, timeout } => {
      if timeout.is_some() {
        settings.build_timeout = timeout;
      }
      cmd::cmd_build(settings, targets)
    }
    Commands::Status { output } => cmd::cmd_status(settings, output, cli.verbose),
  }
}
