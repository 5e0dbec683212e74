//! Deterministic build-graph configuration.
//!
//! A configuration is keyed by [`Platform`] and lives in `out/<os>-<cpu>/`.
//! `args.gn` is rendered from the validated options and the synced revision
//! in a fixed order, so identical inputs give byte-identical files. The graph
//! generator only runs when `args.gn` changed or `build.ninja` is missing.

mod options;

use std::collections::{BTreeMap, VecDeque};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{Notify, mpsc};
use tracing::{debug, info};

use crate::consts::{APP_NAME, LOG_TAIL_LINES};
use crate::error::{Classify, ErrorKind, classify_io};
use crate::platform::Platform;
use crate::revision::RevisionStamp;
use crate::tool::process::{self, Exit};
use crate::tool::{GraphGenerator, ToolError, tool_env};
use crate::util::fs::write_atomic;
use crate::util::hash::hash_bytes;
use crate::workspace::{StateError, Workspace};

pub use options::{BuildOptions, BuildType, KEY_BUILD_TYPE, OPTION_KEYS};

/// Current configuration record format version.
pub const CONFIGURATION_VERSION: u32 = 1;

const ARGS_FILE: &str = "args.gn";
const BUILD_FILE: &str = "build.ninja";
const RECORD_FILE: &str = "configuration record";

/// gn complains about this on every run in a tree not managed by gclient.
const GCLIENT_NOISE: &str = ".gclient_entries missing";

#[derive(Debug, Error)]
pub enum ConfigureError {
  #[error("unsupported option '{key}' (supported: {supported})")]
  UnsupportedOption { key: String, supported: String },

  #[error("invalid value '{value}' for option '{key}' (expected {expected})")]
  InvalidOptionValue {
    key: String,
    value: String,
    expected: &'static str,
  },

  #[error("conflicting options: {0}")]
  ConflictingOptions(String),

  #[error("workspace is not synced; run bootstrap first")]
  WorkspaceNotSynced,

  #[error("{tool} gen failed ({}){}", describe_code(*code), last_line(output))]
  GeneratorFailed {
    tool: String,
    code: Option<i32>,
    output: Vec<String>,
  },

  #[error("{tool} gen timed out after {}", humantime::format_duration(*after))]
  GeneratorTimedOut { tool: String, after: Duration },

  #[error(transparent)]
  Tool(#[from] ToolError),

  #[error("I/O error at {}: {source}", path.display())]
  Io {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error(transparent)]
  State(#[from] StateError),
}

impl Classify for ConfigureError {
  fn kind(&self) -> ErrorKind {
    match self {
      ConfigureError::GeneratorTimedOut { .. } => ErrorKind::Timeout,
      ConfigureError::Io { source, .. } => classify_io(source),
      ConfigureError::State(e) => e.kind(),
      _ => ErrorKind::Configuration,
    }
  }
}

fn describe_code(code: Option<i32>) -> String {
  match code {
    Some(code) => format!("exit code {code}"),
    None => "terminated by signal".to_string(),
  }
}

fn last_line(output: &[String]) -> String {
  output.last().map(|l| format!(": {l}")).unwrap_or_default()
}

/// A generated configuration, as recorded in `.chromaforge/configuration.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Configuration {
  pub version: u32,
  pub platform: Platform,
  pub options: BuildOptions,
  /// Revision the source tree was synced to when generating.
  pub revision: RevisionStamp,
  pub out_dir: PathBuf,
  /// SHA-256 of `args.gn`.
  pub checksum: String,
  /// Whether the graph generator ran for this call.
  #[serde(skip)]
  pub regenerated: bool,
}

impl Configuration {
  /// Load the most recent configuration, if any.
  pub fn load(path: &Path) -> Result<Option<Self>, StateError> {
    let content = match fs::read_to_string(path) {
      Ok(content) => content,
      Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
      Err(source) => return Err(StateError::Read { file: RECORD_FILE, source }),
    };

    let record: Configuration =
      serde_json::from_str(&content).map_err(|source| StateError::Parse { file: RECORD_FILE, source })?;

    if record.version != CONFIGURATION_VERSION {
      return Err(StateError::UnsupportedVersion {
        file: RECORD_FILE,
        found: record.version,
        expected: CONFIGURATION_VERSION,
      });
    }

    Ok(Some(record))
  }

  pub fn save(&self, path: &Path) -> Result<(), StateError> {
    let content =
      serde_json::to_string_pretty(self).map_err(|source| StateError::Serialize { file: RECORD_FILE, source })?;
    write_atomic(path, content.as_bytes()).map_err(|source| StateError::Write { file: RECORD_FILE, source })
  }
}

/// Render `args.gn`.
pub fn render_args(revision: &RevisionStamp, platform: &Platform, options: &BuildOptions) -> String {
  let mut out = format!("# Generated by {APP_NAME} for {revision}. Do not edit.\n");
  for (key, value) in options.gn_args(platform) {
    out.push_str(&format!("{key} = {value}\n"));
  }
  out
}

pub struct ConfigurationGenerator<'a, G> {
  generator: &'a G,
  timeout: Option<Duration>,
}

impl<'a, G: GraphGenerator> ConfigurationGenerator<'a, G> {
  pub fn new(generator: &'a G, timeout: Option<Duration>) -> Self {
    Self { generator, timeout }
  }

  /// Generate the configuration for `platform` from raw `key=value` options.
  ///
  /// Options are validated before anything touches the filesystem.
  pub async fn generate(
    &self,
    workspace: &Workspace,
    platform: Platform,
    raw_options: &BTreeMap<String, String>,
  ) -> Result<Configuration, ConfigureError> {
    let options = BuildOptions::parse(raw_options)?;
    options.validate(platform.os)?;

    let state = workspace
      .verified_sync_state()?
      .ok_or(ConfigureError::WorkspaceNotSynced)?;
    let revision = state.revision.ok_or(ConfigureError::WorkspaceNotSynced)?;

    let args = render_args(&revision, &platform, &options);
    let checksum = hash_bytes(args.as_bytes()).0;
    let out_dir = workspace.out_dir(&platform);
    let args_path = out_dir.join(ARGS_FILE);

    let unchanged = fs::read(&args_path).is_ok_and(|existing| existing == args.as_bytes())
      && out_dir.join(BUILD_FILE).is_file();

    if unchanged {
      info!(platform = %platform, "configuration unchanged, skipping {}", self.generator.name());
    } else {
      info!(platform = %platform, build_type = %options.build_type, out_dir = %out_dir.display(), "generating configuration");
      fs::create_dir_all(&out_dir).map_err(|source| ConfigureError::Io {
        path: out_dir.clone(),
        source,
      })?;
      write_atomic(&args_path, args.as_bytes()).map_err(|source| ConfigureError::Io {
        path: args_path.clone(),
        source,
      })?;

      if let Err(err) = self.run_generator(workspace, &out_dir).await {
        // A stale build.ninja next to the new args.gn must not look current.
        let _ = fs::remove_file(&args_path);
        return Err(err);
      }
    }

    let configuration = Configuration {
      version: CONFIGURATION_VERSION,
      platform,
      options,
      revision,
      out_dir,
      checksum,
      regenerated: !unchanged,
    };
    configuration.save(&workspace.configuration_record_path())?;
    Ok(configuration)
  }

  async fn run_generator(&self, workspace: &Workspace, out_dir: &Path) -> Result<(), ConfigureError> {
    let src = workspace.src_dir();
    let command = self.generator.generate_command(&src, out_dir).envs(tool_env(&src)?);
    let tool = self.generator.name().to_string();

    let (tx, mut rx) = mpsc::channel::<String>(process::OUTPUT_BUFFER);
    let collect = async {
      let mut tail = VecDeque::new();
      while let Some(line) = rx.recv().await {
        if line.contains(GCLIENT_NOISE) {
          continue;
        }
        debug!(tool = %tool, "{line}");
        if tail.len() == LOG_TAIL_LINES {
          tail.pop_front();
        }
        tail.push_back(line);
      }
      tail
    };

    let (exit, tail) = tokio::join!(
      process::run(&command, tx, self.timeout, Arc::new(Notify::new())),
      collect
    );

    match exit? {
      Exit::Code(Some(0)) => Ok(()),
      Exit::Code(code) => Err(ConfigureError::GeneratorFailed {
        tool,
        code,
        output: tail.into(),
      }),
      Exit::TimedOut | Exit::Cancelled => Err(ConfigureError::GeneratorTimedOut {
        tool,
        after: self.timeout.unwrap_or_default(),
      }),
    }
  }
}

#[cfg(all(test, unix))]
mod tests {
  use super::*;
  use crate::platform::{TargetCpu, TargetOs};
  use crate::revision::{Pin, Revision};
  use crate::tool::Gn;
  use crate::util::testutil::write_script;
  use crate::workspace::{SyncState, write_pin};
  use tempfile::TempDir;

  const STUB_GN: &str = r#"echo "$2" >> "$(dirname "$0")/gn.calls"
echo "ERROR at //.gclient_entries missing"
echo "Done. Made 2 targets"
touch "$2/build.ninja""#;

  struct Fixture {
    _temp: TempDir,
    tools: TempDir,
    workspace: Workspace,
    gn: Gn,
  }

  impl Fixture {
    fn synced() -> Self {
      let fx = Self::unsynced();
      let revision = Revision::new(
        "124.0.6315.2".to_string(),
        Pin {
          url: "https://host.test/src.tar.gz".to_string(),
          sha256: "a".repeat(64),
        },
        BTreeMap::new(),
      )
      .unwrap();
      fs::create_dir_all(fx.workspace.src_dir()).unwrap();
      write_pin(&fx.workspace.src_dir(), &"a".repeat(64)).unwrap();
      fx.workspace.publish_sync_state(&SyncState::synced_to(&revision)).unwrap();
      fx
    }

    fn unsynced() -> Self {
      Self::with_gn(STUB_GN)
    }

    fn with_gn(body: &str) -> Self {
      let temp = TempDir::new().unwrap();
      let tools = TempDir::new().unwrap();
      let gn = Gn::new(write_script(tools.path(), "gn", body));
      let workspace = Workspace::open(temp.path()).unwrap();
      Self {
        _temp: temp,
        tools,
        workspace,
        gn,
      }
    }

    fn gn_calls(&self) -> usize {
      fs::read_to_string(self.tools.path().join("gn.calls"))
        .map(|s| s.lines().count())
        .unwrap_or(0)
    }
  }

  fn linux_x64() -> Platform {
    Platform::new(TargetOs::Linux, TargetCpu::X64)
  }

  fn opts(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
  }

  #[tokio::test]
  async fn writes_args_and_runs_generator() {
    let fx = Fixture::synced();
    let generator = ConfigurationGenerator::new(&fx.gn, None);

    let config = generator.generate(&fx.workspace, linux_x64(), &BTreeMap::new()).await.unwrap();

    assert!(config.regenerated);
    assert_eq!(config.out_dir, fx.workspace.out_dir(&linux_x64()));
    let args = fs::read_to_string(config.out_dir.join("args.gn")).unwrap();
    assert!(args.contains("target_os = \"linux\""));
    assert!(args.contains("target_cpu = \"x64\""));
    assert!(args.contains("is_official_build = true"));
    assert_eq!(hash_bytes(args.as_bytes()).0, config.checksum);
    assert_eq!(fx.gn_calls(), 1);

    let record = Configuration::load(&fx.workspace.configuration_record_path()).unwrap().unwrap();
    assert_eq!(record.checksum, config.checksum);
    assert_eq!(record.platform, linux_x64());
  }

  #[tokio::test]
  async fn identical_inputs_are_byte_identical_and_skip_regeneration() {
    let fx = Fixture::synced();
    let generator = ConfigurationGenerator::new(&fx.gn, None);
    let options = opts(&[("symbol_level", "0"), ("dcheck_always_on", "true")]);

    let first = generator.generate(&fx.workspace, linux_x64(), &options).await.unwrap();
    let first_args = fs::read(first.out_dir.join("args.gn")).unwrap();
    let second = generator.generate(&fx.workspace, linux_x64(), &options).await.unwrap();

    assert_eq!(fs::read(second.out_dir.join("args.gn")).unwrap(), first_args);
    assert_eq!(first.checksum, second.checksum);
    assert!(!second.regenerated);
    assert_eq!(fx.gn_calls(), 1);
  }

  #[tokio::test]
  async fn separate_workspaces_render_the_same_bytes() {
    let a = Fixture::synced();
    let b = Fixture::synced();
    let options = opts(&[("build_type", "debug")]);

    let ca = ConfigurationGenerator::new(&a.gn, None)
      .generate(&a.workspace, linux_x64(), &options)
      .await
      .unwrap();
    let cb = ConfigurationGenerator::new(&b.gn, None)
      .generate(&b.workspace, linux_x64(), &options)
      .await
      .unwrap();

    assert_eq!(
      fs::read(ca.out_dir.join("args.gn")).unwrap(),
      fs::read(cb.out_dir.join("args.gn")).unwrap()
    );
  }

  #[tokio::test]
  async fn changed_options_regenerate() {
    let fx = Fixture::synced();
    let generator = ConfigurationGenerator::new(&fx.gn, None);

    generator.generate(&fx.workspace, linux_x64(), &BTreeMap::new()).await.unwrap();
    let config = generator
      .generate(&fx.workspace, linux_x64(), &opts(&[("build_type", "component")]))
      .await
      .unwrap();

    assert!(config.regenerated);
    assert_eq!(fx.gn_calls(), 2);
  }

  #[tokio::test]
  async fn unknown_option_writes_nothing() {
    let fx = Fixture::synced();
    let generator = ConfigurationGenerator::new(&fx.gn, None);

    let err = generator
      .generate(&fx.workspace, linux_x64(), &opts(&[("is_asan", "true")]))
      .await
      .unwrap_err();

    assert!(matches!(err, ConfigureError::UnsupportedOption { .. }));
    assert_eq!(err.kind(), ErrorKind::Configuration);
    assert!(!fx.workspace.root().join("out").exists());
    assert!(!fx.workspace.configuration_record_path().exists());
    assert_eq!(fx.gn_calls(), 0);
  }

  #[tokio::test]
  async fn conflicting_options_are_rejected() {
    let fx = Fixture::synced();
    let generator = ConfigurationGenerator::new(&fx.gn, None);

    let err = generator
      .generate(
        &fx.workspace,
        Platform::new(TargetOs::Mac, TargetCpu::Arm64),
        &opts(&[("thin_lto", "true")]),
      )
      .await
      .unwrap_err();

    assert!(matches!(err, ConfigureError::ConflictingOptions(_)));
  }

  #[tokio::test]
  async fn unsynced_workspace_is_rejected() {
    let fx = Fixture::unsynced();
    let generator = ConfigurationGenerator::new(&fx.gn, None);

    let err = generator.generate(&fx.workspace, linux_x64(), &BTreeMap::new()).await.unwrap_err();

    assert!(matches!(err, ConfigureError::WorkspaceNotSynced));
    assert_eq!(fx.gn_calls(), 0);
  }

  #[tokio::test]
  async fn generator_failure_carries_output_and_drops_args() {
    let fx = Fixture::with_gn("echo \"ERROR Unresolved dependencies.\" >&2\nexit 1");
    let synced = Fixture::synced();
    let generator = ConfigurationGenerator::new(&fx.gn, None);

    let err = generator
      .generate(&synced.workspace, linux_x64(), &BTreeMap::new())
      .await
      .unwrap_err();

    match &err {
      ConfigureError::GeneratorFailed { code, output, .. } => {
        assert_eq!(*code, Some(1));
        assert_eq!(output.last().unwrap(), "ERROR Unresolved dependencies.");
      }
      other => panic!("unexpected error: {other}"),
    }
    assert!(err.to_string().ends_with("ERROR Unresolved dependencies."));
    assert!(!synced.workspace.out_dir(&linux_x64()).join("args.gn").exists());
  }

  #[tokio::test]
  async fn missing_record_is_none_and_garbage_is_rejected() {
    let fx = Fixture::synced();
    let path = fx.workspace.configuration_record_path();
    assert!(Configuration::load(&path).unwrap().is_none());

    fs::write(&path, r#"{"version": 99}"#).unwrap();
    assert!(Configuration::load(&path).is_err());
  }
}
