//! The closed schema of build options.
//!
//! | key                | values                          | default   |
//! |--------------------|---------------------------------|-----------|
//! | `build_type`       | `component`, `release`, `debug` | `release` |
//! | `symbol_level`     | `0`, `1`, `2`                   | unset     |
//! | `thin_lto`         | `true`, `false`                 | per type  |
//! | `enable_nacl`      | `true`, `false`                 | `false`   |
//! | `dcheck_always_on` | `true`, `false`                 | unset     |

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::ConfigureError;
use crate::platform::{Platform, TargetOs};

pub const KEY_BUILD_TYPE: &str = "build_type";
pub const KEY_SYMBOL_LEVEL: &str = "symbol_level";
pub const KEY_THIN_LTO: &str = "thin_lto";
pub const KEY_ENABLE_NACL: &str = "enable_nacl";
pub const KEY_DCHECK_ALWAYS_ON: &str = "dcheck_always_on";

/// Every recognised option key.
pub const OPTION_KEYS: &[&str] = &[
  KEY_BUILD_TYPE,
  KEY_SYMBOL_LEVEL,
  KEY_THIN_LTO,
  KEY_ENABLE_NACL,
  KEY_DCHECK_ALWAYS_ON,
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildType {
  Component,
  #[default]
  Release,
  Debug,
}

impl BuildType {
  pub fn as_str(&self) -> &'static str {
    match self {
      BuildType::Component => "component",
      BuildType::Release => "release",
      BuildType::Debug => "debug",
    }
  }
}

impl fmt::Display for BuildType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for BuildType {
  type Err = ConfigureError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "component" => Ok(BuildType::Component),
      "release" => Ok(BuildType::Release),
      "debug" => Ok(BuildType::Debug),
      _ => Err(invalid(KEY_BUILD_TYPE, s, "component, release or debug")),
    }
  }
}

/// Validated build options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildOptions {
  pub build_type: BuildType,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub symbol_level: Option<u8>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub thin_lto: Option<bool>,
  #[serde(default)]
  pub enable_nacl: bool,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub dcheck_always_on: Option<bool>,
}

impl BuildOptions {
  /// Parse `key=value` options. Unknown keys and malformed values are
  /// rejected; platform-dependent conflicts are checked by [`Self::validate`].
  pub fn parse(raw: &BTreeMap<String, String>) -> Result<Self, ConfigureError> {
    let mut options = BuildOptions::default();

    for (key, value) in raw {
      let value = value.trim();
      match key.as_str() {
        KEY_BUILD_TYPE => options.build_type = value.parse()?,
        KEY_SYMBOL_LEVEL => {
          options.symbol_level = Some(match value {
            "0" => 0,
            "1" => 1,
            "2" => 2,
            _ => return Err(invalid(key, value, "0, 1 or 2")),
          })
        }
        KEY_THIN_LTO => options.thin_lto = Some(parse_bool(key, value)?),
        KEY_ENABLE_NACL => options.enable_nacl = parse_bool(key, value)?,
        KEY_DCHECK_ALWAYS_ON => options.dcheck_always_on = Some(parse_bool(key, value)?),
        _ => {
          return Err(ConfigureError::UnsupportedOption {
            key: key.clone(),
            supported: OPTION_KEYS.join(", "),
          });
        }
      }
    }

    Ok(options)
  }

  /// Reject combinations the toolchain cannot build.
  pub fn validate(&self, os: TargetOs) -> Result<(), ConfigureError> {
    if self.thin_lto == Some(true) {
      if self.build_type == BuildType::Debug {
        return Err(ConfigureError::ConflictingOptions(
          "thin_lto=true cannot be combined with build_type=debug".to_string(),
        ));
      }
      if os == TargetOs::Mac {
        return Err(ConfigureError::ConflictingOptions(
          "thin_lto=true is not supported for mac targets".to_string(),
        ));
      }
    }
    Ok(())
  }

  /// The gn arguments, in a fixed order.
  pub fn gn_args(&self, platform: &Platform) -> Vec<(&'static str, String)> {
    let mut args = vec![
      ("target_os", quoted(platform.os.as_str())),
      ("target_cpu", quoted(platform.cpu.as_str())),
      ("enable_nacl", self.enable_nacl.to_string()),
    ];

    let default_thin_lto = match self.build_type {
      BuildType::Component => {
        args.push(("is_component_build", "true".to_string()));
        args.push(("is_debug", "false".to_string()));
        None
      }
      BuildType::Release => {
        args.push(("is_component_build", "false".to_string()));
        args.push(("is_debug", "false".to_string()));
        args.push(("chrome_pgo_phase", "0".to_string()));
        args.push(("is_official_build", "true".to_string()));
        Some(platform.os != TargetOs::Mac)
      }
      BuildType::Debug => {
        args.push(("is_component_build", "true".to_string()));
        args.push(("is_debug", "true".to_string()));
        None
      }
    };

    if let Some(thin_lto) = self.thin_lto.or(default_thin_lto) {
      args.push(("use_thin_lto", thin_lto.to_string()));
    }
    if let Some(level) = self.symbol_level {
      args.push(("symbol_level", level.to_string()));
    }
    if let Some(dcheck) = self.dcheck_always_on {
      args.push(("dcheck_always_on", dcheck.to_string()));
    }

    args
  }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigureError> {
  match value.to_ascii_lowercase().as_str() {
    "true" | "1" | "yes" | "on" => Ok(true),
    "false" | "0" | "no" | "off" => Ok(false),
    _ => Err(invalid(key, value, "true or false")),
  }
}

fn invalid(key: &str, value: &str, expected: &'static str) -> ConfigureError {
  ConfigureError::InvalidOptionValue {
    key: key.to_string(),
    value: value.to_string(),
    expected,
  }
}

fn quoted(s: &str) -> String {
  format!("\"{s}\"")
}
