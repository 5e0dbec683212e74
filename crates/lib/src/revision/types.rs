//! Revision and index manifest types.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::platform::{Platform, TargetCpu, TargetOs};
use crate::util::hash::{HashError, Hashable, ObjectHash};

/// A fetchable archive and the SHA-256 it must hash to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pin {
  pub url: String,
  pub sha256: String,
}

/// Restricts a dependency to some target platforms. Empty lists match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub os: Vec<TargetOs>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub cpu: Vec<TargetCpu>,
}

impl Condition {
  pub fn is_always(&self) -> bool {
    self.os.is_empty() && self.cpu.is_empty()
  }

  pub fn matches(&self, platform: &Platform) -> bool {
    (self.os.is_empty() || self.os.contains(&platform.os)) && (self.cpu.is_empty() || self.cpu.contains(&platform.cpu))
  }
}

/// A nested dependency checked out at `path` below the source root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
  pub path: String,
  pub pin: Pin,
  #[serde(default, skip_serializing_if = "Condition::is_always")]
  pub condition: Condition,
}

#[derive(Serialize)]
struct RevisionContent<'a> {
  version: &'a str,
  source: &'a Pin,
  deps: &'a BTreeMap<String, Dependency>,
}

impl Hashable for RevisionContent<'_> {}

/// Identifies exactly which pinned content a workspace was synced to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionStamp {
  pub version: String,
  pub digest: ObjectHash,
}

impl std::fmt::Display for RevisionStamp {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{} ({})", self.version, self.digest)
  }
}

/// A fully resolved, immutable source revision.
///
/// Everything needed to fetch the tree is here; no further lookups are needed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Revision {
  version: String,
  source: Pin,
  deps: BTreeMap<String, Dependency>,
  stamp: RevisionStamp,
}

impl Revision {
  pub fn new(version: String, source: Pin, deps: BTreeMap<String, Dependency>) -> Result<Self, HashError> {
    let digest = RevisionContent {
      version: &version,
      source: &source,
      deps: &deps,
    }
    .compute_hash()?;

    Ok(Self {
      stamp: RevisionStamp {
        version: version.clone(),
        digest,
      },
      version,
      source,
      deps,
    })
  }

  pub fn version(&self) -> &str {
    &self.version
  }

  /// The main source tree archive.
  pub fn source(&self) -> &Pin {
    &self.source
  }

  /// Nested dependencies keyed by name, in name order.
  pub fn deps(&self) -> &BTreeMap<String, Dependency> {
    &self.deps
  }

  pub fn stamp(&self) -> &RevisionStamp {
    &self.stamp
  }

  /// This revision restricted to the dependencies the target platform needs.
  pub fn for_platform(&self, platform: &Platform) -> Result<Self, HashError> {
    let deps = self
      .deps
      .iter()
      .filter(|(_, dep)| dep.condition.matches(platform))
      .map(|(name, dep)| (name.clone(), dep.clone()))
      .collect();
    Self::new(self.version.clone(), self.source.clone(), deps)
  }
}

/// Wire format of `<index>/<version>/manifest.json`.
#[derive(Debug, Clone, Deserialize)]
pub struct IndexManifest {
  pub version: String,
  pub source: Pin,
  #[serde(default)]
  pub deps: Vec<IndexDependency>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IndexDependency {
  pub name: String,
  pub path: String,
  pub url: String,
  pub sha256: String,
  #[serde(default)]
  pub os: Vec<TargetOs>,
  #[serde(default)]
  pub cpu: Vec<TargetCpu>,
}
