//! Resolution of a human version tag into a pinned [`Revision`].
//!
//! The index lives at `<index_url>/<version>/manifest.json`. Relative archive
//! URLs inside it are resolved against that manifest's directory, so the
//! returned revision can be fetched without consulting the index again.

mod types;

use std::collections::{BTreeMap, HashSet};
use std::path::{Component, Path};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info};

use crate::error::{Classify, ErrorKind};
use crate::host::{HostError, SourceHost};
use crate::retry::RetryPolicy;
use crate::util::hash::is_sha256_hex;

pub use types::{Condition, Dependency, IndexDependency, IndexManifest, Pin, Revision, RevisionStamp};

#[derive(Debug, Error)]
pub enum ResolveError {
  #[error("'{0}' is not a release version (expected four dotted numbers, e.g. 124.0.6315.2)")]
  InvalidVersion(String),

  #[error("unknown revision {version}: the index has no entry at {url}")]
  UnknownRevision { version: String, url: String },

  #[error("revision index unreachable for {version}: {source}")]
  TransientLookup {
    version: String,
    #[source]
    source: HostError,
  },

  #[error("revision index rejected the request for {version}: {source}")]
  Rejected {
    version: String,
    #[source]
    source: HostError,
  },

  #[error("malformed index entry for {version}: {reason}")]
  MalformedIndex { version: String, reason: String },

  #[error("revision lookup for {version} timed out after {}", humantime::format_duration(*after))]
  TimedOut { version: String, after: Duration },

  #[error("no revision index configured; set CHROMAFORGE_INDEX_URL or bootstrap from an explicit tarball")]
  NoIndex,

  #[error("invalid tarball pin {url}: {reason}")]
  InvalidTarball { url: String, reason: String },
}

impl Classify for ResolveError {
  fn kind(&self) -> ErrorKind {
    match self {
      ResolveError::InvalidVersion(_)
      | ResolveError::UnknownRevision { .. }
      | ResolveError::InvalidTarball { .. } => ErrorKind::Lookup,
      ResolveError::TransientLookup { .. } => ErrorKind::TransientInfra,
      ResolveError::Rejected { source, .. } => source.kind(),
      ResolveError::MalformedIndex { .. } => ErrorKind::Integrity,
      ResolveError::TimedOut { .. } => ErrorKind::Timeout,
      ResolveError::NoIndex => ErrorKind::Configuration,
    }
  }
}

/// Maps version tags to revisions using the upstream index.
pub struct RevisionResolver<'a, H> {
  host: &'a H,
  index_url: &'a str,
  timeout: Duration,
  retry: RetryPolicy,
}

impl<'a, H: SourceHost> RevisionResolver<'a, H> {
  pub fn new(host: &'a H, index_url: &'a str, timeout: Duration, retry: RetryPolicy) -> Self {
    Self {
      host,
      index_url,
      timeout,
      retry,
    }
  }

  /// Resolve `version_spec` to a fully pinned revision.
  ///
  /// Unreachable-index failures are retried under the resolver's policy; an
  /// index that answers "no such entry" is reported immediately.
  pub async fn resolve(&self, version_spec: &str) -> Result<Revision, ResolveError> {
    let version = validate_version(version_spec)?;
    let base = format!("{}/{}", self.index_url.trim_end_matches('/'), version);
    let url = format!("{base}/manifest.json");

    info!(version = %version, url = %url, "resolving revision");

    let body = self.retry.run("revision lookup", || self.lookup(&version, &url)).await?;

    let manifest: IndexManifest = serde_json::from_slice(&body).map_err(|e| ResolveError::MalformedIndex {
      version: version.clone(),
      reason: e.to_string(),
    })?;

    let revision = build_revision(&version, &base, manifest)?;
    debug!(stamp = %revision.stamp(), deps = revision.deps().len(), "resolved revision");
    Ok(revision)
  }

  async fn lookup(&self, version: &str, url: &str) -> Result<Vec<u8>, ResolveError> {
    let result = tokio::time::timeout(self.timeout, self.host.get(url))
      .await
      .map_err(|_| ResolveError::TimedOut {
        version: version.to_string(),
        after: self.timeout,
      })?;

    result.map_err(|source| match source {
      HostError::NotFound { url } => ResolveError::UnknownRevision {
        version: version.to_string(),
        url,
      },
      source if source.kind().is_retryable() => ResolveError::TransientLookup {
        version: version.to_string(),
        source,
      },
      source => ResolveError::Rejected {
        version: version.to_string(),
        source,
      },
    })
  }
}

/// A revision consisting of one explicitly pinned source tarball and no
/// dependencies. Used when bootstrapping without an index.
pub fn pinned_tarball(version: &str, url: &str, sha256: &str) -> Result<Revision, ResolveError> {
  let invalid = |reason: String| ResolveError::InvalidTarball {
    url: url.to_string(),
    reason,
  };

  if !url.contains("://") {
    return Err(invalid("expected an absolute URL".to_string()));
  }
  if !is_sha256_hex(sha256) {
    return Err(invalid(format!("'{sha256}' is not a SHA-256 digest")));
  }

  let source = Pin {
    url: url.to_string(),
    sha256: sha256.to_ascii_lowercase(),
  };
  Revision::new(version.to_string(), source, BTreeMap::new()).map_err(|e| invalid(e.to_string()))
}

/// Derive a version label from a tarball URL's file name,
/// e.g. `.../chromium-124.0.6315.2.tar.xz` gives `chromium-124.0.6315.2`.
pub fn tarball_label(url: &str) -> String {
  let name = url
    .split(['?', '#'])
    .next()
    .unwrap_or(url)
    .rsplit('/')
    .next()
    .unwrap_or_default();
  let stem = [".tar.xz", ".tar.gz", ".tgz", ".tar"]
    .iter()
    .find_map(|ext| name.strip_suffix(ext))
    .unwrap_or(name);
  if stem.is_empty() {
    "tarball".to_string()
  } else {
    stem.to_string()
  }
}

fn validate_version(spec: &str) -> Result<String, ResolveError> {
  let spec = spec.trim();
  let parts: Vec<&str> = spec.split('.').collect();
  let valid = parts.len() == 4 && parts.iter().all(|p| !p.is_empty() && p.bytes().all(|b| b.is_ascii_digit()));
  if valid {
    Ok(spec.to_string())
  } else {
    Err(ResolveError::InvalidVersion(spec.to_string()))
  }
}

fn build_revision(version: &str, base: &str, manifest: IndexManifest) -> Result<Revision, ResolveError> {
  let malformed = |reason: String| ResolveError::MalformedIndex {
    version: version.to_string(),
    reason,
  };

  if manifest.version != version {
    return Err(malformed(format!("entry describes version {}", manifest.version)));
  }

  let source = resolve_pin(base, manifest.source).map_err(|r| malformed(format!("source: {r}")))?;

  let mut deps = BTreeMap::new();
  let mut paths = HashSet::new();
  for dep in manifest.deps {
    if !is_safe_relative(&dep.path) {
      return Err(malformed(format!("dependency '{}' has unsafe path '{}'", dep.name, dep.path)));
    }
    if !paths.insert(dep.path.clone()) {
      return Err(malformed(format!("dependency '{}' reuses path '{}'", dep.name, dep.path)));
    }
    let pin = resolve_pin(
      base,
      Pin {
        url: dep.url,
        sha256: dep.sha256,
      },
    )
    .map_err(|r| malformed(format!("dependency '{}': {r}", dep.name)))?;

    let entry = Dependency {
      path: dep.path,
      pin,
      condition: Condition {
        os: dep.os,
        cpu: dep.cpu,
      },
    };
    if deps.insert(dep.name.clone(), entry).is_some() {
      return Err(malformed(format!("dependency '{}' listed twice", dep.name)));
    }
  }

  Revision::new(version.to_string(), source, deps).map_err(|e| malformed(e.to_string()))
}

fn resolve_pin(base: &str, pin: Pin) -> Result<Pin, String> {
  if !is_sha256_hex(&pin.sha256) {
    return Err(format!("'{}' is not a SHA-256 digest", pin.sha256));
  }
  let url = if pin.url.contains("://") {
    pin.url
  } else {
    format!("{}/{}", base, pin.url.trim_start_matches('/'))
  };
  Ok(Pin {
    url,
    sha256: pin.sha256.to_ascii_lowercase(),
  })
}

fn is_safe_relative(path: &str) -> bool {
  let path = Path::new(path);
  path.components().next().is_some() && path.components().all(|c| matches!(c, Component::Normal(_)))
}
