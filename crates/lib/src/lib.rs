//! chromaforge-lib: build orchestration for a pinned browser-engine source tree.
//!
//! The pipeline runs in four stages, each usable on its own against a
//! [`workspace::Workspace`]:
//! - `revision`: resolve a version tag to an immutable [`revision::Revision`]
//! - `sync`: bring the workspace source tree to that revision
//! - `configure`: write a deterministic build-graph configuration for an OS/CPU pair
//! - `build`: run the native build for named targets and capture the outcome
//!
//! [`orchestrator::Orchestrator`] composes the stages and owns the retry and
//! caching policy used by the CLI.

pub mod build;
pub mod configure;
pub mod consts;
pub mod error;
pub mod host;
pub mod orchestrator;
pub mod platform;
pub mod retry;
pub mod revision;
pub mod settings;
pub mod sync;
pub mod tool;
pub mod util;
pub mod workspace;
