//! Library-level pipeline tests over HTTP against a local index.

#![cfg(unix)]

mod common;
mod http_tests;
mod orchestrator_tests;
