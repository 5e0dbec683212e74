//! End-to-end tests driving the `chromaforge` binary against a local index.

#![cfg(unix)]

mod common;
mod pipeline_tests;
