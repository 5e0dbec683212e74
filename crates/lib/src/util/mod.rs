//! Shared utilities.
//!
//! Hashing and atomic file publication used across the crate, plus test helpers.

pub mod fs;
pub mod hash;

#[cfg(test)]
pub mod testutil;
