//! Shared utilities for depsolve.
//!
//! This crate provides the cross-cutting error type used by every other
//! depsolve crate when loading manifests, repositories, lockfiles, and
//! configuration.

pub mod errors;
