//! Core data types for depsolve.
//!
//! This crate defines the values the resolution engine works on: module and
//! component identities, component selectors and version constraints,
//! attributes and capabilities, component metadata as returned by a metadata
//! provider, user-declared rules, the resolution manifest, lockfiles, and
//! global configuration.
//!
//! This crate is intentionally free of async code and network I/O.

pub mod attributes;
pub mod config;
pub mod constraint;
pub mod dependency;
pub mod identity;
pub mod lockfile;
pub mod manifest;
pub mod metadata;
pub mod rules;
pub mod selector;
