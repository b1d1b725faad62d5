//! Dependency resolution engine: version selection, conflict resolution,
//! exclusions, substitutions, variant matching and capability conflicts over
//! a graph of component metadata fetched through a pluggable provider.

pub mod cache;
pub mod conflict;
pub mod constraint;
pub mod exclude;
pub mod failure;
pub mod graph;
pub mod provider;
pub mod repository;
pub mod resolver;
pub mod rules;
pub mod substitution;
pub mod variant;
pub mod version;

mod builder;
mod result;
mod state;

pub use failure::{ResolutionFailure, ResolveError};
pub use graph::ResolvedGraph;
pub use resolver::{ResolveRequest, Resolver, RootComponent};
