//! Typed resolution failures.
//!
//! Failures are collected while the graph is built and surfaced together
//! once the graph reaches its fixed point. Each failure carries the selector
//! chain from the root so the offending declaration can be found.

use std::fmt;

use depsolve_core::attributes::Attributes;
use depsolve_core::identity::ModuleIdentifier;
use miette::Diagnostic;
use serde::Serialize;
use thiserror::Error;

use crate::graph::ResolvedGraph;

/// The chain of selectors from the root to a declaration.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct SelectorPath(pub Vec<String>);

impl SelectorPath {
    pub fn child(&self, segment: impl Into<String>) -> Self {
        let mut path = self.0.clone();
        path.push(segment.into());
        Self(path)
    }
}

impl fmt::Display for SelectorPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join(" -> "))
    }
}

/// One selector that contributed to a module's version decision.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct Provenance {
    pub selector: String,
    pub path: SelectorPath,
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (via {})", self.selector, self.path)
    }
}

/// A failure recorded during resolution.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ResolutionFailure {
    /// Metadata or a version listing could not be obtained.
    #[error("Could not resolve {selector}: {message} (via {path})")]
    Fetch {
        selector: String,
        message: String,
        path: SelectorPath,
        mandatory: bool,
    },

    /// No version satisfies every constraint on a module.
    #[error("Version conflict on {module}: {message}{}", render_provenance(.requested))]
    VersionConflict {
        module: ModuleIdentifier,
        message: String,
        requested: Vec<Provenance>,
    },

    /// Several modules provide one capability and no rule settles it.
    #[error("Capability {capability} is provided by {}", .providers.join(" and "))]
    CapabilityConflict {
        capability: String,
        providers: Vec<String>,
    },

    #[error("No variant of {component} matches {requested} (via {path}); available: {}", .available.join(", "))]
    NoMatchingVariant {
        component: String,
        requested: Attributes,
        available: Vec<String>,
        path: SelectorPath,
    },

    #[error("Cannot choose between variants {} of {component} for {requested} (via {path})", .candidates.join(", "))]
    AmbiguousVariant {
        component: String,
        requested: Attributes,
        candidates: Vec<String>,
        path: SelectorPath,
    },

    /// A substitution rule failed or targeted a project that does not exist.
    #[error("Substitution of {selector} failed: {message} (via {path})")]
    Substitution {
        selector: String,
        message: String,
        path: SelectorPath,
        mandatory: bool,
    },

    /// A dynamic selector was left in the graph while they are forbidden.
    #[error("Dynamic version {selector} is not allowed (via {path})")]
    DynamicVersion { selector: String, path: SelectorPath },
}

fn render_provenance(requested: &[Provenance]) -> String {
    let mut out = String::new();
    for p in requested {
        out.push_str("\n    requested ");
        out.push_str(&p.to_string());
    }
    out
}

impl ResolutionFailure {
    /// Whether this failure makes the whole resolution fail.
    ///
    /// Fetch and substitution failures only do so on mandatory edges;
    /// every other kind is always fatal.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Fetch { mandatory, .. } | Self::Substitution { mandatory, .. } => *mandatory,
            _ => true,
        }
    }
}

/// The outcome raised to callers when a resolution does not produce a graph.
#[derive(Debug, Error, Diagnostic)]
pub enum ResolveError {
    #[error("Resolution of {root} failed:{}", render_failures(.failures))]
    #[diagnostic(
        code(depsolve::resolve::failed),
        help("Run `depsolve why <module>` to see which declarations pulled in a module")
    )]
    Failed {
        root: String,
        failures: Vec<ResolutionFailure>,
        /// The graph as far as it could be resolved, for diagnostics.
        graph: Box<ResolvedGraph>,
    },

    #[error("Resolution was cancelled")]
    #[diagnostic(code(depsolve::resolve::cancelled))]
    Cancelled,
}

fn render_failures(failures: &[ResolutionFailure]) -> String {
    let mut out = String::new();
    for f in failures.iter().filter(|f| f.is_fatal()) {
        out.push_str("\n  - ");
        out.push_str(&f.to_string());
    }
    out
}

impl ResolveError {
    pub fn failures(&self) -> &[ResolutionFailure] {
        match self {
            Self::Failed { failures, .. } => failures,
            Self::Cancelled => &[],
        }
    }
}
