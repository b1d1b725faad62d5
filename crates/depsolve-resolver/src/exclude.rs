//! Module exclusion engine.
//!
//! Exclusions declared on an edge apply to everything reachable below the
//! edge's target. Along a single path they accumulate (union); where several
//! paths reach the same node only what every path excludes stays excluded
//! (intersection). Specs are kept as a small algebra and simplified as they
//! are combined, so revisiting a node only happens when its effective
//! exclusions actually change.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use globset::{Glob, GlobMatcher};

use depsolve_core::identity::ModuleIdentifier;
use depsolve_core::metadata::ExcludeRule;

#[derive(Debug, Clone)]
enum NamePattern {
    Any,
    Exact(String),
    Glob(GlobMatcher),
}

impl NamePattern {
    fn compile(pattern: Option<&str>) -> Self {
        let Some(pattern) = pattern else {
            return Self::Any;
        };
        if !pattern.contains(['*', '?', '[', '{']) {
            return Self::Exact(pattern.to_string());
        }
        match Glob::new(pattern) {
            Ok(glob) => Self::Glob(glob.compile_matcher()),
            Err(e) => {
                tracing::warn!(pattern, error = %e, "invalid exclusion pattern, matching it literally");
                Self::Exact(pattern.to_string())
            }
        }
    }

    fn matches(&self, value: &str) -> bool {
        match self {
            Self::Any => true,
            Self::Exact(p) => p == value,
            Self::Glob(g) => g.is_match(value),
        }
    }
}

/// A union of exclusion rules compiled for matching.
#[derive(Debug)]
pub struct RuleSet {
    rules: BTreeSet<ExcludeRule>,
    compiled: Vec<(NamePattern, NamePattern)>,
}

impl RuleSet {
    fn new(rules: BTreeSet<ExcludeRule>) -> Self {
        let compiled = rules
            .iter()
            .map(|r| {
                (
                    NamePattern::compile(r.group.as_deref()),
                    NamePattern::compile(r.module.as_deref()),
                )
            })
            .collect();
        Self { rules, compiled }
    }

    fn matches(&self, module: &ModuleIdentifier) -> bool {
        self.compiled
            .iter()
            .any(|(g, m)| g.matches(module.group()) && m.matches(module.name()))
    }
}

impl PartialEq for RuleSet {
    fn eq(&self, other: &Self) -> bool {
        self.rules == other.rules
    }
}

impl Eq for RuleSet {}

/// The effective exclusions in force at a point of the graph.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ExclusionSpec {
    #[default]
    Nothing,
    AnyOf(Arc<RuleSet>),
    Union(Vec<ExclusionSpec>),
    Intersection(Vec<ExclusionSpec>),
}

impl ExclusionSpec {
    pub fn of(rules: &[ExcludeRule]) -> Self {
        if rules.is_empty() {
            return Self::Nothing;
        }
        Self::AnyOf(Arc::new(RuleSet::new(rules.iter().cloned().collect())))
    }

    pub fn is_nothing(&self) -> bool {
        matches!(self, Self::Nothing)
    }

    /// `isExcluded`: whether this spec prunes an edge to `module`.
    pub fn excludes(&self, module: &ModuleIdentifier) -> bool {
        match self {
            Self::Nothing => false,
            Self::AnyOf(set) => set.matches(module),
            Self::Union(members) => members.iter().any(|m| m.excludes(module)),
            Self::Intersection(members) => members.iter().all(|m| m.excludes(module)),
        }
    }

    /// Exclusions accumulated along a path: anything either side excludes.
    pub fn union(&self, other: &Self) -> Self {
        let mut members = Vec::new();
        let mut rules = BTreeSet::new();
        for spec in [self, other] {
            match spec {
                Self::Nothing => {}
                Self::AnyOf(set) => rules.extend(set.rules.iter().cloned()),
                Self::Union(inner) => {
                    for m in inner {
                        match m {
                            Self::AnyOf(set) => rules.extend(set.rules.iter().cloned()),
                            other => members.push(other.clone()),
                        }
                    }
                }
                Self::Intersection(_) => members.push(spec.clone()),
            }
        }
        if !rules.is_empty() {
            members.insert(0, Self::AnyOf(Arc::new(RuleSet::new(rules))));
        }
        let members = prune(members, |kept, candidate| kept.subsumes(candidate));
        match members.len() {
            0 => Self::Nothing,
            1 => members.into_iter().next().unwrap_or_default(),
            _ => Self::Union(members),
        }
    }

    /// Exclusions in force where two paths meet: only what both exclude.
    pub fn intersect(&self, other: &Self) -> Self {
        if self.is_nothing() || other.is_nothing() {
            return Self::Nothing;
        }
        if self.subsumes(other) {
            return other.clone();
        }
        if other.subsumes(self) {
            return self.clone();
        }
        let mut members = Vec::new();
        for spec in [self, other] {
            match spec {
                Self::Intersection(inner) => members.extend(inner.iter().cloned()),
                _ => members.push(spec.clone()),
            }
        }
        let members = prune(members, |kept, candidate| candidate.subsumes(kept));
        match members.len() {
            0 => Self::Nothing,
            1 => members.into_iter().next().unwrap_or_default(),
            _ => Self::Intersection(members),
        }
    }

    /// Conservative check that everything `other` excludes is also excluded
    /// by `self`.
    fn subsumes(&self, other: &Self) -> bool {
        if self == other {
            return true;
        }
        match (self, other) {
            (_, Self::Nothing) => true,
            (Self::Nothing, _) => false,
            (Self::AnyOf(mine), Self::AnyOf(theirs)) => theirs.rules.is_subset(&mine.rules),
            (_, Self::Union(theirs)) => theirs.iter().all(|t| self.subsumes(t)),
            (_, Self::Intersection(theirs)) if theirs.iter().any(|t| self.subsumes(t)) => true,
            (Self::Union(mine), _) => mine.iter().any(|m| m.subsumes(other)),
            (Self::Intersection(mine), _) => mine.iter().all(|m| m.subsumes(other)),
            _ => false,
        }
    }
}

/// Drops members made redundant by another member, keeping the first of
/// equal ones.
fn prune(members: Vec<ExclusionSpec>, redundant: impl Fn(&ExclusionSpec, &ExclusionSpec) -> bool) -> Vec<ExclusionSpec> {
    let mut kept: Vec<ExclusionSpec> = Vec::with_capacity(members.len());
    for candidate in members {
        if kept.iter().any(|k| redundant(k, &candidate)) {
            continue;
        }
        kept.retain(|k| !redundant(&candidate, k));
        kept.push(candidate);
    }
    kept
}

impl fmt::Display for ExclusionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nothing => f.write_str("nothing"),
            Self::AnyOf(set) => {
                let rules: Vec<String> = set.rules.iter().map(ToString::to_string).collect();
                write!(f, "{{{}}}", rules.join(", "))
            }
            Self::Union(members) | Self::Intersection(members) => {
                let sep = if matches!(self, Self::Union(_)) { " | " } else { " & " };
                let parts: Vec<String> = members.iter().map(ToString::to_string).collect();
                write!(f, "({})", parts.join(sep))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(rules: &[&str]) -> ExclusionSpec {
        let rules: Vec<ExcludeRule> = rules.iter().map(|r| ExcludeRule::parse(r).unwrap()).collect();
        ExclusionSpec::of(&rules)
    }

    fn m(s: &str) -> ModuleIdentifier {
        ModuleIdentifier::parse(s).unwrap()
    }

    #[test]
    fn wildcards() {
        assert!(spec(&["*:*"]).excludes(&m("any:thing")));
        let group = spec(&["org.slf4j:*"]);
        assert!(group.excludes(&m("org.slf4j:slf4j-api")));
        assert!(!group.excludes(&m("org.other:slf4j-api")));
        assert!(spec(&["*:log4j"]).excludes(&m("org.apache:log4j")));
    }

    #[test]
    fn glob_patterns() {
        let s = spec(&["com.acme.*:*-test"]);
        assert!(s.excludes(&m("com.acme.core:lib-test")));
        assert!(!s.excludes(&m("com.acme.core:lib")));
        assert!(!s.excludes(&m("com.other:lib-test")));
    }

    #[test]
    fn union_accumulates_along_a_path() {
        let path = spec(&["a:x"]).union(&spec(&["b:y"]));
        assert!(path.excludes(&m("a:x")));
        assert!(path.excludes(&m("b:y")));
        assert!(matches!(path, ExclusionSpec::AnyOf(_)));
        assert_eq!(ExclusionSpec::Nothing.union(&spec(&["a:x"])), spec(&["a:x"]));
    }

    #[test]
    fn intersection_where_paths_meet() {
        let meet = spec(&["a:x", "b:y"]).intersect(&spec(&["a:x"]));
        assert_eq!(meet, spec(&["a:x"]));
        assert!(spec(&["a:x"]).intersect(&ExclusionSpec::Nothing).is_nothing());

        let disjoint = spec(&["a:x"]).intersect(&spec(&["b:y"]));
        assert!(!disjoint.excludes(&m("a:x")));
        assert!(!disjoint.excludes(&m("b:y")));
    }

    #[test]
    fn absorption_keeps_cycles_stable() {
        let base = spec(&["a:x"]);
        let around_cycle = base.union(&spec(&["c:z"]));
        assert_eq!(base.intersect(&around_cycle), base);
        assert_eq!(around_cycle.intersect(&base), base);
    }

    #[test]
    fn mixed_expressions() {
        let meet = spec(&["a:x"]).intersect(&spec(&["b:y"]));
        let extended = meet.union(&spec(&["c:z"]));
        assert!(extended.excludes(&m("c:z")));
        assert!(!extended.excludes(&m("a:x")));
        assert_eq!(extended.to_string(), "({c:z} | ({a:x} & {b:y}))");
    }
}
