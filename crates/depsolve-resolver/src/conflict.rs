//! Conflict resolution: picking one version per module and one provider per
//! capability, plus the report of what was decided.
//!
//! Decisions are memoised for the duration of a resolution. Asking again
//! with the same requests returns the cached answer without evaluating user
//! rules a second time.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use depsolve_core::identity::{ComponentId, ModuleIdentifier};

use crate::constraint::ParsedConstraint;
use crate::rules::{CapabilitySelect, ResolutionRules};
use crate::version::Version;

/// Why a component ended up in the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SelectionReason {
    Root,
    Requested,
    ConflictResolution,
    Forced,
    Locked,
    Substituted,
    CapabilityResolution,
    Replaced,
}

impl fmt::Display for SelectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Root => "root",
            Self::Requested => "requested",
            Self::ConflictResolution => "by conflict resolution",
            Self::Forced => "forced",
            Self::Locked => "locked",
            Self::Substituted => "substituted",
            Self::CapabilityResolution => "by capability resolution",
            Self::Replaced => "replaced",
        })
    }
}

/// A local project publishing the module being resolved.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProjectCandidate {
    pub path: Arc<str>,
    pub version: Version,
}

/// One live request on a module.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VersionRequest {
    pub constraint: ParsedConstraint,
    pub project: Option<ProjectCandidate>,
    /// For selectors that need metadata, the version found beforehand.
    pub pinned: Option<Version>,
}

impl VersionRequest {
    pub fn new(constraint: ParsedConstraint) -> Self {
        Self {
            constraint,
            project: None,
            pinned: None,
        }
    }
}

/// A version imposed from outside: a force rule or a lock pin.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ForcedVersion {
    pub version: String,
    pub reason: SelectionReason,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Selected {
    Module(Version),
    Project(ProjectCandidate),
}

impl Selected {
    pub fn version(&self) -> &Version {
        match self {
            Self::Module(v) => v,
            Self::Project(p) => &p.version,
        }
    }

    pub fn component(&self, module: &ModuleIdentifier) -> ComponentId {
        match self {
            Self::Module(v) => ComponentId::Module(module.with_version(&v.original)),
            Self::Project(p) => ComponentId::Project(p.path.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub selected: Selected,
    pub reason: SelectionReason,
}

/// A module offering a contested capability.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CapabilityCandidate {
    pub module: ModuleIdentifier,
    pub version: String,
    pub capability_version: Option<String>,
}

impl fmt::Display for CapabilityCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.module, self.version)
    }
}

/// Programmatic resolution of capability conflicts.
pub trait CapabilityResolver: Send + Sync {
    /// Pick the module that should provide `capability`, or `None` to leave
    /// the decision to the next resolver.
    fn resolve(&self, capability: &ModuleIdentifier, candidates: &[CapabilityCandidate]) -> Option<ModuleIdentifier>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilityDecision {
    pub winner: ModuleIdentifier,
    pub reason: SelectionReason,
}

type VersionKey = (ModuleIdentifier, Vec<VersionRequest>, Option<ForcedVersion>);
type CapabilityKey = (ModuleIdentifier, Vec<CapabilityCandidate>);

#[derive(Debug, Default)]
pub struct ConflictResolver {
    fail_on_version_conflict: bool,
    versions: HashMap<VersionKey, Result<Decision, String>>,
    capabilities: HashMap<CapabilityKey, Option<CapabilityDecision>>,
}

impl ConflictResolver {
    pub fn new(fail_on_version_conflict: bool) -> Self {
        Self {
            fail_on_version_conflict,
            ..Self::default()
        }
    }

    /// `resolve(moduleId, candidates)`: the winning version of `module`
    /// given every live request, or a message describing the conflict.
    ///
    /// `listing` must be present when any request is dynamic.
    pub fn select_version(
        &mut self,
        module: &ModuleIdentifier,
        requests: &[VersionRequest],
        listing: Option<&[Version]>,
        forced: Option<&ForcedVersion>,
    ) -> Result<Decision, String> {
        let key = (module.clone(), requests.to_vec(), forced.cloned());
        if let Some(cached) = self.versions.get(&key) {
            tracing::trace!(%module, "reusing cached version decision");
            return cached.clone();
        }
        let decision = self.decide_version(module, requests, listing, forced);
        self.versions.insert(key, decision.clone());
        decision
    }

    fn decide_version(
        &self,
        module: &ModuleIdentifier,
        requests: &[VersionRequest],
        listing: Option<&[Version]>,
        forced: Option<&ForcedVersion>,
    ) -> Result<Decision, String> {
        let projects: BTreeSet<&ProjectCandidate> = requests.iter().filter_map(|r| r.project.as_ref()).collect();
        if let Some(project) = projects.first() {
            if projects.len() > 1 {
                tracing::warn!(%module, "several projects publish this module, using {}", project.path);
            }
            check_strict(requests, &project.version, &format!("project {}", project.path))?;
            let has_module_requests = requests
                .iter()
                .any(|r| r.project.is_none() && r.constraint.required.is_some());
            return Ok(Decision {
                selected: Selected::Project((*project).clone()),
                reason: if has_module_requests {
                    SelectionReason::ConflictResolution
                } else {
                    SelectionReason::Requested
                },
            });
        }

        if let Some(forced) = forced {
            let version = Version::parse(&forced.version);
            let label = format!("{} version {}", forced.reason, version);
            if let Some(r) = requests.iter().find(|r| r.constraint.rejects(&version)) {
                return Err(format!("{label} is rejected by {}", describe(&r.constraint)));
            }
            check_strict(requests, &version, &label)?;
            return Ok(Decision {
                selected: Selected::Module(version),
                reason: forced.reason,
            });
        }

        let rejected = |v: &Version| requests.iter().any(|r| r.constraint.rejects(v));
        let mut candidates: Vec<Version> = Vec::new();
        let mut fallback: Vec<Version> = Vec::new();
        let mut ranges: Vec<&ParsedConstraint> = Vec::new();

        for request in requests.iter().filter(|r| r.project.is_none()) {
            let c = &request.constraint;
            if c.requires_metadata() {
                match &request.pinned {
                    Some(v) => candidates.push(v.clone()),
                    None => return Err(format!("no version of {module} matches {}", describe(c))),
                }
                continue;
            }
            match &c.required {
                None => fallback.extend(c.preferred_exact().cloned()),
                Some(selector) => match selector.as_exact() {
                    Some(v) => candidates.push(v.clone()),
                    None => ranges.push(c),
                },
            }
        }

        if !ranges.is_empty() {
            let listing = listing.ok_or_else(|| format!("versions of {module} were not listed"))?;
            let accepted: Vec<&Version> = listing
                .iter()
                .filter(|v| ranges.iter().all(|c| c.required.as_ref().is_some_and(|s| s.accepts(v))))
                .filter(|v| !rejected(v))
                .collect();
            let preferred = ranges
                .iter()
                .filter_map(|c| c.preferred_exact())
                .filter(|p| accepted.contains(p))
                .max();
            match preferred.or(accepted.last().copied()) {
                Some(v) => candidates.push(v.clone()),
                None => {
                    let wanted: Vec<String> = ranges.iter().map(|c| describe(c)).collect();
                    return Err(format!("no available version satisfies {}", wanted.join(" and ")));
                }
            }
        }

        if candidates.is_empty() {
            candidates = fallback;
        }
        if candidates.is_empty() {
            return Err(format!("no version of {module} was requested"));
        }

        let allowed: BTreeSet<&Version> = candidates.iter().filter(|v| !rejected(v)).collect();
        let Some(winner) = allowed.last().map(|v| (*v).clone()) else {
            let listed: Vec<String> = candidates.iter().map(ToString::to_string).collect();
            return Err(format!("every candidate version ({}) is rejected", listed.join(", ")));
        };
        check_strict(requests, &winner, &format!("version {winner}"))?;

        let disagree = allowed.len() > 1;
        if disagree && self.fail_on_version_conflict {
            let listed: Vec<String> = allowed.iter().map(ToString::to_string).collect();
            return Err(format!(
                "conflict between versions {} and failing on version conflicts is enabled",
                listed.join(", ")
            ));
        }
        if disagree {
            tracing::debug!(%module, %winner, candidates = allowed.len(), "resolved version conflict");
        }
        Ok(Decision {
            selected: Selected::Module(winner),
            reason: if disagree {
                SelectionReason::ConflictResolution
            } else {
                SelectionReason::Requested
            },
        })
    }

    /// Settle a conflict on `capability` between `candidates`, consulting
    /// module replacements, then declarative rules, then programmatic
    /// resolvers. `None` means the conflict is unresolved.
    pub fn resolve_capability(
        &mut self,
        capability: &ModuleIdentifier,
        candidates: &[CapabilityCandidate],
        rules: &ResolutionRules,
    ) -> Option<CapabilityDecision> {
        let mut sorted = candidates.to_vec();
        sorted.sort();
        let key = (capability.clone(), sorted);
        if let Some(cached) = self.capabilities.get(&key) {
            tracing::trace!(%capability, "reusing cached capability decision");
            return cached.clone();
        }
        let decision = decide_capability(capability, &key.1, rules);
        match &decision {
            Some(d) => tracing::debug!(%capability, winner = %d.winner, reason = %d.reason, "resolved capability conflict"),
            None => tracing::warn!(%capability, "unresolved capability conflict"),
        }
        self.capabilities.insert(key, decision.clone());
        decision
    }
}

fn decide_capability(
    capability: &ModuleIdentifier,
    candidates: &[CapabilityCandidate],
    rules: &ResolutionRules,
) -> Option<CapabilityDecision> {
    let present = |m: &ModuleIdentifier| candidates.iter().any(|c| &c.module == m);

    for candidate in candidates {
        let replaces_all_others = candidates
            .iter()
            .filter(|other| other.module != candidate.module)
            .all(|other| {
                rules
                    .replacements
                    .iter()
                    .any(|r| r.module == other.module && r.with == candidate.module)
            });
        if replaces_all_others {
            return Some(CapabilityDecision {
                winner: candidate.module.clone(),
                reason: SelectionReason::Replaced,
            });
        }
    }

    for rule in rules.capability_rules.iter().filter(|r| &r.capability == capability) {
        let winner = match &rule.select {
            CapabilitySelect::Highest => candidates
                .iter()
                .max_by(|a, b| {
                    let va = Version::parse(a.capability_version.as_deref().unwrap_or(&a.version));
                    let vb = Version::parse(b.capability_version.as_deref().unwrap_or(&b.version));
                    // Equal versions keep the first candidate.
                    va.cmp(&vb).then(std::cmp::Ordering::Greater)
                })
                .map(|c| c.module.clone()),
            CapabilitySelect::Module(m) => present(m).then(|| m.clone()),
        };
        if let Some(winner) = winner {
            return Some(CapabilityDecision {
                winner,
                reason: SelectionReason::CapabilityResolution,
            });
        }
    }

    for resolver in &rules.capability_resolvers {
        if let Some(winner) = resolver.resolve(capability, candidates) {
            if present(&winner) {
                return Some(CapabilityDecision {
                    winner,
                    reason: SelectionReason::CapabilityResolution,
                });
            }
            tracing::warn!(%capability, %winner, "capability resolver chose a module that is not a candidate");
        }
    }
    None
}

fn check_strict(requests: &[VersionRequest], version: &Version, label: &str) -> Result<(), String> {
    for request in requests.iter().filter(|r| r.constraint.strict) {
        let accepted = request.constraint.required.as_ref().is_some_and(|s| s.accepts(version));
        if !accepted {
            return Err(format!(
                "{label} does not satisfy strict constraint {}",
                describe(&request.constraint)
            ));
        }
    }
    Ok(())
}

fn describe(c: &ParsedConstraint) -> String {
    let base = match &c.required {
        Some(s) if c.strict => format!("strictly {s}"),
        Some(s) => s.to_string(),
        None => "any version".to_string(),
    };
    match &c.branch {
        Some(b) => format!("{base} on branch {b}"),
        None => base,
    }
}

/// A report of every module whose requests disagreed.
#[derive(Debug, Default, Clone, Serialize)]
pub struct ConflictReport {
    pub conflicts: Vec<VersionConflict>,
}

/// A module requested at several versions, and what was resolved.
#[derive(Debug, Clone, Serialize)]
pub struct VersionConflict {
    pub module: ModuleIdentifier,
    pub requested: Vec<String>,
    pub resolved: String,
    pub reason: SelectionReason,
}

impl ConflictReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, conflict: VersionConflict) {
        self.conflicts.push(conflict);
    }

    pub fn is_empty(&self) -> bool {
        self.conflicts.is_empty()
    }

    pub fn len(&self) -> usize {
        self.conflicts.len()
    }
}

impl fmt::Display for ConflictReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.conflicts.is_empty() {
            return write!(f, "No version conflicts.");
        }
        writeln!(f, "Version conflicts ({}):", self.conflicts.len())?;
        for c in &self.conflicts {
            writeln!(f, "  {c}")?;
        }
        Ok(())
    }
}

impl fmt::Display for VersionConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} requested {} but resolved {} ({})",
            self.module,
            self.requested.join(", "),
            self.resolved,
            self.reason
        )
    }
}
