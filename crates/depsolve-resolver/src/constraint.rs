//! Evaluation of version constraints against concrete versions.

use depsolve_core::constraint::VersionConstraint;
use depsolve_core::metadata::ComponentMetadata;

use crate::version::{Version, VersionSelector};

/// A [`VersionConstraint`] with its selectors parsed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ParsedConstraint {
    /// The strict selector if present, otherwise the required one.
    pub required: Option<VersionSelector>,
    pub preferred: Option<VersionSelector>,
    pub strict: bool,
    pub rejected: Vec<VersionSelector>,
    pub branch: Option<String>,
}

impl ParsedConstraint {
    pub fn parse(constraint: &VersionConstraint) -> Self {
        Self {
            required: constraint.effective_required().map(VersionSelector::parse),
            preferred: constraint.preferred.as_deref().map(VersionSelector::parse),
            strict: constraint.is_strict(),
            rejected: constraint.rejected.iter().map(|r| VersionSelector::parse(r)).collect(),
            branch: constraint.branch.clone(),
        }
    }

    /// `matches(selector, candidate)`: the required selector accepts the
    /// version and no rejection applies.
    ///
    /// A constraint without a required selector accepts any version that is
    /// not rejected.
    pub fn accepts(&self, version: &Version) -> bool {
        self.required.as_ref().map_or(true, |s| s.accepts(version)) && !self.rejects(version)
    }

    pub fn rejects(&self, version: &Version) -> bool {
        self.rejected.iter().any(|r| r.accepts(version))
    }

    pub fn is_dynamic(&self) -> bool {
        self.required.as_ref().is_some_and(VersionSelector::is_dynamic)
    }

    /// Selectors that can only be evaluated with each candidate's metadata:
    /// `latest.*`, and dynamic selectors restricted to a branch.
    pub fn requires_metadata(&self) -> bool {
        match &self.required {
            Some(s) => s.requires_metadata() || (s.is_dynamic() && self.branch.is_some()),
            None => false,
        }
    }

    /// Checks the parts of the constraint that depend on metadata: status
    /// for `latest.*` and the branch for branch-restricted selectors.
    pub fn accepts_metadata(&self, meta: &ComponentMetadata) -> bool {
        let status_ok = self
            .required
            .as_ref()
            .map_or(true, |s| s.accepts_status(meta.status));
        let branch_ok = match &self.branch {
            Some(branch) => meta.branch.as_deref() == Some(branch.as_str()),
            None => true,
        };
        status_ok && branch_ok
    }

    pub fn preferred_exact(&self) -> Option<&Version> {
        self.preferred.as_ref().and_then(VersionSelector::as_exact)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use depsolve_core::identity::ModuleVersionIdentifier;
    use depsolve_core::metadata::ComponentStatus;

    fn v(s: &str) -> Version {
        Version::parse(s)
    }

    #[test]
    fn rejections_always_exclude() {
        let c = ParsedConstraint::parse(&VersionConstraint::require("[1.0,2.0)").reject("1.3"));
        assert!(c.accepts(&v("1.2")));
        assert!(!c.accepts(&v("1.3")));
        assert!(!c.accepts(&v("2.0")));
    }

    #[test]
    fn rejection_by_range() {
        let c = ParsedConstraint::parse(&VersionConstraint::require("1.+").reject("[1.5,)"));
        assert!(c.accepts(&v("1.4")));
        assert!(!c.accepts(&v("1.6")));
    }

    #[test]
    fn strict_is_the_effective_requirement() {
        let mut raw = VersionConstraint::require("2.0");
        raw.strict = Some("1.0".into());
        let c = ParsedConstraint::parse(&raw);
        assert!(c.strict);
        assert!(c.accepts(&v("1.0")));
        assert!(!c.accepts(&v("2.0")));
    }

    #[test]
    fn preferred_only_accepts_anything() {
        let c = ParsedConstraint::parse(&VersionConstraint::prefer("1.0"));
        assert!(c.required.is_none());
        assert!(c.accepts(&v("7.0")));
        assert_eq!(c.preferred_exact(), Some(&v("1.0")));
    }

    #[test]
    fn metadata_requirements() {
        let latest = ParsedConstraint::parse(&VersionConstraint::require("latest.release"));
        assert!(latest.requires_metadata());

        let branch = ParsedConstraint::parse(&VersionConstraint::require("1.+").with_branch("main"));
        assert!(branch.requires_metadata());

        let id = ModuleVersionIdentifier::parse("g:n:1.1").unwrap();
        let mut meta = ComponentMetadata::module(id);
        assert!(!branch.accepts_metadata(&meta));
        meta.branch = Some("main".into());
        assert!(branch.accepts_metadata(&meta));

        meta.status = ComponentStatus::Integration;
        assert!(!latest.accepts_metadata(&meta));

        let exact = ParsedConstraint::parse(&VersionConstraint::require("1.0").with_branch("main"));
        assert!(!exact.requires_metadata());
    }
}
