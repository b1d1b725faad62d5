//! Declared version constraints.
//!
//! A [`VersionConstraint`] stores the raw selector strings as written by the
//! user or by published metadata. Parsing into comparable selectors happens
//! in the resolver.

use std::fmt;

use serde::{Deserialize, Serialize};

/// `{preferred, required, strict, rejected, branch}`; any subset may be set.
///
/// - `required`: the version (or range) must be satisfied, but conflict
///   resolution may upgrade it.
/// - `strict`: like `required`, but no other selector can move the result
///   outside of it.
/// - `preferred`: used when nothing else narrows the choice.
/// - `rejected`: versions that can never be selected.
/// - `branch`: dynamic selectors only accept candidates on this branch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct VersionConstraint {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preferred: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strict: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub rejected: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
}

impl VersionConstraint {
    pub fn require(version: &str) -> Self {
        Self {
            required: Some(version.to_string()),
            ..Self::default()
        }
    }

    pub fn strictly(version: &str) -> Self {
        Self {
            strict: Some(version.to_string()),
            ..Self::default()
        }
    }

    pub fn prefer(version: &str) -> Self {
        Self {
            preferred: Some(version.to_string()),
            ..Self::default()
        }
    }

    /// Builder-style addition of a rejected version selector.
    pub fn reject(mut self, version: &str) -> Self {
        self.rejected.push(version.to_string());
        self
    }

    pub fn with_branch(mut self, branch: &str) -> Self {
        self.branch = Some(branch.to_string());
        self
    }

    pub fn with_preferred(mut self, version: &str) -> Self {
        self.preferred = Some(version.to_string());
        self
    }

    /// The selector that must be satisfied: the strict one when present,
    /// otherwise the required one.
    pub fn effective_required(&self) -> Option<&str> {
        self.strict.as_deref().or(self.required.as_deref())
    }

    pub fn is_strict(&self) -> bool {
        self.strict.is_some()
    }

    /// A constraint that says nothing about versions.
    pub fn is_empty(&self) -> bool {
        self.preferred.is_none()
            && self.required.is_none()
            && self.strict.is_none()
            && self.rejected.is_empty()
    }
}

impl fmt::Display for VersionConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let plain = self.strict.is_none()
            && self.preferred.is_none()
            && self.rejected.is_empty()
            && self.branch.is_none();
        if plain {
            return f.write_str(self.required.as_deref().unwrap_or(""));
        }
        let mut parts = Vec::new();
        if let Some(s) = &self.strict {
            parts.push(format!("strictly {s}"));
        } else if let Some(r) = &self.required {
            parts.push(format!("require {r}"));
        }
        if let Some(p) = &self.preferred {
            parts.push(format!("prefer {p}"));
        }
        if !self.rejected.is_empty() {
            parts.push(format!("reject {}", self.rejected.join(" & ")));
        }
        if let Some(b) = &self.branch {
            parts.push(format!("branch {b}"));
        }
        write!(f, "{{{}}}", parts.join("; "))
    }
}
