//! Component metadata as returned by a metadata provider.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::attributes::{Attributes, Capability};
use crate::identity::{ComponentId, ModuleIdentifier, ModuleVersionIdentifier};
use crate::selector::ComponentSelector;

/// Publication status of a component, used by `latest.<status>` selectors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Integration,
    Milestone,
    #[default]
    Release,
}

impl ComponentStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "integration" => Some(Self::Integration),
            "milestone" => Some(Self::Milestone),
            "release" => Some(Self::Release),
            _ => None,
        }
    }
}

impl fmt::Display for ComponentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Integration => "integration",
            Self::Milestone => "milestone",
            Self::Release => "release",
        })
    }
}

/// An exclusion declared on a dependency or globally.
///
/// `None` for either field is the `*` wildcard. Field values may be glob
/// patterns (e.g. `com.acme.*`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ExcludeRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,
}

impl ExcludeRule {
    pub fn new(group: Option<&str>, module: Option<&str>) -> Self {
        let normalize = |s: Option<&str>| s.filter(|v| *v != "*").map(str::to_string);
        Self {
            group: normalize(group),
            module: normalize(module),
        }
    }

    /// Parse `"group:module"`, `"group"` (any module of the group), or
    /// `"*:module"`.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        if s.is_empty() {
            return None;
        }
        match s.split_once(':') {
            Some((g, m)) if !g.is_empty() && !m.is_empty() => Some(Self::new(Some(g), Some(m))),
            Some(_) => None,
            None => Some(Self::new(Some(s), None)),
        }
    }

    /// Exact match for this rule on a module, without glob expansion.
    pub fn matches_literal(&self, module: &ModuleIdentifier) -> bool {
        self.group.as_deref().map_or(true, |g| g == module.group())
            && self.module.as_deref().map_or(true, |m| m == module.name())
    }
}

impl fmt::Display for ExcludeRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}",
            self.group.as_deref().unwrap_or("*"),
            self.module.as_deref().unwrap_or("*")
        )
    }
}

/// A dependency declared by a variant (or by the root).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DependencyMetadata {
    pub selector: ComponentSelector,
    pub excludes: Vec<ExcludeRule>,
    /// Constraint-only: participates in version selection but never pulls
    /// the target into the graph on its own.
    pub constraint: bool,
    pub reason: Option<String>,
}

impl DependencyMetadata {
    pub fn new(selector: ComponentSelector) -> Self {
        Self {
            selector,
            excludes: Vec::new(),
            constraint: false,
            reason: None,
        }
    }

    pub fn constraint(selector: ComponentSelector) -> Self {
        Self {
            constraint: true,
            ..Self::new(selector)
        }
    }

    pub fn excluding(mut self, rule: ExcludeRule) -> Self {
        self.excludes.push(rule);
        self
    }

    pub fn because(mut self, reason: &str) -> Self {
        self.reason = Some(reason.to_string());
        self
    }
}

/// A named, attribute-tagged subset of a component's artifacts and
/// dependencies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantMetadata {
    pub name: String,
    pub attributes: Attributes,
    /// Declared capabilities. Empty means the implicit capability only.
    pub capabilities: Vec<Capability>,
    pub dependencies: Vec<DependencyMetadata>,
}

impl VariantMetadata {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            attributes: Attributes::new(),
            capabilities: Vec::new(),
            dependencies: Vec::new(),
        }
    }
}

/// Everything the resolver needs to know about one component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentMetadata {
    pub id: ComponentId,
    /// Module identity of the component. For projects this is the identity
    /// the project publishes under.
    pub module_version: ModuleVersionIdentifier,
    pub status: ComponentStatus,
    pub branch: Option<String>,
    pub variants: Vec<VariantMetadata>,
}

impl ComponentMetadata {
    pub fn module(id: ModuleVersionIdentifier) -> Self {
        Self {
            id: ComponentId::Module(id.clone()),
            module_version: id,
            status: ComponentStatus::default(),
            branch: None,
            variants: Vec::new(),
        }
    }

    pub fn project(path: &str, id: ModuleVersionIdentifier) -> Self {
        Self {
            id: ComponentId::project(path),
            module_version: id,
            status: ComponentStatus::default(),
            branch: None,
            variants: Vec::new(),
        }
    }

    pub fn with_variant(mut self, variant: VariantMetadata) -> Self {
        self.variants.push(variant);
        self
    }

    /// Capabilities provided by a variant, with the implicit one filled in
    /// when the variant declares none.
    pub fn effective_capabilities(&self, variant: &VariantMetadata) -> Vec<Capability> {
        if variant.capabilities.is_empty() {
            vec![Capability::implicit(
                self.module_version.module(),
                self.module_version.version(),
            )]
        } else {
            variant.capabilities.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exclude_rule_parsing() {
        let r = ExcludeRule::parse("com.acme:lib").unwrap();
        assert_eq!(r.group.as_deref(), Some("com.acme"));
        assert_eq!(r.module.as_deref(), Some("lib"));

        let any = ExcludeRule::parse("*:*").unwrap();
        assert!(any.group.is_none() && any.module.is_none());

        let group_only = ExcludeRule::parse("com.acme").unwrap();
        assert!(group_only.module.is_none());
        assert_eq!(group_only.to_string(), "com.acme:*");

        assert!(ExcludeRule::parse("").is_none());
        assert!(ExcludeRule::parse(":lib").is_none());
    }

    #[test]
    fn literal_matching() {
        let m = ModuleIdentifier::new("com.acme", "lib");
        assert!(ExcludeRule::parse("com.acme:lib").unwrap().matches_literal(&m));
        assert!(ExcludeRule::parse("com.acme:*").unwrap().matches_literal(&m));
        assert!(ExcludeRule::parse("*:lib").unwrap().matches_literal(&m));
        assert!(!ExcludeRule::parse("org.other:*").unwrap().matches_literal(&m));
    }

    #[test]
    fn implicit_capability_when_none_declared() {
        let id = ModuleVersionIdentifier::parse("g:n:1.0").unwrap();
        let meta = ComponentMetadata::module(id).with_variant(VariantMetadata::new("runtime"));
        let caps = meta.effective_capabilities(&meta.variants[0]);
        assert_eq!(caps.len(), 1);
        assert_eq!(caps[0].to_string(), "g:n:1.0");
    }

    #[test]
    fn status_ordering() {
        assert!(ComponentStatus::Integration < ComponentStatus::Milestone);
        assert!(ComponentStatus::Milestone < ComponentStatus::Release);
        assert_eq!(ComponentStatus::parse("milestone"), Some(ComponentStatus::Milestone));
    }
}
