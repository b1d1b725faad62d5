//! Component selectors: what a dependency asks for.

use std::fmt;

use serde::Serialize;

use crate::attributes::{Attributes, Capability};
use crate::constraint::VersionConstraint;
use crate::identity::ModuleIdentifier;

/// A request for a module at some version constraint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ModuleComponentSelector {
    pub module: ModuleIdentifier,
    pub constraint: VersionConstraint,
    #[serde(skip_serializing_if = "Attributes::is_empty")]
    pub attributes: Attributes,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub capabilities: Vec<Capability>,
}

/// A request for a local project by path (e.g. `:core`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ProjectComponentSelector {
    pub path: String,
    #[serde(skip_serializing_if = "Attributes::is_empty")]
    pub attributes: Attributes,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub capabilities: Vec<Capability>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ComponentSelector {
    Module(ModuleComponentSelector),
    Project(ProjectComponentSelector),
}

impl ComponentSelector {
    pub fn module(module: ModuleIdentifier, constraint: VersionConstraint) -> Self {
        Self::Module(ModuleComponentSelector {
            module,
            constraint,
            attributes: Attributes::new(),
            capabilities: Vec::new(),
        })
    }

    /// Shorthand for `group:name` with a plain required version.
    pub fn parse_module(coordinates: &str) -> Option<Self> {
        let (module, version) = coordinates.rsplit_once(':')?;
        let module = ModuleIdentifier::parse(module)?;
        Some(Self::module(module, VersionConstraint::require(version)))
    }

    pub fn project(path: &str) -> Self {
        Self::Project(ProjectComponentSelector {
            path: path.to_string(),
            attributes: Attributes::new(),
            capabilities: Vec::new(),
        })
    }

    /// The targeted module, when known without fetching metadata.
    pub fn module_id(&self) -> Option<&ModuleIdentifier> {
        match self {
            Self::Module(m) => Some(&m.module),
            Self::Project(_) => None,
        }
    }

    pub fn constraint(&self) -> Option<&VersionConstraint> {
        match self {
            Self::Module(m) => Some(&m.constraint),
            Self::Project(_) => None,
        }
    }

    pub fn attributes(&self) -> &Attributes {
        match self {
            Self::Module(m) => &m.attributes,
            Self::Project(p) => &p.attributes,
        }
    }

    pub fn capabilities(&self) -> &[Capability] {
        match self {
            Self::Module(m) => &m.capabilities,
            Self::Project(p) => &p.capabilities,
        }
    }

    /// Replace the attributes and requested capabilities of this selector.
    pub fn with_variant_request(mut self, attributes: Attributes, capabilities: Vec<Capability>) -> Self {
        match &mut self {
            Self::Module(m) => {
                m.attributes = attributes;
                m.capabilities = capabilities;
            }
            Self::Project(p) => {
                p.attributes = attributes;
                p.capabilities = capabilities;
            }
        }
        self
    }
}

impl fmt::Display for ComponentSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Module(m) if m.constraint.is_empty() => write!(f, "{}", m.module),
            Self::Module(m) => write!(f, "{}:{}", m.module, m.constraint),
            Self::Project(p) => write!(f, "project {}", p.path),
        }
    }
}
