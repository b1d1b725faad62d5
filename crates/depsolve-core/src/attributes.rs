//! Variant attributes and capabilities.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::identity::ModuleIdentifier;

/// An ordered set of `name = value` attributes describing a variant, or the
/// attributes a consumer requests.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Attributes(BTreeMap<String, String>);

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, name: &str, value: &str) -> Self {
        self.0.insert(name.to_string(), value.to_string());
        self
    }

    pub fn insert(&mut self, name: &str, value: &str) {
        self.0.insert(name.to_string(), value.to_string());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Attributes of `self` overlaid with those of `other`; `other` wins on
    /// conflicting keys.
    pub fn merged_with(&self, other: &Attributes) -> Attributes {
        let mut merged = self.0.clone();
        for (k, v) in &other.0 {
            merged.insert(k.clone(), v.clone());
        }
        Attributes(merged)
    }
}

impl FromIterator<(String, String)> for Attributes {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Display for Attributes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (k, v)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{k}={v}")?;
        }
        f.write_str("}")
    }
}

/// A named feature a component claims to provide.
///
/// Two components providing a capability with the same `group:name` cannot
/// both live in a resolved graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Capability {
    pub group: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl Capability {
    pub fn new(group: &str, name: &str, version: Option<&str>) -> Self {
        Self {
            group: group.to_string(),
            name: name.to_string(),
            version: version.map(str::to_string),
        }
    }

    /// Parse `"group:name"` or `"group:name:version"`.
    pub fn parse(s: &str) -> Option<Self> {
        let parts: Vec<&str> = s.split(':').collect();
        match parts.as_slice() {
            [g, n] if !g.is_empty() && !n.is_empty() => Some(Self::new(g, n, None)),
            [g, n, v] if !g.is_empty() && !n.is_empty() && !v.is_empty() => {
                Some(Self::new(g, n, Some(v)))
            }
            _ => None,
        }
    }

    /// The capability every module implicitly provides: its own identity.
    pub fn implicit(module: &ModuleIdentifier, version: &str) -> Self {
        Self::new(module.group(), module.name(), Some(version))
    }

    /// The version-less identity used to detect conflicts.
    pub fn id(&self) -> ModuleIdentifier {
        ModuleIdentifier::new(&self.group, &self.name)
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.version {
            Some(v) => write!(f, "{}:{}:{v}", self.group, self.name),
            None => write!(f, "{}:{}", self.group, self.name),
        }
    }
}
