use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::attributes::Attributes;
use crate::config::ResolverOverrides;
use crate::dependency::DependencySpec;
use crate::identity::{ModuleIdentifier, ModuleVersionIdentifier};
use crate::metadata::DependencyMetadata;
use crate::rules::RulesSpec;

/// The parsed representation of a `depsolve.toml` resolution manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub root: RootMetadata,

    /// Root dependencies keyed by a local name. Declaration order is the
    /// key order.
    #[serde(default)]
    pub dependencies: BTreeMap<String, DependencySpec>,

    #[serde(default)]
    pub rules: RulesSpec,

    #[serde(default)]
    pub resolver: Option<ResolverOverrides>,

    /// Lockfile path, relative to the manifest.
    #[serde(default)]
    pub lockfile: Option<String>,
}

/// Identity and requested attributes of the component being resolved, from
/// the `[root]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RootMetadata {
    pub group: String,
    pub name: String,
    #[serde(default = "default_root_version")]
    pub version: String,
    #[serde(default)]
    pub attributes: Attributes,
}

fn default_root_version() -> String {
    "unspecified".to_string()
}

impl RootMetadata {
    pub fn id(&self) -> ModuleVersionIdentifier {
        ModuleIdentifier::new(&self.group, &self.name).with_version(&self.version)
    }
}

impl Manifest {
    /// Load and parse a manifest from disk.
    pub fn from_path(path: &Path) -> miette::Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            depsolve_util::errors::DepsolveError::Manifest {
                message: format!("Failed to read {}: {e}", path.display()),
            }
        })?;
        Self::from_str(&content)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> miette::Result<Self> {
        toml::from_str(content).map_err(|e| {
            depsolve_util::errors::DepsolveError::Manifest {
                message: format!("Failed to parse manifest: {e}"),
            }
            .into()
        })
    }

    /// The root's dependencies in declaration order.
    pub fn root_dependencies(&self) -> miette::Result<Vec<DependencyMetadata>> {
        self.dependencies
            .iter()
            .map(|(name, dep)| dep.to_metadata(name))
            .collect()
    }

    /// Resolve the lockfile path against the manifest directory.
    pub fn lockfile_path(&self, manifest_dir: &Path) -> Option<PathBuf> {
        self.lockfile.as_ref().map(|p| manifest_dir.join(p))
    }
}
