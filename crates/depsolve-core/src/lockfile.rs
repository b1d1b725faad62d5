use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::identity::ModuleIdentifier;

/// Lockfile pinning the version of every resolved module.
///
/// During resolution each entry acts as a forced candidate for its module.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Lockfile {
    #[serde(default)]
    pub locked: Vec<LockedModule>,
}

/// A single pinned module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockedModule {
    pub group: String,
    pub name: String,
    pub version: String,
}

impl Lockfile {
    /// Load and parse a `depsolve.lock` file from the given path.
    pub fn from_path(path: &Path) -> miette::Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            depsolve_util::errors::DepsolveError::Generic {
                message: format!("Failed to read lockfile: {e}"),
            }
        })?;
        toml::from_str(&content).map_err(|e| {
            depsolve_util::errors::DepsolveError::Generic {
                message: format!("Failed to parse lockfile: {e}"),
            }
            .into()
        })
    }

    /// Build a lockfile from resolved modules, sorted for stable output.
    pub fn generate(mut locked: Vec<LockedModule>) -> Self {
        locked.sort_by(|a, b| (&a.group, &a.name).cmp(&(&b.group, &b.name)));
        locked.dedup_by(|a, b| a.group == b.group && a.name == b.name);
        Self { locked }
    }

    /// Serialize the lockfile to a pretty-printed TOML string.
    pub fn to_string_pretty(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Write the lockfile to disk.
    pub fn write_to(&self, path: &Path) -> miette::Result<()> {
        let content = self.to_string_pretty().map_err(|e| {
            depsolve_util::errors::DepsolveError::Generic {
                message: format!("Failed to serialize lockfile: {e}"),
            }
        })?;
        std::fs::write(path, content).map_err(depsolve_util::errors::DepsolveError::Io)?;
        Ok(())
    }

    /// The pinned version of a module, if any.
    pub fn locked_version(&self, module: &ModuleIdentifier) -> Option<&str> {
        self.locked
            .iter()
            .find(|l| l.group == module.group() && l.name == module.name())
            .map(|l| l.version.as_str())
    }
}
