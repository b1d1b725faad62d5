use serde::{Deserialize, Serialize};

use depsolve_util::errors::DepsolveError;

use crate::attributes::{Attributes, Capability};
use crate::constraint::VersionConstraint;
use crate::identity::ModuleIdentifier;
use crate::metadata::{DependencyMetadata, ExcludeRule};
use crate::selector::{ComponentSelector, ModuleComponentSelector, ProjectComponentSelector};

/// A dependency as written in a manifest or repository file.
///
/// Supports both shorthand (`"group:name:version"`) and detailed forms.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DependencySpec {
    Short(String),
    Detailed(DetailedDependency),
}

/// A dependency with explicit module (or project), version constraint, and
/// optional metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct DetailedDependency {
    /// `group:name`.
    pub module: Option<String>,
    /// Local project path, mutually exclusive with `module`.
    pub project: Option<String>,
    /// Alias of `require`.
    pub version: Option<String>,
    pub require: Option<String>,
    pub prefer: Option<String>,
    pub strictly: Option<String>,
    pub reject: Vec<String>,
    pub branch: Option<String>,
    /// Constraint-only dependency.
    pub constraint: bool,
    pub excludes: Vec<ExcludeSpec>,
    pub attributes: Attributes,
    /// Requested capabilities as `group:name`.
    pub capabilities: Vec<String>,
    pub because: Option<String>,
}

/// An exclusion in manifest form: either `"group:module"` or a table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExcludeSpec {
    Short(String),
    Detailed(ExcludeRule),
}

impl ExcludeSpec {
    pub fn to_rule(&self) -> miette::Result<ExcludeRule> {
        match self {
            Self::Short(s) => ExcludeRule::parse(s).ok_or_else(|| {
                DepsolveError::Manifest {
                    message: format!("Invalid exclusion '{s}', expected 'group:module'"),
                }
                .into()
            }),
            Self::Detailed(rule) => Ok(ExcludeRule::new(rule.group.as_deref(), rule.module.as_deref())),
        }
    }
}

impl DependencySpec {
    /// Convert to the resolver-facing representation. `name` is the key the
    /// dependency was declared under and is only used in error messages.
    pub fn to_metadata(&self, name: &str) -> miette::Result<DependencyMetadata> {
        match self {
            Self::Short(s) => {
                let selector = ComponentSelector::parse_module(s).ok_or_else(|| {
                    DepsolveError::Manifest {
                        message: format!(
                            "Invalid dependency '{name}' = \"{s}\", expected 'group:name:version'"
                        ),
                    }
                })?;
                Ok(DependencyMetadata::new(selector))
            }
            Self::Detailed(d) => d.to_metadata(name),
        }
    }
}

impl DetailedDependency {
    fn to_metadata(&self, name: &str) -> miette::Result<DependencyMetadata> {
        let capabilities = self
            .capabilities
            .iter()
            .map(|c| {
                Capability::parse(c).ok_or_else(|| DepsolveError::Manifest {
                    message: format!("Invalid capability '{c}' on dependency '{name}'"),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let selector = match (&self.module, &self.project) {
            (Some(_), Some(_)) => {
                return Err(DepsolveError::Manifest {
                    message: format!("Dependency '{name}' declares both a module and a project"),
                }
                .into())
            }
            (None, None) => {
                return Err(DepsolveError::Manifest {
                    message: format!("Dependency '{name}' must declare a module or a project"),
                }
                .into())
            }
            (Some(module), None) => {
                let module = ModuleIdentifier::parse(module).ok_or_else(|| DepsolveError::Manifest {
                    message: format!("Invalid module '{module}' on dependency '{name}', expected 'group:name'"),
                })?;
                ComponentSelector::Module(ModuleComponentSelector {
                    module,
                    constraint: self.constraint_spec(),
                    attributes: self.attributes.clone(),
                    capabilities,
                })
            }
            (None, Some(path)) => ComponentSelector::Project(ProjectComponentSelector {
                path: path.clone(),
                attributes: self.attributes.clone(),
                capabilities,
            }),
        };

        let excludes = self
            .excludes
            .iter()
            .map(ExcludeSpec::to_rule)
            .collect::<miette::Result<Vec<_>>>()?;

        Ok(DependencyMetadata {
            selector,
            excludes,
            constraint: self.constraint,
            reason: self.because.clone(),
        })
    }

    fn constraint_spec(&self) -> VersionConstraint {
        VersionConstraint {
            preferred: self.prefer.clone(),
            required: self.require.clone().or_else(|| self.version.clone()),
            strict: self.strictly.clone(),
            rejected: self.reject.clone(),
            branch: self.branch.clone(),
        }
    }
}
