//! User-declared resolution rules in manifest form.
//!
//! These are loaded once at the start of a resolution and compiled by the
//! resolver into its rule engines.

use serde::{Deserialize, Serialize};

use depsolve_util::errors::DepsolveError;

use crate::dependency::ExcludeSpec;
use crate::identity::{ModuleIdentifier, ModuleVersionIdentifier};
use crate::metadata::ExcludeRule;

/// The `[rules]` table of a manifest.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct RulesSpec {
    /// Exclusions applied to every edge of the graph, including the root's.
    pub exclude: Vec<ExcludeSpec>,
    pub substitute: Vec<SubstitutionSpec>,
    /// Forced versions as `group:name:version`.
    pub force: Vec<String>,
    pub replace: Vec<ReplacementSpec>,
    pub capability: Vec<CapabilityRuleSpec>,
}

/// Replace requests for `from` with `to`.
///
/// `from` is `group:name` (any version) or `group:name:version`. `to` is
/// `group:name:version`, `group:name` (keep the requested version), or
/// `project:<path>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SubstitutionSpec {
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub because: Option<String>,
}

/// `module` has been replaced by `with`; both cannot live in one graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ReplacementSpec {
    pub module: String,
    pub with: String,
    #[serde(default)]
    pub because: Option<String>,
}

/// How to settle a conflict on `capability`: `select = "highest"` or
/// `select = "group:name"`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CapabilityRuleSpec {
    pub capability: String,
    pub select: String,
    #[serde(default)]
    pub because: Option<String>,
}

/// Target of a substitution in parsed form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubstitutionTarget {
    Module {
        module: ModuleIdentifier,
        version: Option<String>,
    },
    Project(String),
}

impl SubstitutionSpec {
    /// Parse `from` into a module and optional version.
    pub fn parse_from(&self) -> miette::Result<(ModuleIdentifier, Option<String>)> {
        if let Some(id) = ModuleVersionIdentifier::parse(&self.from) {
            return Ok((id.module().clone(), Some(id.version().to_string())));
        }
        ModuleIdentifier::parse(&self.from)
            .map(|m| (m, None))
            .ok_or_else(|| {
                DepsolveError::Manifest {
                    message: format!("Invalid substitution source '{}'", self.from),
                }
                .into()
            })
    }

    pub fn parse_to(&self) -> miette::Result<SubstitutionTarget> {
        if let Some(path) = self.to.strip_prefix("project:") {
            if path.is_empty() {
                return Err(DepsolveError::Manifest {
                    message: format!("Invalid substitution target '{}'", self.to),
                }
                .into());
            }
            return Ok(SubstitutionTarget::Project(path.to_string()));
        }
        if let Some(id) = ModuleVersionIdentifier::parse(&self.to) {
            return Ok(SubstitutionTarget::Module {
                module: id.module().clone(),
                version: Some(id.version().to_string()),
            });
        }
        ModuleIdentifier::parse(&self.to)
            .map(|module| SubstitutionTarget::Module {
                module,
                version: None,
            })
            .ok_or_else(|| {
                DepsolveError::Manifest {
                    message: format!("Invalid substitution target '{}'", self.to),
                }
                .into()
            })
    }
}

impl RulesSpec {
    pub fn exclude_rules(&self) -> miette::Result<Vec<ExcludeRule>> {
        self.exclude.iter().map(ExcludeSpec::to_rule).collect()
    }

    pub fn forced_versions(&self) -> miette::Result<Vec<ModuleVersionIdentifier>> {
        self.force
            .iter()
            .map(|f| {
                ModuleVersionIdentifier::parse(f).ok_or_else(|| {
                    DepsolveError::Manifest {
                        message: format!("Invalid forced module '{f}', expected 'group:name:version'"),
                    }
                    .into()
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_rules_table() {
        let rules: RulesSpec = toml::from_str(
            r#"
exclude = ["commons-logging:commons-logging"]
force = ["com.acme:lib:1.2"]

[[substitute]]
from = "com.acme:legacy"
to = "project::legacy"

[[replace]]
module = "com.google.collections:google-collections"
with = "com.google.guava:guava"

[[capability]]
capability = "org.lib:logging"
select = "highest"
"#,
        )
        .unwrap();
        assert_eq!(rules.exclude_rules().unwrap().len(), 1);
        assert_eq!(rules.forced_versions().unwrap()[0].to_string(), "com.acme:lib:1.2");
        assert_eq!(
            rules.substitute[0].parse_to().unwrap(),
            SubstitutionTarget::Project(":legacy".into())
        );
        assert_eq!(rules.replace.len(), 1);
        assert_eq!(rules.capability[0].select, "highest");
    }

    #[test]
    fn substitution_from_with_version() {
        let spec = SubstitutionSpec {
            from: "g:n:1.0".into(),
            to: "g:m".into(),
            because: None,
        };
        let (module, version) = spec.parse_from().unwrap();
        assert_eq!(module.to_string(), "g:n");
        assert_eq!(version.as_deref(), Some("1.0"));
        assert!(matches!(
            spec.parse_to().unwrap(),
            SubstitutionTarget::Module { version: None, .. }
        ));
    }

    #[test]
    fn invalid_force_is_an_error() {
        let rules = RulesSpec {
            force: vec!["nope".into()],
            ..Default::default()
        };
        assert!(rules.forced_versions().is_err());
    }
}
