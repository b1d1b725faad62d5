//! Rule sets compiled once at the start of a resolution.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use depsolve_core::identity::{ModuleIdentifier, ModuleVersionIdentifier};
use depsolve_core::metadata::ExcludeRule;
use depsolve_core::rules::RulesSpec;
use depsolve_util::errors::DepsolveError;

use crate::conflict::CapabilityResolver;
use crate::substitution::{Substitution, SubstitutionEngine, SubstitutionRule};

/// `module` has been superseded by `with`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleReplacement {
    pub module: ModuleIdentifier,
    pub with: ModuleIdentifier,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CapabilitySelect {
    /// The provider with the highest capability version.
    Highest,
    Module(ModuleIdentifier),
}

/// Declarative resolution of conflicts on one capability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilityRule {
    pub capability: ModuleIdentifier,
    pub select: CapabilitySelect,
    pub reason: Option<String>,
}

/// User-declared rules, immutable for the duration of a resolution.
#[derive(Clone, Default)]
pub struct ResolutionRules {
    pub excludes: Vec<ExcludeRule>,
    pub substitutions: SubstitutionEngine,
    pub forced: BTreeMap<ModuleIdentifier, String>,
    pub replacements: Vec<ModuleReplacement>,
    pub capability_rules: Vec<CapabilityRule>,
    pub capability_resolvers: Vec<Arc<dyn CapabilityResolver>>,
}

impl fmt::Debug for ResolutionRules {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolutionRules")
            .field("excludes", &self.excludes)
            .field("substitutions", &self.substitutions)
            .field("forced", &self.forced)
            .field("replacements", &self.replacements)
            .field("capability_rules", &self.capability_rules)
            .field("capability_resolvers", &self.capability_resolvers.len())
            .finish()
    }
}

impl ResolutionRules {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile the `[rules]` table of a manifest.
    pub fn from_spec(spec: &RulesSpec) -> miette::Result<Self> {
        let mut rules = Self::new();
        rules.excludes = spec.exclude_rules()?;
        for sub in &spec.substitute {
            let (from, version) = sub.parse_from()?;
            rules.substitutions.push(Substitution::Module {
                from,
                version,
                to: sub.parse_to()?,
                reason: sub.because.clone(),
            });
        }
        for forced in spec.forced_versions()? {
            rules.forced.insert(forced.module().clone(), forced.version().to_string());
        }
        for replacement in &spec.replace {
            rules.replacements.push(ModuleReplacement {
                module: parse_module(&replacement.module)?,
                with: parse_module(&replacement.with)?,
                reason: replacement.because.clone(),
            });
        }
        for rule in &spec.capability {
            let select = match rule.select.as_str() {
                "highest" => CapabilitySelect::Highest,
                other => CapabilitySelect::Module(parse_module(other)?),
            };
            rules.capability_rules.push(CapabilityRule {
                capability: parse_module(&rule.capability)?,
                select,
                reason: rule.because.clone(),
            });
        }
        Ok(rules)
    }

    pub fn exclude(mut self, rule: ExcludeRule) -> Self {
        self.excludes.push(rule);
        self
    }

    pub fn substitute(mut self, rule: Substitution) -> Self {
        self.substitutions.push(rule);
        self
    }

    pub fn substitute_with(self, rule: Arc<dyn SubstitutionRule>) -> Self {
        self.substitute(Substitution::Custom(rule))
    }

    pub fn force(mut self, id: &ModuleVersionIdentifier) -> Self {
        self.forced.insert(id.module().clone(), id.version().to_string());
        self
    }

    pub fn replace(mut self, module: ModuleIdentifier, with: ModuleIdentifier) -> Self {
        self.replacements.push(ModuleReplacement {
            module,
            with,
            reason: None,
        });
        self
    }

    pub fn capability_rule(mut self, rule: CapabilityRule) -> Self {
        self.capability_rules.push(rule);
        self
    }

    pub fn capability_resolver(mut self, resolver: Arc<dyn CapabilityResolver>) -> Self {
        self.capability_resolvers.push(resolver);
        self
    }

    /// Modules whose capability `module` also provides through a
    /// replacement rule.
    pub fn replaced_by(&self, module: &ModuleIdentifier) -> impl Iterator<Item = &ModuleReplacement> {
        let module = module.clone();
        self.replacements.iter().filter(move |r| r.with == module)
    }
}

fn parse_module(s: &str) -> miette::Result<ModuleIdentifier> {
    ModuleIdentifier::parse(s).ok_or_else(|| {
        DepsolveError::Manifest {
            message: format!("Invalid module '{s}' in [rules], expected 'group:name'"),
        }
        .into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compile_manifest_rules() {
        let spec: RulesSpec = toml::from_str(
            r#"
exclude = ["org.slf4j:*"]
force = ["com.acme:lib:1.2"]

[[substitute]]
from = "com.acme:legacy"
to = "project::legacy"
because = "moved in-tree"

[[replace]]
module = "com.google.collections:google-collections"
with = "com.google.guava:guava"

[[capability]]
capability = "org.lib:logging"
select = "org.lib:log-b"
"#,
        )
        .unwrap();
        let rules = ResolutionRules::from_spec(&spec).unwrap();
        assert_eq!(rules.excludes.len(), 1);
        assert_eq!(
            rules.forced.get(&ModuleIdentifier::new("com.acme", "lib")).map(String::as_str),
            Some("1.2")
        );
        assert!(rules.substitutions.targets_projects());
        let guava = ModuleIdentifier::new("com.google.guava", "guava");
        assert_eq!(rules.replaced_by(&guava).count(), 1);
        assert_eq!(
            rules.capability_rules[0].select,
            CapabilitySelect::Module(ModuleIdentifier::new("org.lib", "log-b"))
        );
    }

    #[test]
    fn invalid_capability_selection_is_rejected() {
        let spec: RulesSpec = toml::from_str(
            r#"
[[capability]]
capability = "org.lib:logging"
select = "whatever"
"#,
        )
        .unwrap();
        assert!(ResolutionRules::from_spec(&spec).is_err());
    }
}
