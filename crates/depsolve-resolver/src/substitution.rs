//! Dependency substitution engine.
//!
//! Rules are tried in declaration order and the first one that applies wins.
//! A selector is substituted at most once: the output of a rule is never fed
//! back into the rule set.

use std::fmt;
use std::sync::Arc;

use depsolve_core::constraint::VersionConstraint;
use depsolve_core::identity::ModuleIdentifier;
use depsolve_core::rules::SubstitutionTarget;
use depsolve_core::selector::{ComponentSelector, ModuleComponentSelector, ProjectComponentSelector};

/// A user-supplied substitution evaluated in code.
pub trait SubstitutionRule: Send + Sync {
    /// Returns the replacement selector, `None` to leave the selector alone,
    /// or an error message that is reported as a failure on the edge.
    fn substitute(&self, selector: &ComponentSelector) -> Result<Option<ComponentSelector>, String>;

    /// Whether this rule may redirect modules to local projects.
    fn may_target_projects(&self) -> bool {
        true
    }
}

#[derive(Clone)]
pub enum Substitution {
    /// `from` (optionally only a given requested version) becomes `to`.
    Module {
        from: ModuleIdentifier,
        version: Option<String>,
        to: SubstitutionTarget,
        reason: Option<String>,
    },
    Custom(Arc<dyn SubstitutionRule>),
}

impl fmt::Debug for Substitution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Module { from, version, to, .. } => f
                .debug_struct("Module")
                .field("from", from)
                .field("version", version)
                .field("to", to)
                .finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// A selector after substitution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Substituted {
    pub selector: ComponentSelector,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct SubstitutionEngine {
    rules: Vec<Substitution>,
}

impl SubstitutionEngine {
    pub fn new(rules: Vec<Substitution>) -> Self {
        Self { rules }
    }

    pub fn push(&mut self, rule: Substitution) {
        self.rules.push(rule);
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Whether any rule could turn a module selector into a project.
    pub fn targets_projects(&self) -> bool {
        self.rules.iter().any(|r| match r {
            Substitution::Module { to, .. } => matches!(to, SubstitutionTarget::Project(_)),
            Substitution::Custom(rule) => rule.may_target_projects(),
        })
    }

    /// Apply the first matching rule. `Ok(None)` means no rule applied.
    pub fn substitute(&self, selector: &ComponentSelector) -> Result<Option<Substituted>, String> {
        for rule in &self.rules {
            let replaced = match rule {
                Substitution::Module { from, version, to, reason } => {
                    apply_module_rule(selector, from, version.as_deref(), to).map(|s| Substituted {
                        selector: s,
                        reason: reason.clone(),
                    })
                }
                Substitution::Custom(rule) => rule.substitute(selector)?.map(|s| Substituted {
                    selector: s,
                    reason: None,
                }),
            };
            if let Some(substituted) = replaced {
                if substituted.selector != *selector {
                    tracing::trace!(from = %selector, to = %substituted.selector, "substituted selector");
                    return Ok(Some(substituted));
                }
            }
        }
        Ok(None)
    }
}

fn apply_module_rule(
    selector: &ComponentSelector,
    from: &ModuleIdentifier,
    version: Option<&str>,
    to: &SubstitutionTarget,
) -> Option<ComponentSelector> {
    let ComponentSelector::Module(requested) = selector else {
        return None;
    };
    if requested.module != *from {
        return None;
    }
    if let Some(version) = version {
        if requested.constraint.effective_required() != Some(version) {
            return None;
        }
    }
    Some(match to {
        SubstitutionTarget::Module { module, version } => ComponentSelector::Module(ModuleComponentSelector {
            module: module.clone(),
            constraint: match version {
                Some(v) => VersionConstraint::require(v),
                None => requested.constraint.clone(),
            },
            attributes: requested.attributes.clone(),
            capabilities: requested.capabilities.clone(),
        }),
        SubstitutionTarget::Project(path) => ComponentSelector::Project(ProjectComponentSelector {
            path: path.clone(),
            attributes: requested.attributes.clone(),
            capabilities: requested.capabilities.clone(),
        }),
    })
}
