//! Variant selection by attribute matching.
//!
//! A variant is a candidate when it provides the requested capabilities
//! (or the component's own capability when none are requested) and every
//! requested attribute it carries is equal or compatible with the request.
//! A variant that does not carry a requested attribute is still compatible.
//! Ties are broken in order by exact matches, attribute precedence, then
//! the fewest extra attributes.

use std::collections::{BTreeMap, BTreeSet};

use depsolve_core::attributes::{Attributes, Capability};
use depsolve_core::metadata::ComponentMetadata;

/// Per-attribute compatibility and disambiguation rules.
#[derive(Debug, Clone, Default)]
pub struct AttributeSchema {
    rules: BTreeMap<String, AttributeRule>,
}

#[derive(Debug, Clone, Default)]
struct AttributeRule {
    /// `(requested, produced)` pairs accepted besides equality.
    compatible: BTreeSet<(String, String)>,
    /// Produced values in order of preference when several variants match.
    precedence: Vec<String>,
}

impl AttributeSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept `produced` where `requested` is asked for.
    pub fn compatible(mut self, attribute: &str, requested: &str, produced: &str) -> Self {
        self.rules
            .entry(attribute.to_string())
            .or_default()
            .compatible
            .insert((requested.to_string(), produced.to_string()));
        self
    }

    /// Prefer variants whose value of `attribute` comes first in `values`.
    pub fn precedence(mut self, attribute: &str, values: &[&str]) -> Self {
        self.rules.entry(attribute.to_string()).or_default().precedence =
            values.iter().map(|v| v.to_string()).collect();
        self
    }

    fn is_compatible(&self, attribute: &str, requested: &str, produced: &str) -> bool {
        requested == produced
            || self.rules.get(attribute).is_some_and(|r| {
                r.compatible
                    .contains(&(requested.to_string(), produced.to_string()))
            })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VariantFailure {
    NoMatch { available: Vec<String> },
    Ambiguous { candidates: Vec<String> },
}

/// `selectVariant`: index of the chosen variant in `component.variants`.
pub fn select_variant(
    schema: &AttributeSchema,
    component: &ComponentMetadata,
    requested: &Attributes,
    capabilities: &[Capability],
) -> Result<usize, VariantFailure> {
    let implicit = component.module_version.module().clone();
    let mut candidates: Vec<usize> = component
        .variants
        .iter()
        .enumerate()
        .filter(|(_, variant)| {
            let provided = component.effective_capabilities(variant);
            if capabilities.is_empty() {
                provided.iter().any(|c| c.id() == implicit)
            } else {
                capabilities
                    .iter()
                    .all(|want| provided.iter().any(|c| c.id() == want.id()))
            }
        })
        .filter(|(_, variant)| {
            requested.iter().all(|(name, value)| match variant.attributes.get(name) {
                Some(produced) => schema.is_compatible(name, value, produced),
                None => true,
            })
        })
        .map(|(i, _)| i)
        .collect();

    if candidates.is_empty() {
        return Err(VariantFailure::NoMatch {
            available: component
                .variants
                .iter()
                .map(|v| format!("{} {}", v.name, v.attributes))
                .collect(),
        });
    }
    if candidates.len() == 1 {
        return Ok(candidates[0]);
    }

    // Exact matches beat merely compatible ones.
    let exact = |i: &usize| {
        requested
            .iter()
            .filter(|(name, value)| component.variants[*i].attributes.get(name) == Some(*value))
            .count()
    };
    retain_best(&mut candidates, |i| std::cmp::Reverse(exact(i)));

    for (attribute, rule) in &schema.rules {
        if rule.precedence.is_empty() || candidates.len() == 1 {
            continue;
        }
        retain_best(&mut candidates, |i| {
            component.variants[*i]
                .attributes
                .get(attribute)
                .and_then(|v| rule.precedence.iter().position(|p| p == v))
                .unwrap_or(usize::MAX)
        });
    }

    retain_best(&mut candidates, |i| {
        component.variants[*i]
            .attributes
            .iter()
            .filter(|(name, _)| !requested.contains(name))
            .count()
    });

    match candidates.as_slice() {
        [only] => Ok(*only),
        _ => Err(VariantFailure::Ambiguous {
            candidates: candidates
                .iter()
                .map(|i| component.variants[*i].name.clone())
                .collect(),
        }),
    }
}

/// Keep only candidates with the lowest key.
fn retain_best<K: Ord>(candidates: &mut Vec<usize>, key: impl Fn(&usize) -> K) {
    let Some(best) = candidates.iter().map(&key).min() else {
        return;
    };
    candidates.retain(|c| key(c) == best);
}
