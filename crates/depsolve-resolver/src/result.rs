//! Turns the builder's state at its fixed point into a [`ResolvedGraph`].

use std::collections::HashMap;

use petgraph::stable_graph::NodeIndex;

use depsolve_core::config::ResolverConfig;
use depsolve_core::identity::ModuleIdentifier;

use crate::builder::GraphBuilder;
use crate::conflict::{SelectionReason, VersionConflict};
use crate::failure::ResolutionFailure;
use crate::graph::{ResolvedComponent, ResolvedDependency, ResolvedGraph};
use crate::state::{EdgeFailure, EdgeId, MetadataState, ModuleFailure, NodeState, ResolutionState, Traversal};
use crate::variant::VariantFailure;

/// Assemble the resolved graph and collect every failure that still applies
/// to the live part of the graph.
pub(crate) fn assemble(builder: &GraphBuilder<'_>, config: &ResolverConfig) -> ResolvedGraph {
    let state = &builder.state;
    let traversal = state.traverse();

    let mut graph = ResolvedGraph::new(component(state, state.root));
    let mut mapped: HashMap<NodeIndex, petgraph::graph::NodeIndex> = HashMap::new();
    mapped.insert(state.root, graph.root());
    for &node in traversal.order.iter().filter(|&&n| n != state.root) {
        mapped.insert(node, graph.add_component(component(state, node)));
    }
    for &node in &traversal.order {
        for &id in state.node(node).outgoing.iter().flatten() {
            let Some(target) = state.linked_target(id) else {
                continue;
            };
            if let (Some(&from), Some(&to)) = (mapped.get(&node), mapped.get(&target)) {
                graph.add_dependency(from, to, dependency(state, id));
            }
        }
    }

    let mut failures = edge_failures(state, &traversal);
    failures.extend(module_failures(state, &traversal));
    for (capability, candidates) in &builder.capability_failures {
        failures.push(ResolutionFailure::CapabilityConflict {
            capability: capability.to_string(),
            providers: candidates.iter().map(ToString::to_string).collect(),
        });
    }
    if config.fail_on_dynamic_versions {
        failures.extend(dynamic_versions(state, &traversal));
    }
    graph.failures = failures;

    for conflict in conflicts(state) {
        graph.conflicts.add(conflict);
    }
    graph
}

fn component(state: &ResolutionState, index: NodeIndex) -> ResolvedComponent {
    let node: &NodeState = state.node(index);
    let variant = node.metadata.variants.get(node.variant);
    ResolvedComponent {
        id: node.component.clone(),
        module: node.module.clone(),
        version: node.metadata.module_version.version().to_string(),
        variant: node.variant_name().to_string(),
        attributes: variant.map(|v| v.attributes.clone()).unwrap_or_default(),
        capabilities: variant
            .map(|v| node.metadata.effective_capabilities(v))
            .unwrap_or_default(),
        reason: reason(state, index),
    }
}

fn reason(state: &ResolutionState, index: NodeIndex) -> SelectionReason {
    if index == state.root {
        return SelectionReason::Root;
    }
    let module = &state.node(index).module;
    let evicted = state
        .modules
        .values()
        .filter_map(|m| m.evicted_by.as_ref())
        .find(|d| d.winner == *module);
    if let Some(decision) = evicted {
        return decision.reason;
    }
    state
        .modules
        .get(module)
        .and_then(|m| m.selected.as_ref())
        .map_or(SelectionReason::Requested, |d| d.reason)
}

fn dependency(state: &ResolutionState, id: EdgeId) -> ResolvedDependency {
    let edge = &state.edges[id];
    ResolvedDependency {
        requested: edge.dependency.selector.to_string(),
        substituted: edge.is_substituted().then(|| edge.selector.to_string()),
        reason: edge
            .substitution
            .clone()
            .flatten()
            .or_else(|| edge.dependency.reason.clone()),
    }
}

/// Edges of reachable nodes that failed on their own account.
fn edge_failures(state: &ResolutionState, traversal: &Traversal) -> Vec<ResolutionFailure> {
    let mut failures = Vec::new();
    for &node in &traversal.order {
        for &id in state.node(node).outgoing.iter().flatten() {
            let edge = &state.edges[id];
            if edge.excluded || edge.is_constraint() {
                continue;
            }
            let Some(failure) = &edge.failure else {
                continue;
            };
            let path = state.path_to(edge.from, traversal);
            let selector = edge.dependency.selector.to_string();
            failures.push(match failure {
                EdgeFailure::Substitution(message) => ResolutionFailure::Substitution {
                    selector,
                    message: message.clone(),
                    path,
                    mandatory: edge.mandatory,
                },
                EdgeFailure::Project(fetch) => ResolutionFailure::Fetch {
                    selector,
                    message: fetch.to_string(),
                    path,
                    mandatory: edge.mandatory,
                },
                EdgeFailure::Variant {
                    failure,
                    component,
                    requested,
                } => {
                    let path = path.child(selector);
                    match failure {
                        VariantFailure::NoMatch { available } => ResolutionFailure::NoMatchingVariant {
                            component: component.to_string(),
                            requested: requested.clone(),
                            available: available.clone(),
                            path,
                        },
                        VariantFailure::Ambiguous { candidates } => ResolutionFailure::AmbiguousVariant {
                            component: component.to_string(),
                            requested: requested.clone(),
                            candidates: candidates.clone(),
                            path,
                        },
                    }
                }
            });
        }
    }
    failures
}

/// Modules still requested from the live graph whose selection failed.
fn module_failures(state: &ResolutionState, traversal: &Traversal) -> Vec<ResolutionFailure> {
    let mut failures = Vec::new();
    for (module, module_state) in &state.modules {
        let edges = state.hard_incoming(module);
        let Some(&first) = edges.first() else {
            continue;
        };
        let mandatory = edges.iter().any(|&id| state.edges[id].mandatory);

        match &module_state.failure {
            Some(ModuleFailure::Conflict { message, requested }) => {
                let mut requested = requested.clone();
                requested.extend(state.provenance(&edges, traversal));
                requested.sort();
                requested.dedup();
                failures.push(ResolutionFailure::VersionConflict {
                    module: module.clone(),
                    message: message.clone(),
                    requested,
                });
            }
            Some(ModuleFailure::Listing(fetch)) => failures.push(ResolutionFailure::Fetch {
                selector: state.edges[first].selector.to_string(),
                message: fetch.to_string(),
                path: state.path_to(state.edges[first].from, traversal),
                mandatory,
            }),
            None => {
                let Some(decision) = &module_state.selected else {
                    continue;
                };
                let component = decision.selected.component(module);
                if let Some(MetadataState::Failed(fetch)) = state.components.get(&component) {
                    failures.push(ResolutionFailure::Fetch {
                        selector: state.edges[first].selector.to_string(),
                        message: fetch.to_string(),
                        path: state.path_to(state.edges[first].from, traversal),
                        mandatory,
                    });
                }
            }
        }
    }
    failures
}

fn dynamic_versions(state: &ResolutionState, traversal: &Traversal) -> Vec<ResolutionFailure> {
    let mut failures = Vec::new();
    for &node in &traversal.order {
        for &id in state.node(node).outgoing.iter().flatten() {
            let edge = &state.edges[id];
            if edge.link.is_some() && edge.project.is_none() && edge.constraint.is_dynamic() {
                failures.push(ResolutionFailure::DynamicVersion {
                    selector: edge.selector.to_string(),
                    path: state.path_through(id, traversal),
                });
            }
        }
    }
    failures
}

/// Modules whose requests disagreed, or whose version was imposed.
fn conflicts(state: &ResolutionState) -> Vec<VersionConflict> {
    let mut report = Vec::new();
    for (module, module_state) in &state.modules {
        let Some(decision) = &module_state.selected else {
            continue;
        };
        let edges = state.hard_incoming(module);
        if edges.is_empty() {
            continue;
        }
        let requested = requested_versions(state, module, &edges);
        let resolved = decision.selected.version().original.clone();
        let imposed = matches!(decision.reason, SelectionReason::Forced | SelectionReason::Locked)
            && requested.iter().any(|r| *r != resolved);
        if requested.len() > 1 || imposed {
            report.push(VersionConflict {
                module: module.clone(),
                requested,
                resolved,
                reason: decision.reason,
            });
        }
    }
    report
}

fn requested_versions(state: &ResolutionState, module: &ModuleIdentifier, edges: &[EdgeId]) -> Vec<String> {
    let mut requested: Vec<String> = Vec::new();
    for &id in edges {
        let edge = &state.edges[id];
        let text = match (&edge.project, edge.selector.constraint()) {
            (Some(project), _) => format!("project {}", project.path),
            (None, Some(constraint)) if !constraint.is_empty() => constraint.to_string(),
            (None, _) => module.to_string(),
        };
        if !requested.contains(&text) {
            requested.push(text);
        }
    }
    requested
}
