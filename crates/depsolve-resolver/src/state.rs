//! Per-resolution mutable state.
//!
//! Nodes live in an arena addressed by stable indices and are never removed:
//! a node that stops being reachable from the root is marked retracted and
//! can be revived later. Links between nodes are the arena's graph edges;
//! each one carries the id of the declared dependency edge it realises.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Arc;

use petgraph::stable_graph::{EdgeIndex, NodeIndex, StableDiGraph};
use petgraph::visit::Bfs;

use depsolve_core::attributes::Attributes;
use depsolve_core::identity::{ComponentId, ModuleIdentifier};
use depsolve_core::metadata::{ComponentMetadata, DependencyMetadata};
use depsolve_core::selector::ComponentSelector;

use crate::conflict::{CapabilityDecision, Decision, ProjectCandidate};
use crate::constraint::ParsedConstraint;
use crate::exclude::ExclusionSpec;
use crate::failure::{Provenance, SelectorPath};
use crate::provider::FetchFailure;
use crate::variant::VariantFailure;
use crate::version::Version;

pub(crate) type EdgeId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum NodeStatus {
    Live,
    Retracted,
}

/// One resolved (component, variant) pair.
#[derive(Debug)]
pub(crate) struct NodeState {
    pub component: ComponentId,
    pub module: ModuleIdentifier,
    pub metadata: Arc<ComponentMetadata>,
    pub variant: usize,
    pub status: NodeStatus,
    /// Declared edges, in declaration order. `None` until the node is visited.
    pub outgoing: Option<Vec<EdgeId>>,
    /// Exclusions inherited from every path reaching this node.
    pub excludes: ExclusionSpec,
}

impl NodeState {
    pub fn variant_name(&self) -> &str {
        self.metadata
            .variants
            .get(self.variant)
            .map_or("", |v| v.name.as_str())
    }

    pub fn dependencies(&self) -> &[DependencyMetadata] {
        self.metadata
            .variants
            .get(self.variant)
            .map_or(&[], |v| v.dependencies.as_slice())
    }

    pub fn is_live(&self) -> bool {
        self.status == NodeStatus::Live
    }
}

#[derive(Debug, Clone)]
pub(crate) enum EdgeFailure {
    /// A substitution rule failed or produced an unusable selector.
    Substitution(String),
    /// The targeted project does not exist.
    Project(FetchFailure),
    Variant {
        failure: VariantFailure,
        component: ComponentId,
        requested: Attributes,
    },
}

impl EdgeFailure {
    /// Permanent failures take the edge out of resolution entirely.
    pub fn is_permanent(&self) -> bool {
        !matches!(self, Self::Variant { .. })
    }
}

/// A declared dependency of a node.
#[derive(Debug)]
pub(crate) struct EdgeState {
    pub from: NodeIndex,
    pub dependency: DependencyMetadata,
    /// The selector after substitution.
    pub selector: ComponentSelector,
    pub constraint: ParsedConstraint,
    /// Set when a substitution applied, with the rule's reason.
    pub substitution: Option<Option<String>>,
    pub declared_excludes: ExclusionSpec,
    /// The module this edge competes for. Unknown for projects until their
    /// metadata has been read.
    pub target: Option<ModuleIdentifier>,
    pub project: Option<ProjectCandidate>,
    pub excluded: bool,
    pub link: Option<EdgeIndex>,
    pub failure: Option<EdgeFailure>,
    pub mandatory: bool,
}

impl EdgeState {
    pub fn is_constraint(&self) -> bool {
        self.dependency.constraint
    }

    pub fn is_substituted(&self) -> bool {
        self.substitution.is_some()
    }

    pub fn has_permanent_failure(&self) -> bool {
        self.failure.as_ref().is_some_and(EdgeFailure::is_permanent)
    }
}

#[derive(Debug, Clone)]
pub(crate) enum ModuleFailure {
    /// No version satisfies the requests, as seen when the conflict was
    /// found. Requests from subtrees retracted afterwards stay listed.
    Conflict {
        message: String,
        requested: Vec<Provenance>,
    },
    Listing(FetchFailure),
}

#[derive(Debug, Default)]
pub(crate) struct ModuleState {
    /// Every edge ever aimed at this module; liveness is checked on use.
    pub incoming: Vec<EdgeId>,
    pub selected: Option<Decision>,
    pub changes: u32,
    pub failure: Option<ModuleFailure>,
    pub versions: Option<Result<Arc<Vec<Version>>, FetchFailure>>,
    /// Set when another module won a capability conflict against this one.
    pub evicted_by: Option<CapabilityDecision>,
}

#[derive(Debug, Clone)]
pub(crate) enum MetadataState {
    Resolved(Arc<ComponentMetadata>),
    Failed(FetchFailure),
}

/// Breadth-first spanning tree of the live graph, in declaration order.
#[derive(Debug, Default)]
pub(crate) struct Traversal {
    pub order: Vec<NodeIndex>,
    /// The edge through which each node was first reached.
    pub parents: HashMap<NodeIndex, EdgeId>,
}

#[derive(Debug)]
pub(crate) struct ResolutionState {
    pub graph: StableDiGraph<NodeState, EdgeId>,
    pub root: NodeIndex,
    registry: HashMap<(ComponentId, String), NodeIndex>,
    pub edges: Vec<EdgeState>,
    pub modules: BTreeMap<ModuleIdentifier, ModuleState>,
    pub components: HashMap<ComponentId, MetadataState>,
}

impl ResolutionState {
    pub fn new(root: Arc<ComponentMetadata>, excludes: ExclusionSpec) -> Self {
        let mut graph = StableDiGraph::new();
        let component = root.id.clone();
        let name = root.variants.first().map(|v| v.name.clone()).unwrap_or_default();
        let root_index = graph.add_node(NodeState {
            component: component.clone(),
            module: root.module_version.module().clone(),
            metadata: root.clone(),
            variant: 0,
            status: NodeStatus::Live,
            outgoing: None,
            excludes,
        });
        let mut registry = HashMap::new();
        registry.insert((component.clone(), name), root_index);
        let mut components = HashMap::new();
        components.insert(component, MetadataState::Resolved(root));
        Self {
            graph,
            root: root_index,
            registry,
            edges: Vec::new(),
            modules: BTreeMap::new(),
            components,
        }
    }

    pub fn node(&self, index: NodeIndex) -> &NodeState {
        &self.graph[index]
    }

    pub fn node_mut(&mut self, index: NodeIndex) -> &mut NodeState {
        &mut self.graph[index]
    }

    pub fn root_module(&self) -> &ModuleIdentifier {
        &self.graph[self.root].module
    }

    pub fn module_mut(&mut self, module: &ModuleIdentifier) -> &mut ModuleState {
        self.modules.entry(module.clone()).or_default()
    }

    /// The node for `(component, variant)`, creating it on first use.
    /// Returns whether the node was created.
    pub fn node_for(&mut self, metadata: &Arc<ComponentMetadata>, variant: usize) -> (NodeIndex, bool) {
        let name = metadata
            .variants
            .get(variant)
            .map(|v| v.name.clone())
            .unwrap_or_default();
        let key = (metadata.id.clone(), name);
        if let Some(&index) = self.registry.get(&key) {
            return (index, false);
        }
        let index = self.graph.add_node(NodeState {
            component: metadata.id.clone(),
            module: metadata.module_version.module().clone(),
            metadata: metadata.clone(),
            variant,
            status: NodeStatus::Live,
            outgoing: None,
            excludes: ExclusionSpec::Nothing,
        });
        self.registry.insert(key, index);
        (index, true)
    }

    pub fn add_edge(&mut self, edge: EdgeState) -> EdgeId {
        self.edges.push(edge);
        self.edges.len() - 1
    }

    /// A live edge takes part in version selection for its target module.
    pub fn is_live(&self, id: EdgeId) -> bool {
        let edge = &self.edges[id];
        self.graph[edge.from].is_live()
            && !edge.excluded
            && edge.target.is_some()
            && !edge.has_permanent_failure()
    }

    /// Live edges targeting `module`, in creation order.
    pub fn live_incoming(&self, module: &ModuleIdentifier) -> Vec<EdgeId> {
        self.modules
            .get(module)
            .map(|m| m.incoming.iter().copied().filter(|&e| self.is_live(e)).collect())
            .unwrap_or_default()
    }

    /// Live edges that pull their target into the graph.
    pub fn hard_incoming(&self, module: &ModuleIdentifier) -> Vec<EdgeId> {
        self.live_incoming(module)
            .into_iter()
            .filter(|&e| !self.edges[e].is_constraint())
            .collect()
    }

    pub fn linked_target(&self, id: EdgeId) -> Option<NodeIndex> {
        let link = self.edges[id].link?;
        self.graph.edge_endpoints(link).map(|(_, to)| to)
    }

    /// Point edge `id` at `to`, or detach it. Returns whether anything
    /// changed.
    pub fn relink(&mut self, id: EdgeId, to: Option<NodeIndex>) -> bool {
        if self.linked_target(id) == to {
            return false;
        }
        if let Some(link) = self.edges[id].link.take() {
            self.graph.remove_edge(link);
        }
        if let Some(to) = to {
            let from = self.edges[id].from;
            self.edges[id].link = Some(self.graph.add_edge(from, to, id));
        }
        true
    }

    /// Nodes reachable from the root through current links.
    pub fn reachable(&self) -> HashSet<NodeIndex> {
        let mut seen = HashSet::new();
        let mut bfs = Bfs::new(&self.graph, self.root);
        while let Some(node) = bfs.next(&self.graph) {
            seen.insert(node);
        }
        seen
    }

    /// Walk the linked graph breadth first, visiting children in
    /// declaration order.
    pub fn traverse(&self) -> Traversal {
        let mut traversal = Traversal::default();
        let mut seen = HashSet::from([self.root]);
        let mut queue = VecDeque::from([self.root]);
        while let Some(node) = queue.pop_front() {
            traversal.order.push(node);
            for &edge in self.graph[node].outgoing.iter().flatten() {
                let Some(child) = self.linked_target(edge) else {
                    continue;
                };
                if seen.insert(child) {
                    traversal.parents.insert(child, edge);
                    queue.push_back(child);
                }
            }
        }
        traversal
    }

    /// Selector chain from the root to `node`.
    pub fn path_to(&self, node: NodeIndex, traversal: &Traversal) -> SelectorPath {
        let mut segments = Vec::new();
        let mut current = node;
        let mut guard = 0;
        while let Some(&edge) = traversal.parents.get(&current) {
            segments.push(self.edges[edge].dependency.selector.to_string());
            current = self.edges[edge].from;
            guard += 1;
            if guard > traversal.order.len() {
                break;
            }
        }
        segments.push(self.graph[self.root].component.to_string());
        segments.reverse();
        SelectorPath(segments)
    }

    /// Each edge's selector with the path it was declared on, sorted.
    pub fn provenance(&self, edges: &[EdgeId], traversal: &Traversal) -> Vec<Provenance> {
        let mut requested: Vec<Provenance> = edges
            .iter()
            .map(|&id| Provenance {
                selector: self.edges[id].selector.to_string(),
                path: self.path_to(self.edges[id].from, traversal),
            })
            .collect();
        requested.sort();
        requested.dedup();
        requested
    }

    /// Selector chain through edge `id`.
    pub fn path_through(&self, id: EdgeId, traversal: &Traversal) -> SelectorPath {
        let edge = &self.edges[id];
        self.path_to(edge.from, traversal)
            .child(edge.dependency.selector.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use depsolve_core::identity::ModuleVersionIdentifier;
    use depsolve_core::metadata::VariantMetadata;

    fn meta(coords: &str) -> Arc<ComponentMetadata> {
        let id = ModuleVersionIdentifier::parse(coords).unwrap();
        Arc::new(ComponentMetadata::module(id).with_variant(VariantMetadata::new("default")))
    }

    fn edge(from: NodeIndex, target: &str) -> EdgeState {
        let selector = ComponentSelector::parse_module(target).unwrap();
        EdgeState {
            from,
            dependency: DependencyMetadata::new(selector.clone()),
            target: selector.module_id().cloned(),
            constraint: ParsedConstraint::parse(selector.constraint().unwrap()),
            selector,
            substitution: None,
            declared_excludes: ExclusionSpec::Nothing,
            project: None,
            excluded: false,
            link: None,
            failure: None,
            mandatory: false,
        }
    }

    #[test]
    fn one_node_per_component_and_variant() {
        let mut state = ResolutionState::new(meta("r:root:1"), ExclusionSpec::Nothing);
        let lib = meta("g:lib:1.0");
        let (a, created) = state.node_for(&lib, 0);
        assert!(created);
        let (b, created) = state.node_for(&lib, 0);
        assert!(!created);
        assert_eq!(a, b);
    }

    #[test]
    fn relinking_moves_the_graph_edge() {
        let mut state = ResolutionState::new(meta("r:root:1"), ExclusionSpec::Nothing);
        let root = state.root;
        let (v1, _) = state.node_for(&meta("g:lib:1.0"), 0);
        let (v2, _) = state.node_for(&meta("g:lib:2.0"), 0);
        let id = state.add_edge(edge(root, "g:lib:1.0"));

        assert!(state.relink(id, Some(v1)));
        assert!(!state.relink(id, Some(v1)));
        assert!(state.reachable().contains(&v1));

        assert!(state.relink(id, Some(v2)));
        let reachable = state.reachable();
        assert!(reachable.contains(&v2));
        assert!(!reachable.contains(&v1));
        assert_eq!(state.graph.edge_count(), 1);
    }

    #[test]
    fn traversal_follows_declaration_order_and_builds_paths() {
        let mut state = ResolutionState::new(meta("r:root:1"), ExclusionSpec::Nothing);
        let root = state.root;
        let (a, _) = state.node_for(&meta("g:a:1.0"), 0);
        let (b, _) = state.node_for(&meta("g:b:1.0"), 0);
        let to_b = state.add_edge(edge(root, "g:b:1.0"));
        let to_a = state.add_edge(edge(root, "g:a:1.0"));
        let a_to_b = state.add_edge(edge(a, "g:b:1.0"));
        state.node_mut(root).outgoing = Some(vec![to_b, to_a]);
        state.node_mut(a).outgoing = Some(vec![a_to_b]);
        state.relink(to_b, Some(b));
        state.relink(to_a, Some(a));
        state.relink(a_to_b, Some(b));

        let traversal = state.traverse();
        assert_eq!(traversal.order, vec![root, b, a]);
        assert_eq!(state.path_to(b, &traversal).to_string(), "r:root:1 -> g:b:1.0");
        assert_eq!(
            state.path_through(a_to_b, &traversal).to_string(),
            "r:root:1 -> g:a:1.0 -> g:b:1.0"
        );
    }
}
