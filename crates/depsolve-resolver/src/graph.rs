//! The resolved dependency graph handed to callers.

use std::collections::{HashMap, HashSet};
use std::fmt;

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use serde::Serialize;

use depsolve_core::attributes::{Attributes, Capability};
use depsolve_core::identity::{ComponentId, ModuleIdentifier};

use crate::conflict::{ConflictReport, SelectionReason};
use crate::failure::ResolutionFailure;

/// A resolved (component, variant) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedComponent {
    pub id: ComponentId,
    pub module: ModuleIdentifier,
    pub version: String,
    pub variant: String,
    #[serde(skip_serializing_if = "Attributes::is_empty")]
    pub attributes: Attributes,
    pub capabilities: Vec<Capability>,
    pub reason: SelectionReason,
}

impl ResolvedComponent {
    /// `group:name` identifier (without version).
    pub fn key(&self) -> String {
        self.module.to_string()
    }

    pub fn is_project(&self) -> bool {
        self.id.is_project()
    }
}

impl fmt::Display for ResolvedComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.id, f)
    }
}

/// Edge label: the declaration that led to the target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedDependency {
    /// The selector as declared.
    pub requested: String,
    /// The selector after substitution, when a rule applied.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub substituted: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// A resolved dependency graph backed by petgraph.
///
/// Components are stored in breadth-first order from the root and children
/// in declaration order, so two resolutions of the same inputs serialize
/// identically.
#[derive(Debug, Clone)]
pub struct ResolvedGraph {
    graph: DiGraph<ResolvedComponent, ResolvedDependency>,
    /// Lookup from `group:name` to the first node resolved for it.
    index: HashMap<String, NodeIndex>,
    root: NodeIndex,
    pub failures: Vec<ResolutionFailure>,
    pub conflicts: ConflictReport,
}

impl ResolvedGraph {
    pub fn new(root: ResolvedComponent) -> Self {
        let mut graph = DiGraph::new();
        let mut index = HashMap::new();
        index.insert(root.key(), NodeIndex::new(0));
        let root = graph.add_node(root);
        Self {
            graph,
            index,
            root,
            failures: Vec::new(),
            conflicts: ConflictReport::new(),
        }
    }

    pub fn add_component(&mut self, component: ResolvedComponent) -> NodeIndex {
        let key = component.key();
        let idx = self.graph.add_node(component);
        self.index.entry(key).or_insert(idx);
        idx
    }

    /// Add a dependency edge from `from` to `to`, once per pair.
    pub fn add_dependency(&mut self, from: NodeIndex, to: NodeIndex, edge: ResolvedDependency) {
        if !self.graph.edges(from).any(|e| e.target() == to) {
            self.graph.add_edge(from, to, edge);
        }
    }

    pub fn root(&self) -> NodeIndex {
        self.root
    }

    pub fn component(&self, idx: NodeIndex) -> &ResolvedComponent {
        &self.graph[idx]
    }

    /// Every component except the root, in breadth-first order.
    pub fn components(&self) -> Vec<&ResolvedComponent> {
        self.graph
            .node_indices()
            .filter(|&idx| idx != self.root)
            .map(|idx| &self.graph[idx])
            .collect()
    }

    /// Look up a node by `group:name`.
    pub fn find(&self, key: &str) -> Option<NodeIndex> {
        self.index.get(key).copied()
    }

    /// The resolved version of a module, if it is in the graph.
    pub fn version_of(&self, key: &str) -> Option<&str> {
        self.find(key).map(|idx| self.graph[idx].version.as_str())
    }

    /// Direct dependencies of a node, in declaration order.
    pub fn dependencies_of(&self, idx: NodeIndex) -> Vec<(NodeIndex, &ResolvedDependency)> {
        let mut edges: Vec<_> = self.graph.edges_directed(idx, Direction::Outgoing).collect();
        edges.sort_by_key(|e| e.id());
        edges.into_iter().map(|e| (e.target(), e.weight())).collect()
    }

    /// Reverse dependencies (who depends on this node).
    pub fn dependents_of(&self, idx: NodeIndex) -> Vec<(NodeIndex, &ResolvedDependency)> {
        let mut edges: Vec<_> = self.graph.edges_directed(idx, Direction::Incoming).collect();
        edges.sort_by_key(|e| e.id());
        edges.into_iter().map(|e| (e.source(), e.weight())).collect()
    }

    /// Local projects that must be built before the root.
    pub fn build_dependencies(&self) -> Vec<&ResolvedComponent> {
        self.components().into_iter().filter(|c| c.is_project()).collect()
    }

    /// Whether any failure makes the resolution unusable.
    pub fn has_fatal_failures(&self) -> bool {
        self.failures.iter().any(ResolutionFailure::is_fatal)
    }

    /// Print the dependency tree to a string.
    ///
    /// Edges whose request differs from the resolved component are shown as
    /// `requested -> resolved`; a component already on the current path is
    /// marked with `(*)` and not expanded again.
    pub fn print_tree(&self, max_depth: Option<usize>) -> String {
        let mut output = String::new();
        output.push_str(&format!("{}\n", self.graph[self.root]));

        let mut visited = HashSet::new();
        visited.insert(self.root);
        let deps = self.dependencies_of(self.root);
        let count = deps.len();
        for (i, (idx, edge)) in deps.iter().enumerate() {
            let is_last = i == count - 1;
            self.print_subtree(&mut output, *idx, edge, "", is_last, 1, max_depth, &mut visited);
        }
        output
    }

    #[allow(clippy::too_many_arguments)]
    fn print_subtree(
        &self,
        output: &mut String,
        idx: NodeIndex,
        edge: &ResolvedDependency,
        prefix: &str,
        is_last: bool,
        depth: usize,
        max_depth: Option<usize>,
        visited: &mut HashSet<NodeIndex>,
    ) {
        let connector = if is_last { "└── " } else { "├── " };
        let label = edge_label(edge, &self.graph[idx]);
        if visited.contains(&idx) {
            output.push_str(&format!("{prefix}{connector}{label} (*)\n"));
            return;
        }
        output.push_str(&format!("{prefix}{connector}{label}\n"));

        if let Some(max) = max_depth {
            if depth >= max {
                return;
            }
        }

        visited.insert(idx);
        let child_prefix = format!("{prefix}{}", if is_last { "    " } else { "│   " });
        let deps = self.dependencies_of(idx);
        let count = deps.len();
        for (i, (child, child_edge)) in deps.iter().enumerate() {
            let is_last = i == count - 1;
            self.print_subtree(
                output,
                *child,
                child_edge,
                &child_prefix,
                is_last,
                depth + 1,
                max_depth,
                visited,
            );
        }
        visited.remove(&idx);
    }

    /// Find the path from root to a specific module.
    ///
    /// Accepts either `group:name` or just `name` (partial match).
    pub fn find_path(&self, target_key: &str) -> Option<Vec<&ResolvedComponent>> {
        let target = self.resolve_key(target_key)?;
        let mut path = Vec::new();
        let mut visited = HashSet::new();
        if self.dfs_path(self.root, target, &mut path, &mut visited) {
            Some(path.iter().map(|&idx| &self.graph[idx]).collect())
        } else {
            None
        }
    }

    /// Resolve a user-provided key to a node index.
    ///
    /// Tries exact `group:name` first, then the first component in
    /// breadth-first order whose name matches.
    pub fn resolve_key(&self, key: &str) -> Option<NodeIndex> {
        if let Some(idx) = self.find(key) {
            return Some(idx);
        }
        self.graph
            .node_indices()
            .find(|&idx| self.graph[idx].module.name() == key)
    }

    fn dfs_path(
        &self,
        current: NodeIndex,
        target: NodeIndex,
        path: &mut Vec<NodeIndex>,
        visited: &mut HashSet<NodeIndex>,
    ) -> bool {
        path.push(current);
        if current == target {
            return true;
        }
        if !visited.insert(current) {
            path.pop();
            return false;
        }
        for (child, _) in self.dependencies_of(current) {
            if self.dfs_path(child, target, path, visited) {
                return true;
            }
        }
        path.pop();
        false
    }

    /// Build an inverted dependency tree (reverse edges) for one module:
    /// why it is in the graph.
    ///
    /// Accepts either `group:name` or just `name` (partial match).
    pub fn print_inverted_tree(&self, target_key: &str) -> String {
        let mut output = String::new();
        let Some(idx) = self.resolve_key(target_key) else {
            return output;
        };
        let node = &self.graph[idx];
        output.push_str(&format!("{node} ({})\n", node.reason));

        let mut visited = HashSet::new();
        visited.insert(idx);
        let dependents = self.dependents_of(idx);
        let count = dependents.len();
        for (i, (dep_idx, edge)) in dependents.iter().enumerate() {
            let is_last = i == count - 1;
            self.print_inverted_subtree(&mut output, *dep_idx, edge, "", is_last, &mut visited);
        }
        output
    }

    fn print_inverted_subtree(
        &self,
        output: &mut String,
        idx: NodeIndex,
        edge: &ResolvedDependency,
        prefix: &str,
        is_last: bool,
        visited: &mut HashSet<NodeIndex>,
    ) {
        let connector = if is_last { "└── " } else { "├── " };
        let node = &self.graph[idx];
        output.push_str(&format!("{prefix}{connector}{node} (requested {})\n", edge.requested));

        if !visited.insert(idx) {
            return;
        }
        let child_prefix = format!("{prefix}{}", if is_last { "    " } else { "│   " });
        let dependents = self.dependents_of(idx);
        let count = dependents.len();
        for (i, (dep_idx, dep_edge)) in dependents.iter().enumerate() {
            let is_last = i == count - 1;
            self.print_inverted_subtree(output, *dep_idx, dep_edge, &child_prefix, is_last, visited);
        }
        visited.remove(&idx);
    }

    /// Serialize the graph: components in breadth-first order, then edges in
    /// declaration order.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Number of components (excluding root).
    pub fn len(&self) -> usize {
        self.graph.node_count().saturating_sub(1)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn edge_label(edge: &ResolvedDependency, node: &ResolvedComponent) -> String {
    let resolved = node.to_string();
    if edge.requested == resolved {
        return resolved;
    }
    let same_module = edge
        .requested
        .strip_prefix(&node.key())
        .is_some_and(|rest| rest.is_empty() || rest.starts_with(':'));
    if same_module && !node.is_project() {
        format!("{} -> {}", edge.requested, node.version)
    } else {
        format!("{} -> {resolved}", edge.requested)
    }
}

#[derive(Serialize)]
struct GraphDocument<'a> {
    root: &'a ResolvedComponent,
    components: Vec<&'a ResolvedComponent>,
    dependencies: Vec<EdgeDocument<'a>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    failures: Vec<&'a ResolutionFailure>,
    #[serde(skip_serializing_if = "ConflictReport::is_empty")]
    conflicts: &'a ConflictReport,
}

#[derive(Serialize)]
struct EdgeDocument<'a> {
    from: &'a ComponentId,
    to: &'a ComponentId,
    #[serde(flatten)]
    edge: &'a ResolvedDependency,
}

impl Serialize for ResolvedGraph {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut dependencies = Vec::new();
        for idx in self.graph.node_indices() {
            for (child, edge) in self.dependencies_of(idx) {
                dependencies.push(EdgeDocument {
                    from: &self.graph[idx].id,
                    to: &self.graph[child].id,
                    edge,
                });
            }
        }
        GraphDocument {
            root: &self.graph[self.root],
            components: self.components(),
            dependencies,
            failures: self.failures.iter().collect(),
            conflicts: &self.conflicts,
        }
        .serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use depsolve_core::identity::ModuleVersionIdentifier;

    fn component(coords: &str) -> ResolvedComponent {
        let id = ModuleVersionIdentifier::parse(coords).unwrap();
        ResolvedComponent {
            module: id.module().clone(),
            version: id.version().to_string(),
            id: ComponentId::Module(id),
            variant: "default".into(),
            attributes: Attributes::new(),
            capabilities: Vec::new(),
            reason: SelectionReason::Requested,
        }
    }

    fn requested(s: &str) -> ResolvedDependency {
        ResolvedDependency {
            requested: s.into(),
            substituted: None,
            reason: None,
        }
    }

    /// root -> a -> c, root -> b
    fn sample() -> (ResolvedGraph, NodeIndex, NodeIndex, NodeIndex) {
        let mut g = ResolvedGraph::new(component("com.example:app:1.0"));
        let root = g.root();
        let a = g.add_component(component("org.a:a:1.0"));
        let b = g.add_component(component("org.b:b:2.0"));
        let c = g.add_component(component("org.c:c:3.0"));
        g.add_dependency(root, a, requested("org.a:a:1.0"));
        g.add_dependency(root, b, requested("org.b:b:[1.0,3.0)"));
        g.add_dependency(a, c, requested("org.c:c:3.0"));
        (g, a, b, c)
    }

    #[test]
    fn add_and_find() {
        let (g, a, _, _) = sample();
        assert_eq!(g.find("org.a:a"), Some(a));
        assert_eq!(g.version_of("org.b:b"), Some("2.0"));
        assert_eq!(g.len(), 3);
    }

    #[test]
    fn duplicate_edges_are_ignored() {
        let (mut g, a, _, c) = sample();
        g.add_dependency(a, c, requested("org.c:c:3.0"));
        assert_eq!(g.dependencies_of(a).len(), 1);
    }

    #[test]
    fn children_keep_declaration_order() {
        let (g, a, b, _) = sample();
        let children: Vec<NodeIndex> = g.dependencies_of(g.root()).into_iter().map(|(i, _)| i).collect();
        assert_eq!(children, vec![a, b]);
    }

    #[test]
    fn tree_printing() {
        let (g, _, _, _) = sample();
        let tree = g.print_tree(None);
        assert_eq!(
            tree,
            "com.example:app:1.0\n\
             ├── org.a:a:1.0\n\
             │   └── org.c:c:3.0\n\
             └── org.b:b:[1.0,3.0) -> 2.0\n"
        );
        let shallow = g.print_tree(Some(1));
        assert!(!shallow.contains("org.c:c"));
    }

    #[test]
    fn cycles_are_marked_not_expanded() {
        let (mut g, a, _, c) = sample();
        g.add_dependency(c, a, requested("org.a:a:1.0"));
        let tree = g.print_tree(None);
        assert!(tree.contains("org.a:a:1.0 (*)"));
    }

    #[test]
    fn find_path_exists() {
        let (g, _, _, _) = sample();
        let path = g.find_path("org.c:c").unwrap();
        let names: Vec<String> = path.iter().map(|c| c.module.name().to_string()).collect();
        assert_eq!(names, vec!["app", "a", "c"]);
        assert!(g.find_path("org.missing:lib").is_none());
    }

    #[test]
    fn find_path_partial_key() {
        let (g, _, _, _) = sample();
        let path = g.find_path("b").unwrap();
        assert_eq!(path.len(), 2);
        assert_eq!(path[1].version, "2.0");
    }

    #[test]
    fn inverted_tree() {
        let (g, _, _, _) = sample();
        let inv = g.print_inverted_tree("org.c:c");
        assert!(inv.starts_with("org.c:c:3.0 (requested)\n"));
        assert!(inv.contains("└── org.a:a:1.0 (requested org.c:c:3.0)"));
        assert!(inv.contains("com.example:app:1.0 (requested org.a:a:1.0)"));
    }

    #[test]
    fn json_is_stable() {
        let (g, _, _, _) = sample();
        let first = g.to_json().unwrap();
        assert_eq!(first, g.clone().to_json().unwrap());
        let value: serde_json::Value = serde_json::from_str(&first).unwrap();
        assert_eq!(value["components"].as_array().unwrap().len(), 3);
        assert_eq!(value["dependencies"][0]["from"], "com.example:app:1.0");
        assert_eq!(value["dependencies"][0]["to"], "org.a:a:1.0");
        assert!(value.get("failures").is_none());
    }

    #[test]
    fn build_dependencies_are_projects() {
        let (mut g, a, _, _) = sample();
        let mut project = component("com.example:core:1.0");
        project.id = ComponentId::project(":core");
        let p = g.add_component(project);
        g.add_dependency(a, p, requested("project :core"));
        let builds: Vec<String> = g.build_dependencies().iter().map(|c| c.to_string()).collect();
        assert_eq!(builds, vec!["project :core"]);
    }
}
