//! The graph builder: expands the dependency graph until nothing changes.
//!
//! Each pass visits new nodes, gathers the metadata it is missing in
//! concurrent waves, re-selects every module whose requests changed, points
//! edges at the winners and sweeps away whatever is no longer reachable from
//! the root. Exclusions are propagated after every sweep and capability
//! conflicts are checked once the rest of the graph is stable.
//!
//! All graph mutation happens on the coordinating task. Only the provider
//! calls run concurrently, bounded by a semaphore.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use petgraph::stable_graph::NodeIndex;
use petgraph::Direction;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use depsolve_core::attributes::{Attributes, Capability};
use depsolve_core::config::ResolverConfig;
use depsolve_core::identity::{ComponentId, ModuleIdentifier};
use depsolve_core::metadata::{ComponentMetadata, DependencyMetadata};
use depsolve_core::selector::ComponentSelector;

use crate::cache::MetadataCache;
use crate::conflict::{
    CapabilityCandidate, ConflictResolver, Decision, ForcedVersion, ProjectCandidate, Selected, SelectionReason,
    VersionRequest,
};
use crate::constraint::ParsedConstraint;
use crate::exclude::ExclusionSpec;
use crate::provider::{FetchFailure, LockConstraintProvider};
use crate::rules::ResolutionRules;
use crate::state::{
    EdgeFailure, EdgeId, EdgeState, MetadataState, ModuleFailure, ModuleState, NodeStatus, ResolutionState,
    Traversal,
};
use crate::variant::{select_variant, AttributeSchema, VariantFailure};
use crate::version::Version;

/// How much of the graph to expand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BuildMode {
    Full,
    /// Only expand the root and local projects.
    BuildDependencies,
}

/// The resolution was cancelled while the graph was being built.
#[derive(Debug)]
pub(crate) struct Cancelled;

type VariantKey = (ComponentId, Attributes, Vec<Capability>);
type FetchResults<K, T> = Vec<(K, Result<T, FetchFailure>)>;

pub(crate) struct GraphBuilder<'a> {
    cache: Arc<MetadataCache>,
    rules: &'a ResolutionRules,
    schema: &'a AttributeSchema,
    config: &'a ResolverConfig,
    lock: Option<Arc<dyn LockConstraintProvider>>,
    cancel: CancellationToken,
    permits: Arc<Semaphore>,
    mode: BuildMode,
    root_attributes: Attributes,
    pub state: ResolutionState,
    pub conflicts: ConflictResolver,
    visit_queue: VecDeque<NodeIndex>,
    dirty: BTreeSet<ModuleIdentifier>,
    pending_projects: Vec<EdgeId>,
    pins: HashMap<(ModuleIdentifier, ParsedConstraint), Option<Version>>,
    variants: HashMap<VariantKey, Result<usize, VariantFailure>>,
    /// Capability conflicts no rule could settle, from the last check.
    pub capability_failures: Vec<(ModuleIdentifier, Vec<CapabilityCandidate>)>,
}

impl<'a> GraphBuilder<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        cache: Arc<MetadataCache>,
        rules: &'a ResolutionRules,
        schema: &'a AttributeSchema,
        config: &'a ResolverConfig,
        root: Arc<ComponentMetadata>,
        lock: Option<Arc<dyn LockConstraintProvider>>,
        cancel: CancellationToken,
        mode: BuildMode,
    ) -> Self {
        let root_attributes = root
            .variants
            .first()
            .map(|v| v.attributes.clone())
            .unwrap_or_default();
        let state = ResolutionState::new(root, ExclusionSpec::of(&rules.excludes));
        Self {
            cache,
            rules,
            schema,
            config,
            lock,
            cancel,
            permits: Arc::new(Semaphore::new(config.max_concurrent_fetches.max(1))),
            mode,
            root_attributes,
            state,
            conflicts: ConflictResolver::new(config.fail_on_version_conflict),
            visit_queue: VecDeque::new(),
            dirty: BTreeSet::new(),
            pending_projects: Vec::new(),
            pins: HashMap::new(),
            variants: HashMap::new(),
            capability_failures: Vec::new(),
        }
    }

    /// Run passes until the graph reaches a fixed point.
    pub async fn run(&mut self) -> Result<(), Cancelled> {
        self.visit_queue.push_back(self.state.root);
        let mut passes = 0usize;
        loop {
            if self.cancel.is_cancelled() {
                return Err(Cancelled);
            }
            passes += 1;

            while let Some(node) = self.visit_queue.pop_front() {
                self.visit(node);
            }
            self.identify_projects().await?;
            self.list_versions().await?;
            self.pin_dynamic_versions().await?;

            let dirty = std::mem::take(&mut self.dirty);
            self.select_versions(&dirty);
            self.fetch_selected(&dirty).await?;
            self.attach(&dirty);
            self.sweep();
            self.propagate_excludes();

            if self.dirty.is_empty() && self.visit_queue.is_empty() && !self.check_capabilities() {
                break;
            }
        }
        tracing::debug!(
            passes,
            nodes = self.state.graph.node_count(),
            edges = self.state.edges.len(),
            "graph reached a fixed point"
        );
        Ok(())
    }

    fn visit(&mut self, index: NodeIndex) {
        let root = self.state.root;
        let node = self.state.node(index);
        if node.outgoing.is_some() || !node.is_live() {
            return;
        }
        let expand = match self.mode {
            BuildMode::Full => true,
            BuildMode::BuildDependencies => {
                index == root || node.component.is_project() || self.rules.substitutions.targets_projects()
            }
        };
        let dependencies: Vec<DependencyMetadata> = if expand {
            node.dependencies().to_vec()
        } else {
            Vec::new()
        };
        tracing::debug!(
            component = %node.component,
            variant = node.variant_name(),
            dependencies = dependencies.len(),
            "visiting node"
        );

        let outgoing: Vec<EdgeId> = dependencies
            .into_iter()
            .map(|dependency| self.create_edge(index, dependency, index == root))
            .collect();
        self.state.node_mut(index).outgoing = Some(outgoing.clone());
        for id in outgoing {
            self.refresh_edge(id);
        }
    }

    /// Declare one edge, applying substitution exactly once.
    fn create_edge(&mut self, from: NodeIndex, dependency: DependencyMetadata, from_root: bool) -> EdgeId {
        let mut failure = None;
        let (selector, substitution) = match self.rules.substitutions.substitute(&dependency.selector) {
            Ok(Some(substituted)) => (substituted.selector, Some(substituted.reason)),
            Ok(None) => (dependency.selector.clone(), None),
            Err(message) => {
                tracing::debug!(selector = %dependency.selector, %message, "substitution failed");
                failure = Some(EdgeFailure::Substitution(message));
                (dependency.selector.clone(), None)
            }
        };
        let constraint = selector
            .constraint()
            .map(ParsedConstraint::parse)
            .unwrap_or_else(|| ParsedConstraint::parse(&Default::default()));
        let target = selector.module_id().cloned();
        let is_project = matches!(selector, ComponentSelector::Project(_));
        let mandatory = !dependency.constraint
            && (from_root || (self.mode == BuildMode::BuildDependencies && is_project));
        let declared_excludes = ExclusionSpec::of(&dependency.excludes);

        let id = self.state.add_edge(EdgeState {
            from,
            dependency,
            selector,
            constraint,
            substitution,
            declared_excludes,
            target: target.clone(),
            project: None,
            excluded: false,
            link: None,
            failure,
            mandatory,
        });
        match target {
            Some(module) => self.state.module_mut(&module).incoming.push(id),
            None if self.state.edges[id].failure.is_none() => self.pending_projects.push(id),
            None => {}
        }
        id
    }

    /// Re-check an edge against the exclusions of the node it leaves from,
    /// for both the requested and the substituted module.
    fn refresh_edge(&mut self, id: EdgeId) {
        let edge = &self.state.edges[id];
        let excludes = &self.state.node(edge.from).excludes;
        let excluded = [edge.dependency.selector.module_id(), edge.target.as_ref()]
            .into_iter()
            .flatten()
            .any(|module| excludes.excludes(module));
        let target = edge.target.clone();
        if excluded != edge.excluded {
            tracing::trace!(selector = %edge.dependency.selector, excluded, "exclusion changed");
        }
        self.state.edges[id].excluded = excluded;
        if let Some(target) = target {
            self.dirty.insert(target);
        }
    }

    /// Read the metadata of projects targeted by new edges to learn which
    /// module each one publishes.
    async fn identify_projects(&mut self) -> Result<(), Cancelled> {
        let pending = std::mem::take(&mut self.pending_projects);
        if pending.is_empty() {
            return Ok(());
        }
        let ids: BTreeSet<ComponentId> = pending.iter().filter_map(|&id| project_id(&self.state.edges[id])).collect();
        let fetched: HashMap<ComponentId, Result<Arc<ComponentMetadata>, FetchFailure>> =
            self.fetch_components(ids.into_iter().collect()).await?.into_iter().collect();

        for id in pending {
            let Some(component) = project_id(&self.state.edges[id]) else {
                continue;
            };
            let Some(result) = fetched.get(&component) else {
                continue;
            };
            match result {
                Ok(metadata) => {
                    self.state
                        .components
                        .insert(component.clone(), MetadataState::Resolved(metadata.clone()));
                    let module = metadata.module_version.module().clone();
                    let edge = &mut self.state.edges[id];
                    edge.target = Some(module.clone());
                    edge.project = match &component {
                        ComponentId::Project(path) => Some(ProjectCandidate {
                            path: path.clone(),
                            version: Version::parse(metadata.module_version.version()),
                        }),
                        ComponentId::Module(_) => None,
                    };
                    self.state.module_mut(&module).incoming.push(id);
                    self.refresh_edge(id);
                }
                Err(failure) => {
                    self.state
                        .components
                        .insert(component.clone(), MetadataState::Failed(failure.clone()));
                    let edge = &mut self.state.edges[id];
                    edge.failure = Some(if edge.is_substituted() {
                        EdgeFailure::Substitution(format!("{component} does not exist"))
                    } else {
                        EdgeFailure::Project(failure.clone())
                    });
                }
            }
        }
        Ok(())
    }

    /// List available versions for dirty modules with dynamic requests.
    async fn list_versions(&mut self) -> Result<(), Cancelled> {
        let wanted: Vec<ModuleIdentifier> = self
            .dirty
            .iter()
            .filter(|module| {
                self.state.modules.get(*module).is_some_and(|m| m.versions.is_none())
                    && self
                        .state
                        .live_incoming(module)
                        .iter()
                        .any(|&id| self.state.edges[id].constraint.is_dynamic())
            })
            .cloned()
            .collect();
        if wanted.is_empty() {
            return Ok(());
        }
        let cache = self.cache.clone();
        let listed = self
            .wave(wanted, move |module: ModuleIdentifier| {
                let cache = cache.clone();
                async move { cache.versions(&module).await }
            })
            .await?;
        for (module, result) in listed {
            if let Err(failure) = &result {
                tracing::debug!(%module, %failure, "version listing failed");
            }
            self.state.module_mut(&module).versions = Some(result);
        }
        Ok(())
    }

    /// Find a concrete version for selectors that can only be evaluated with
    /// each candidate's metadata: the highest listed version whose metadata
    /// satisfies the status or branch requirement.
    async fn pin_dynamic_versions(&mut self) -> Result<(), Cancelled> {
        let mut wanted: BTreeMap<(ModuleIdentifier, String), ParsedConstraint> = BTreeMap::new();
        for module in &self.dirty {
            for id in self.state.live_incoming(module) {
                let constraint = &self.state.edges[id].constraint;
                if constraint.requires_metadata() && !self.pins.contains_key(&(module.clone(), constraint.clone())) {
                    let key = (module.clone(), self.state.edges[id].selector.to_string());
                    wanted.entry(key).or_insert_with(|| constraint.clone());
                }
            }
        }

        for ((module, _), constraint) in wanted {
            let listing = match self.state.modules.get(&module).and_then(|m| m.versions.clone()) {
                Some(Ok(listing)) => listing,
                _ => {
                    self.pins.insert((module, constraint), None);
                    continue;
                }
            };
            let mut pinned = None;
            for version in listing.iter().rev().filter(|v| constraint.accepts(v)) {
                let id = ComponentId::Module(module.with_version(&version.original));
                let fetched = self.fetch_components(vec![id]).await?;
                if let Some((_, Ok(metadata))) = fetched.first() {
                    if constraint.accepts_metadata(metadata) {
                        pinned = Some(version.clone());
                        break;
                    }
                }
            }
            tracing::debug!(
                %module,
                pinned = pinned.as_ref().map(|v| v.original.as_str()),
                "pinned metadata-dependent selector"
            );
            self.pins.insert((module, constraint), pinned);
        }
        Ok(())
    }

    fn forced_version(&self, module: &ModuleIdentifier) -> Option<ForcedVersion> {
        if let Some(version) = self.rules.forced.get(module) {
            return Some(ForcedVersion {
                version: version.clone(),
                reason: SelectionReason::Forced,
            });
        }
        let version = self.lock.as_ref()?.locked_version(module)?;
        Some(ForcedVersion {
            version,
            reason: SelectionReason::Locked,
        })
    }

    fn select_versions(&mut self, dirty: &BTreeSet<ModuleIdentifier>) {
        let root_module = self.state.root_module().clone();
        let max_changes = self.config.max_selection_changes;
        let mut traversal: Option<Traversal> = None;
        for module in dirty {
            if *module == root_module {
                continue;
            }
            let live = self.state.live_incoming(module);
            let requested = live.iter().any(|&id| !self.state.edges[id].is_constraint());
            if !requested {
                let state = self.state.module_mut(module);
                if state.selected.take().is_some() {
                    tracing::debug!(%module, "module is no longer requested");
                }
                state.failure = None;
                continue;
            }
            let requests: Vec<VersionRequest> = live
                .iter()
                .map(|&id| {
                    let edge = &self.state.edges[id];
                    let pinned = if edge.constraint.requires_metadata() {
                        self.pins
                            .get(&(module.clone(), edge.constraint.clone()))
                            .cloned()
                            .flatten()
                    } else {
                        None
                    };
                    VersionRequest {
                        constraint: edge.constraint.clone(),
                        project: edge.project.clone(),
                        pinned,
                    }
                })
                .collect();
            let needs_listing = requests
                .iter()
                .any(|r| r.project.is_none() && r.constraint.is_dynamic() && !r.constraint.requires_metadata());
            let listing = match self.state.modules.get(module).and_then(|m| m.versions.clone()) {
                Some(Err(failure)) if needs_listing => {
                    let state = self.state.module_mut(module);
                    state.failure = Some(ModuleFailure::Listing(failure));
                    state.selected = None;
                    continue;
                }
                Some(Ok(listing)) => Some(listing),
                _ => None,
            };

            let forced = self.forced_version(module);
            let outcome = self.conflicts.select_version(
                module,
                &requests,
                listing.as_ref().map(|l| l.as_slice()),
                forced.as_ref(),
            );
            let substituted = live.iter().any(|&id| self.state.edges[id].is_substituted());
            let requested = if outcome.is_err() {
                let traversal = traversal.get_or_insert_with(|| self.state.traverse());
                self.state.provenance(&live, traversal)
            } else {
                Vec::new()
            };
            let state = self.state.module_mut(module);
            let exhausted = state.changes > max_changes;
            match outcome {
                Ok(mut decision) => {
                    if substituted && decision.reason == SelectionReason::Requested {
                        decision.reason = SelectionReason::Substituted;
                    }
                    if state.selected.as_ref() == Some(&decision) {
                        state.failure = None;
                        continue;
                    }
                    if exhausted && keeps_current(state, &decision) {
                        tracing::debug!(
                            %module,
                            version = %decision.selected.version(),
                            "selection change skipped"
                        );
                        continue;
                    }
                    state.failure = None;
                    if let Some(previous) = &state.selected {
                        tracing::debug!(
                            %module,
                            from = %previous.selected.version(),
                            to = %decision.selected.version(),
                            "selection changed"
                        );
                        count_change(module, state, max_changes);
                    } else {
                        tracing::debug!(
                            %module,
                            version = %decision.selected.version(),
                            reason = %decision.reason,
                            "selected version"
                        );
                    }
                    state.selected = Some(decision);
                }
                Err(message) => {
                    tracing::debug!(%module, %message, "version conflict");
                    if state.selected.take().is_some() {
                        count_change(module, state, max_changes);
                    }
                    state.failure = Some(ModuleFailure::Conflict { message, requested });
                }
            }
        }
    }

    /// Fetch metadata of newly selected components.
    async fn fetch_selected(&mut self, dirty: &BTreeSet<ModuleIdentifier>) -> Result<(), Cancelled> {
        let wanted: BTreeSet<ComponentId> = dirty
            .iter()
            .filter_map(|module| {
                let decision = self.state.modules.get(module)?.selected.as_ref()?;
                let component = decision.selected.component(module);
                (!self.state.components.contains_key(&component)).then_some(component)
            })
            .collect();
        if wanted.is_empty() {
            return Ok(());
        }
        for (component, result) in self.fetch_components(wanted.into_iter().collect()).await? {
            let state = match result {
                Ok(metadata) => MetadataState::Resolved(metadata),
                Err(failure) => {
                    tracing::debug!(%component, %failure, "metadata unavailable");
                    MetadataState::Failed(failure)
                }
            };
            self.state.components.insert(component, state);
        }
        Ok(())
    }

    /// Point every edge of the dirty modules at its current target.
    fn attach(&mut self, dirty: &BTreeSet<ModuleIdentifier>) {
        for module in dirty {
            let Some(incoming) = self.state.modules.get(module).map(|m| m.incoming.clone()) else {
                continue;
            };
            for id in incoming {
                let target = if self.state.is_live(id) && !self.state.edges[id].is_constraint() {
                    self.resolve_target(id)
                } else {
                    None
                };
                if self.state.relink(id, target) {
                    tracing::trace!(selector = %self.state.edges[id].selector, linked = target.is_some(), "relinked edge");
                }
            }
        }
    }

    fn resolve_target(&mut self, id: EdgeId) -> Option<NodeIndex> {
        self.state.edges[id].failure = None;
        let requested = self.state.edges[id].target.clone()?;
        let root_module = self.state.root_module().clone();
        if requested == root_module {
            return Some(self.state.root);
        }
        let winner = self
            .state
            .modules
            .get(&requested)
            .and_then(|m| m.evicted_by.as_ref())
            .map(|d| d.winner.clone());
        let rerouted = winner.is_some();
        let module = winner.unwrap_or(requested);
        if module == root_module {
            return Some(self.state.root);
        }

        let state = self.state.modules.get(&module)?;
        if matches!(state.failure, Some(ModuleFailure::Conflict { .. } | ModuleFailure::Listing(_))) {
            return None;
        }
        let component = state.selected.as_ref()?.selected.component(&module);
        let MetadataState::Resolved(metadata) = self.state.components.get(&component)? else {
            return None;
        };
        let metadata = metadata.clone();

        let edge = &self.state.edges[id];
        let requested_attributes = self.root_attributes.merged_with(edge.selector.attributes());
        let capabilities = if rerouted {
            Vec::new()
        } else {
            edge.selector.capabilities().to_vec()
        };
        match self.variant_of(&metadata, &requested_attributes, &capabilities) {
            Ok(variant) => {
                let (node, created) = self.state.node_for(&metadata, variant);
                if created {
                    tracing::debug!(component = %component, variant = self.state.node(node).variant_name(), "new node");
                    self.visit_queue.push_back(node);
                } else if !self.state.node(node).is_live() {
                    self.revive(node);
                }
                Some(node)
            }
            Err(failure) => {
                self.state.edges[id].failure = Some(EdgeFailure::Variant {
                    failure,
                    component,
                    requested: requested_attributes,
                });
                None
            }
        }
    }

    fn variant_of(
        &mut self,
        metadata: &ComponentMetadata,
        requested: &Attributes,
        capabilities: &[Capability],
    ) -> Result<usize, VariantFailure> {
        let key = (metadata.id.clone(), requested.clone(), capabilities.to_vec());
        let schema = self.schema;
        self.variants
            .entry(key)
            .or_insert_with(|| select_variant(schema, metadata, requested, capabilities))
            .clone()
    }

    fn revive(&mut self, node: NodeIndex) {
        let state = self.state.node_mut(node);
        tracing::debug!(component = %state.component, "reviving node");
        state.status = NodeStatus::Live;
        match state.outgoing.clone() {
            Some(outgoing) => {
                for id in outgoing {
                    self.refresh_edge(id);
                }
            }
            None => self.visit_queue.push_back(node),
        }
    }

    /// Retract every live node the root can no longer reach.
    fn sweep(&mut self) {
        let reachable = self.state.reachable();
        let stale: Vec<NodeIndex> = self
            .state
            .graph
            .node_indices()
            .filter(|n| self.state.node(*n).is_live() && !reachable.contains(n))
            .collect();
        for node in stale {
            let state = self.state.node_mut(node);
            tracing::debug!(component = %state.component, variant = state.variant_name(), "retracting node");
            state.status = NodeStatus::Retracted;
            for id in state.outgoing.clone().unwrap_or_default() {
                self.state.relink(id, None);
                if let Some(target) = self.state.edges[id].target.clone() {
                    self.dirty.insert(target);
                }
            }
        }
    }

    /// Recompute inherited exclusions: the intersection, over every live
    /// incoming link, of the parent's exclusions plus the link's own rules.
    fn propagate_excludes(&mut self) {
        let root = self.state.root;
        let mut queue: VecDeque<NodeIndex> = self.state.traverse().order.into_iter().filter(|n| *n != root).collect();
        let mut queued: HashSet<NodeIndex> = queue.iter().copied().collect();
        let mut budget = (queue.len() + 1) * 16;

        while let Some(node) = queue.pop_front() {
            queued.remove(&node);
            if budget == 0 {
                tracing::warn!("exclusions did not settle");
                break;
            }
            budget -= 1;

            let mut combined: Option<ExclusionSpec> = None;
            for link in self.state.graph.edges_directed(node, Direction::Incoming) {
                let edge = &self.state.edges[*link.weight()];
                let parent = self.state.node(edge.from);
                if !parent.is_live() {
                    continue;
                }
                let spec = parent.excludes.union(&edge.declared_excludes);
                combined = Some(match combined {
                    Some(acc) => acc.intersect(&spec),
                    None => spec,
                });
            }
            let combined = combined.unwrap_or_default();
            if combined == self.state.node(node).excludes {
                continue;
            }
            tracing::trace!(component = %self.state.node(node).component, excludes = %combined, "exclusions changed");
            self.state.node_mut(node).excludes = combined;
            for id in self.state.node(node).outgoing.clone().unwrap_or_default() {
                self.refresh_edge(id);
                if let Some(child) = self.state.linked_target(id) {
                    if child != root && queued.insert(child) {
                        queue.push_back(child);
                    }
                }
            }
        }
    }

    /// Check that no two modules in the graph provide the same capability.
    /// Returns whether any module was evicted or reinstated.
    fn check_capabilities(&mut self) -> bool {
        let root_module = self.state.root_module().clone();
        let mut in_play = Vec::new();
        for (module, state) in &self.state.modules {
            if *module == root_module {
                continue;
            }
            let Some(decision) = &state.selected else {
                continue;
            };
            let component = decision.selected.component(module);
            let Some(MetadataState::Resolved(metadata)) = self.state.components.get(&component) else {
                continue;
            };
            let edges = self.state.hard_incoming(module);
            if edges.is_empty() {
                continue;
            }
            in_play.push((module.clone(), decision.selected.version().clone(), metadata.clone(), edges));
        }

        let mut providers: BTreeMap<ModuleIdentifier, BTreeMap<ModuleIdentifier, CapabilityCandidate>> =
            BTreeMap::new();
        for (module, version, metadata, edges) in in_play {
            let mut capabilities: BTreeSet<Capability> = BTreeSet::new();
            for id in edges {
                let edge = &self.state.edges[id];
                let requested = self.root_attributes.merged_with(edge.selector.attributes());
                let wanted = edge.selector.capabilities().to_vec();
                if let Ok(variant) = self.variant_of(&metadata, &requested, &wanted) {
                    capabilities.extend(metadata.effective_capabilities(&metadata.variants[variant]));
                }
            }
            for replacement in self.rules.replaced_by(&module) {
                capabilities.insert(Capability::implicit(&replacement.module, &version.original));
            }
            for capability in capabilities {
                providers.entry(capability.id()).or_default().insert(
                    module.clone(),
                    CapabilityCandidate {
                        module: module.clone(),
                        version: version.original.clone(),
                        capability_version: capability.version.clone(),
                    },
                );
            }
        }

        let mut evictions = BTreeMap::new();
        self.capability_failures.clear();
        for (capability, candidates) in providers {
            if candidates.len() < 2 {
                continue;
            }
            let candidates: Vec<CapabilityCandidate> = candidates.into_values().collect();
            match self.conflicts.resolve_capability(&capability, &candidates, self.rules) {
                Some(decision) => {
                    for loser in candidates.iter().filter(|c| c.module != decision.winner) {
                        evictions.entry(loser.module.clone()).or_insert_with(|| decision.clone());
                    }
                }
                None => self.capability_failures.push((capability, candidates)),
            }
        }

        let mut changed = false;
        for (module, state) in self.state.modules.iter_mut() {
            let eviction = evictions.remove(module);
            if state.evicted_by != eviction {
                if let Some(decision) = &eviction {
                    tracing::debug!(%module, winner = %decision.winner, reason = %decision.reason, "evicted by capability conflict");
                }
                state.evicted_by = eviction;
                self.dirty.insert(module.clone());
                changed = true;
            }
        }
        changed
    }

    async fn fetch_components(
        &self,
        ids: Vec<ComponentId>,
    ) -> Result<FetchResults<ComponentId, Arc<ComponentMetadata>>, Cancelled> {
        let cache = self.cache.clone();
        self.wave(ids, move |id: ComponentId| {
            let cache = cache.clone();
            async move { cache.fetch(&id).await }
        })
        .await
    }

    /// Run one fetch per key concurrently, bounded by the fetch permits, and
    /// return the results in key order. Cancellation abandons the wave.
    async fn wave<K, T, F, Fut>(&self, keys: Vec<K>, task: F) -> Result<FetchResults<K, T>, Cancelled>
    where
        K: Clone + fmt::Display + Send + 'static,
        T: Send + 'static,
        F: Fn(K) -> Fut,
        Fut: Future<Output = Result<T, FetchFailure>> + Send + 'static,
    {
        let mut set = JoinSet::new();
        for (index, key) in keys.iter().cloned().enumerate() {
            let permits = self.permits.clone();
            let fetch = task(key);
            set.spawn(async move {
                let _permit = permits.acquire_owned().await;
                (index, fetch.await)
            });
        }

        let mut results: Vec<Option<Result<T, FetchFailure>>> = keys.iter().map(|_| None).collect();
        loop {
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    tracing::debug!(in_flight = set.len(), "abandoning in-flight fetches");
                    set.abort_all();
                    return Err(Cancelled);
                }
                next = set.join_next() => next,
            };
            match next {
                None => break,
                Some(Ok((index, result))) => results[index] = Some(result),
                Some(Err(e)) => tracing::warn!(error = %e, "fetch task failed"),
            }
        }

        Ok(keys
            .into_iter()
            .zip(results)
            .map(|(key, result)| {
                let result = result.unwrap_or_else(|| {
                    Err(FetchFailure::Unavailable {
                        subject: key.to_string(),
                        message: "fetch task did not complete".to_string(),
                    })
                });
                (key, result)
            })
            .collect())
    }
}

fn project_id(edge: &EdgeState) -> Option<ComponentId> {
    match &edge.selector {
        ComponentSelector::Project(project) => Some(ComponentId::project(&project.path)),
        ComponentSelector::Module(_) => None,
    }
}

/// Once a module has used up its change budget it only moves up, or onto a
/// project. A conflict found by then stays reported.
fn keeps_current(state: &ModuleState, decision: &Decision) -> bool {
    if matches!(state.failure, Some(ModuleFailure::Conflict { .. })) {
        return true;
    }
    match (&decision.selected, &state.selected) {
        (Selected::Module(version), Some(current)) => version <= current.selected.version(),
        _ => false,
    }
}

fn count_change(module: &ModuleIdentifier, state: &mut ModuleState, max_changes: u32) {
    state.changes += 1;
    if state.changes == max_changes.saturating_add(1) {
        tracing::warn!(%module, changes = state.changes, "selection did not settle, keeping the highest version");
    }
}
