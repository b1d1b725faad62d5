//! Entry points: resolve a root component's dependency graph.

use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;

use depsolve_core::attributes::Attributes;
use depsolve_core::config::ResolverConfig;
use depsolve_core::identity::{ComponentId, ModuleIdentifier, ModuleVersionIdentifier};
use depsolve_core::manifest::Manifest;
use depsolve_core::metadata::{ComponentMetadata, DependencyMetadata, VariantMetadata};
use depsolve_core::selector::ComponentSelector;

use crate::builder::{BuildMode, GraphBuilder};
use crate::cache::MetadataCache;
use crate::failure::ResolveError;
use crate::graph::ResolvedGraph;
use crate::provider::{LockConstraintProvider, MetadataProvider};
use crate::result::assemble;
use crate::rules::ResolutionRules;
use crate::variant::AttributeSchema;

/// Name of the single variant the root component exposes.
const ROOT_VARIANT: &str = "root";

/// The component whose dependencies are being resolved.
#[derive(Debug, Clone)]
pub struct RootComponent {
    pub id: ComponentId,
    pub module_version: ModuleVersionIdentifier,
    /// Attributes requested from every dependency's variants.
    pub attributes: Attributes,
    pub dependencies: Vec<DependencyMetadata>,
}

impl RootComponent {
    pub fn new(module_version: ModuleVersionIdentifier) -> Self {
        Self {
            id: ComponentId::Module(module_version.clone()),
            module_version,
            attributes: Attributes::new(),
            dependencies: Vec::new(),
        }
    }

    /// A root that is itself a local project.
    pub fn project(path: &str, module_version: ModuleVersionIdentifier) -> Self {
        Self {
            id: ComponentId::project(path),
            ..Self::new(module_version)
        }
    }

    /// A synthetic root with a single dependency on `selector`.
    pub fn synthetic(selector: ComponentSelector) -> Self {
        let id = ModuleIdentifier::new("depsolve", "root").with_version("unspecified");
        Self::new(id).depends_on(DependencyMetadata::new(selector))
    }

    /// The root described by a manifest's `[root]` and `[dependencies]`.
    pub fn from_manifest(manifest: &Manifest) -> miette::Result<Self> {
        let mut root = Self::new(manifest.root.id()).with_attributes(manifest.root.attributes.clone());
        root.dependencies = manifest.root_dependencies()?;
        Ok(root)
    }

    pub fn with_attributes(mut self, attributes: Attributes) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn depends_on(mut self, dependency: DependencyMetadata) -> Self {
        self.dependencies.push(dependency);
        self
    }

    /// Component metadata for the root, with one variant carrying its
    /// attributes and dependencies.
    pub fn metadata(&self) -> ComponentMetadata {
        let mut variant = VariantMetadata::new(ROOT_VARIANT);
        variant.attributes = self.attributes.clone();
        variant.dependencies = self.dependencies.clone();
        let metadata = match &self.id {
            ComponentId::Project(path) => ComponentMetadata::project(path, self.module_version.clone()),
            ComponentId::Module(_) => ComponentMetadata::module(self.module_version.clone()),
        };
        metadata.with_variant(variant)
    }
}

/// One resolution: the root plus per-resolution inputs.
#[derive(Clone)]
pub struct ResolveRequest {
    pub root: RootComponent,
    pub lock: Option<Arc<dyn LockConstraintProvider>>,
    pub cancel: CancellationToken,
}

impl ResolveRequest {
    pub fn new(root: RootComponent) -> Self {
        Self {
            root,
            lock: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Pin modules to the versions recorded by a lock.
    pub fn with_lock(mut self, lock: Arc<dyn LockConstraintProvider>) -> Self {
        self.lock = Some(lock);
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// Resolves dependency graphs against one metadata cache.
///
/// A `Resolver` can be shared: resolutions running at the same time share
/// the cache, so each component is fetched at most once.
pub struct Resolver {
    pub(crate) cache: Arc<MetadataCache>,
    config: ResolverConfig,
    schema: AttributeSchema,
}

impl Resolver {
    pub fn new(provider: Arc<dyn MetadataProvider>, config: ResolverConfig) -> Self {
        Self::with_cache(Arc::new(MetadataCache::new(provider)), config)
    }

    pub fn with_cache(cache: Arc<MetadataCache>, config: ResolverConfig) -> Self {
        Self {
            cache,
            config,
            schema: AttributeSchema::new(),
        }
    }

    pub fn with_schema(mut self, schema: AttributeSchema) -> Self {
        self.schema = schema;
        self
    }

    pub fn cache(&self) -> &Arc<MetadataCache> {
        &self.cache
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Resolve the complete transitive graph of the root.
    pub async fn resolve_graph(
        &self,
        request: ResolveRequest,
        rules: &ResolutionRules,
    ) -> Result<ResolvedGraph, ResolveError> {
        self.resolve(request, rules, BuildMode::Full).await
    }

    /// Resolve only as much of the graph as is needed to know which local
    /// projects must be built: external modules are selected but their own
    /// dependencies are not expanded.
    pub async fn resolve_build_dependencies(
        &self,
        request: ResolveRequest,
        rules: &ResolutionRules,
    ) -> Result<ResolvedGraph, ResolveError> {
        self.resolve(request, rules, BuildMode::BuildDependencies).await
    }

    async fn resolve(
        &self,
        request: ResolveRequest,
        rules: &ResolutionRules,
        mode: BuildMode,
    ) -> Result<ResolvedGraph, ResolveError> {
        let started = Instant::now();
        let root = request.root.id.to_string();
        let mut builder = GraphBuilder::new(
            self.cache.clone(),
            rules,
            &self.schema,
            &self.config,
            Arc::new(request.root.metadata()),
            request.lock,
            request.cancel,
            mode,
        );
        if builder.run().await.is_err() {
            tracing::debug!(%root, "resolution cancelled");
            return Err(ResolveError::Cancelled);
        }

        let graph = assemble(&builder, &self.config);
        tracing::info!(
            %root,
            components = graph.len(),
            failures = graph.failures.len(),
            conflicts = graph.conflicts.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "resolution finished"
        );

        if graph.has_fatal_failures() {
            return Err(ResolveError::Failed {
                root,
                failures: graph.failures.clone(),
                graph: Box::new(graph),
            });
        }
        Ok(graph)
    }
}
