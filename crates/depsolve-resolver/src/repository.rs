//! An in-memory metadata provider loaded from a `repository.toml` file.
//!
//! ```toml
//! [[component]]
//! module = "com.acme:lib"
//! versions = ["1.0", "1.5"]
//! dependencies = ["com.acme:util:1.0"]
//!
//! [[component]]
//! module = "com.acme:util"
//! version = "1.0"
//! status = "milestone"
//!
//! [[component.variant]]
//! name = "api"
//! attributes = { usage = "api" }
//!
//! [[project]]
//! path = ":core"
//! module = "com.acme:core"
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use serde::Deserialize;

use depsolve_core::attributes::{Attributes, Capability};
use depsolve_core::dependency::DependencySpec;
use depsolve_core::identity::{ComponentId, ModuleIdentifier, ModuleVersionIdentifier};
use depsolve_core::metadata::{ComponentMetadata, ComponentStatus, DependencyMetadata, VariantMetadata};
use depsolve_util::errors::DepsolveError;

use crate::provider::{FetchFailure, MetadataProvider};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RepositoryFile {
    component: Vec<ComponentEntry>,
    project: Vec<ProjectEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct ComponentEntry {
    module: String,
    #[serde(default)]
    version: Option<String>,
    /// Several versions sharing the same metadata.
    #[serde(default)]
    versions: Vec<String>,
    #[serde(default)]
    status: ComponentStatus,
    #[serde(default)]
    branch: Option<String>,
    #[serde(flatten)]
    content: VariantContent,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct ProjectEntry {
    path: String,
    module: String,
    #[serde(default = "unspecified")]
    version: String,
    #[serde(flatten)]
    content: VariantContent,
}

fn unspecified() -> String {
    "unspecified".to_string()
}

/// Either explicit `[[variant]]` tables or the top-level fields of a single
/// `default` variant.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
struct VariantContent {
    dependencies: Vec<DependencySpec>,
    attributes: Attributes,
    capabilities: Vec<String>,
    variant: Vec<VariantEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct VariantEntry {
    name: String,
    #[serde(default)]
    attributes: Attributes,
    #[serde(default)]
    capabilities: Vec<String>,
    #[serde(default)]
    dependencies: Vec<DependencySpec>,
}

/// Fixed component metadata held in memory.
#[derive(Debug, Default)]
pub struct StaticRepository {
    components: BTreeMap<ModuleVersionIdentifier, ComponentMetadata>,
    projects: BTreeMap<String, ComponentMetadata>,
    fetches: AtomicUsize,
}

impl StaticRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_path(path: &Path) -> miette::Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| DepsolveError::Repository {
            message: format!("Failed to read {}: {e}", path.display()),
        })?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> miette::Result<Self> {
        let file: RepositoryFile = toml::from_str(content).map_err(|e| DepsolveError::Repository {
            message: format!("Failed to parse repository: {e}"),
        })?;

        let mut repo = Self::new();
        for entry in &file.component {
            let module = parse_module(&entry.module)?;
            let mut versions = entry.versions.clone();
            versions.extend(entry.version.clone());
            if versions.is_empty() {
                return Err(DepsolveError::Repository {
                    message: format!("Component {module} declares no version"),
                }
                .into());
            }
            for version in versions {
                let id = module.with_version(&version);
                let mut meta = ComponentMetadata::module(id.clone());
                meta.status = entry.status;
                meta.branch = entry.branch.clone();
                meta.variants = entry.content.variants(&id.to_string())?;
                repo.add_component(meta);
            }
        }
        for entry in &file.project {
            let id = parse_module(&entry.module)?.with_version(&entry.version);
            let mut meta = ComponentMetadata::project(&entry.path, id);
            meta.variants = entry.content.variants(&entry.path)?;
            repo.add_project(meta);
        }
        tracing::debug!(
            components = repo.components.len(),
            projects = repo.projects.len(),
            "loaded static repository"
        );
        Ok(repo)
    }

    pub fn add_component(&mut self, meta: ComponentMetadata) {
        self.components.insert(meta.module_version.clone(), meta);
    }

    /// Register a project. `meta.id` must be a project id.
    pub fn add_project(&mut self, meta: ComponentMetadata) {
        if let ComponentId::Project(path) = &meta.id {
            self.projects.insert(path.to_string(), meta);
        }
    }

    /// Number of `fetch` calls answered so far.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

fn parse_module(module: &str) -> miette::Result<ModuleIdentifier> {
    ModuleIdentifier::parse(module).ok_or_else(|| {
        DepsolveError::Repository {
            message: format!("Invalid module '{module}', expected 'group:name'"),
        }
        .into()
    })
}

fn parse_capabilities(caps: &[String], owner: &str) -> miette::Result<Vec<Capability>> {
    caps.iter()
        .map(|c| {
            Capability::parse(c).ok_or_else(|| {
                DepsolveError::Repository {
                    message: format!("Invalid capability '{c}' on {owner}"),
                }
                .into()
            })
        })
        .collect()
}

fn parse_dependencies(deps: &[DependencySpec], owner: &str) -> miette::Result<Vec<DependencyMetadata>> {
    deps.iter()
        .enumerate()
        .map(|(i, d)| d.to_metadata(&format!("{owner}#{i}")))
        .collect()
}

impl VariantContent {
    fn variants(&self, owner: &str) -> miette::Result<Vec<VariantMetadata>> {
        if self.variant.is_empty() {
            let mut variant = VariantMetadata::new("default");
            variant.attributes = self.attributes.clone();
            variant.capabilities = parse_capabilities(&self.capabilities, owner)?;
            variant.dependencies = parse_dependencies(&self.dependencies, owner)?;
            return Ok(vec![variant]);
        }
        self.variant
            .iter()
            .map(|v| {
                let owner = format!("{owner} variant {}", v.name);
                let mut variant = VariantMetadata::new(&v.name);
                variant.attributes = v.attributes.clone();
                variant.capabilities = parse_capabilities(&v.capabilities, &owner)?;
                // Top-level dependencies are shared by every variant.
                let mut deps = parse_dependencies(&self.dependencies, &owner)?;
                deps.extend(parse_dependencies(&v.dependencies, &owner)?);
                variant.dependencies = deps;
                Ok(variant)
            })
            .collect()
    }
}

#[async_trait]
impl MetadataProvider for StaticRepository {
    async fn fetch(&self, id: &ComponentId) -> Result<ComponentMetadata, FetchFailure> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let found = match id {
            ComponentId::Module(mvi) => self.components.get(mvi),
            ComponentId::Project(path) => self.projects.get(path.as_ref()),
        };
        found.cloned().ok_or_else(|| FetchFailure::NotFound(id.to_string()))
    }

    async fn list_versions(&self, module: &ModuleIdentifier) -> Result<Vec<String>, FetchFailure> {
        let versions: Vec<String> = self
            .components
            .keys()
            .filter(|id| id.module() == module)
            .map(|id| id.version().to_string())
            .collect();
        if versions.is_empty() {
            return Err(FetchFailure::NotFound(module.to_string()));
        }
        Ok(versions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REPO: &str = r#"
[[component]]
module = "com.acme:lib"
versions = ["1.0", "1.5"]
dependencies = ["com.acme:util:1.0"]

[[component]]
module = "com.acme:util"
version = "1.0"
status = "milestone"
branch = "main"
dependencies = ["com.acme:base:1.0"]

[[component.variant]]
name = "api"
attributes = { usage = "api" }

[[component.variant]]
name = "runtime"
attributes = { usage = "runtime" }
capabilities = ["com.acme:util:1.0", "com.acme:util-runtime:1.0"]
dependencies = ["com.acme:extra:1.0"]

[[project]]
path = ":core"
module = "com.acme:core"
version = "2.0"
"#;

    fn module_id(s: &str) -> ComponentId {
        ComponentId::Module(ModuleVersionIdentifier::parse(s).unwrap())
    }

    #[tokio::test]
    async fn default_variant_from_top_level_fields() {
        let repo = StaticRepository::parse(REPO).unwrap();
        let meta = repo.fetch(&module_id("com.acme:lib:1.5")).await.unwrap();
        assert_eq!(meta.variants.len(), 1);
        assert_eq!(meta.variants[0].name, "default");
        assert_eq!(meta.variants[0].dependencies[0].selector.to_string(), "com.acme:util:1.0");
    }

    #[tokio::test]
    async fn explicit_variants_share_top_level_dependencies() {
        let repo = StaticRepository::parse(REPO).unwrap();
        let meta = repo.fetch(&module_id("com.acme:util:1.0")).await.unwrap();
        assert_eq!(meta.status, ComponentStatus::Milestone);
        assert_eq!(meta.branch.as_deref(), Some("main"));
        let runtime = &meta.variants[1];
        assert_eq!(runtime.attributes.get("usage"), Some("runtime"));
        assert_eq!(runtime.capabilities.len(), 2);
        assert_eq!(runtime.dependencies.len(), 2);
        assert_eq!(meta.variants[0].dependencies.len(), 1);
    }

    #[tokio::test]
    async fn projects_and_listings() {
        let repo = StaticRepository::parse(REPO).unwrap();
        let project = repo.fetch(&ComponentId::project(":core")).await.unwrap();
        assert_eq!(project.module_version.to_string(), "com.acme:core:2.0");

        let versions = repo
            .list_versions(&ModuleIdentifier::new("com.acme", "lib"))
            .await
            .unwrap();
        assert_eq!(versions, vec!["1.0".to_string(), "1.5".to_string()]);
        assert!(repo
            .list_versions(&ModuleIdentifier::new("com.acme", "missing"))
            .await
            .is_err());
        assert_eq!(repo.fetch_count(), 1);
    }

    #[tokio::test]
    async fn missing_component_is_not_found() {
        let repo = StaticRepository::parse(REPO).unwrap();
        let err = repo.fetch(&module_id("com.acme:lib:9.9")).await.unwrap_err();
        assert_eq!(err, FetchFailure::NotFound("com.acme:lib:9.9".into()));
    }

    #[test]
    fn component_without_version_is_rejected() {
        let err = StaticRepository::parse("[[component]]\nmodule = \"g:n\"\n").unwrap_err();
        assert!(err.to_string().contains("declares no version"));
    }
}
