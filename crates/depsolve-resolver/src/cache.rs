//! Coalescing metadata cache shared between resolutions.
//!
//! Every distinct key is resolved at most once: the first caller starts the
//! provider call and later callers, concurrent or not, await the same shared
//! future. Failures are cached as well, so a missing component is reported
//! consistently for the life of the cache.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use futures_util::future::{BoxFuture, FutureExt, Shared};

use depsolve_core::identity::{ComponentId, ModuleIdentifier};
use depsolve_core::metadata::ComponentMetadata;

use crate::provider::{FetchFailure, MetadataProvider};
use crate::version::Version;

type SharedFetch<T> = Shared<BoxFuture<'static, Result<T, FetchFailure>>>;

pub struct MetadataCache {
    provider: Arc<dyn MetadataProvider>,
    components: DashMap<ComponentId, SharedFetch<Arc<ComponentMetadata>>>,
    versions: DashMap<ModuleIdentifier, SharedFetch<Arc<Vec<Version>>>>,
    hits: AtomicUsize,
}

impl MetadataCache {
    pub fn new(provider: Arc<dyn MetadataProvider>) -> Self {
        Self {
            provider,
            components: DashMap::new(),
            versions: DashMap::new(),
            hits: AtomicUsize::new(0),
        }
    }

    pub async fn fetch(&self, id: &ComponentId) -> Result<Arc<ComponentMetadata>, FetchFailure> {
        let shared = match self.components.get(id) {
            Some(existing) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                tracing::trace!(component = %id, "metadata cache hit");
                existing.clone()
            }
            None => self
                .components
                .entry(id.clone())
                .or_insert_with(|| {
                    let provider = self.provider.clone();
                    let id = id.clone();
                    async move {
                        tracing::debug!(component = %id, "fetching metadata");
                        provider.fetch(&id).await.map(Arc::new)
                    }
                    .boxed()
                    .shared()
                })
                .clone(),
        };
        shared.await
    }

    /// Published versions of a module, sorted ascending.
    pub async fn versions(&self, module: &ModuleIdentifier) -> Result<Arc<Vec<Version>>, FetchFailure> {
        let shared = match self.versions.get(module) {
            Some(existing) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                tracing::trace!(%module, "version listing cache hit");
                existing.clone()
            }
            None => self
                .versions
                .entry(module.clone())
                .or_insert_with(|| {
                    let provider = self.provider.clone();
                    let module = module.clone();
                    async move {
                        tracing::debug!(%module, "listing versions");
                        let listed = provider.list_versions(&module).await?;
                        let mut parsed: Vec<Version> = listed.iter().map(|v| Version::parse(v)).collect();
                        parsed.sort();
                        parsed.dedup();
                        Ok(Arc::new(parsed))
                    }
                    .boxed()
                    .shared()
                })
                .clone(),
        };
        shared.await
    }

    /// How many lookups were answered without starting a provider call.
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use depsolve_core::identity::ModuleVersionIdentifier;

    #[derive(Default)]
    struct CountingProvider {
        fetches: AtomicUsize,
        listings: AtomicUsize,
    }

    #[async_trait]
    impl MetadataProvider for CountingProvider {
        async fn fetch(&self, id: &ComponentId) -> Result<ComponentMetadata, FetchFailure> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            match id {
                ComponentId::Module(mvi) if mvi.version() != "0.0" => {
                    Ok(ComponentMetadata::module(mvi.clone()))
                }
                other => Err(FetchFailure::NotFound(other.to_string())),
            }
        }

        async fn list_versions(&self, _module: &ModuleIdentifier) -> Result<Vec<String>, FetchFailure> {
            self.listings.fetch_add(1, Ordering::SeqCst);
            Ok(vec!["2.0".into(), "1.0".into(), "1.10".into(), "1.0".into()])
        }
    }

    fn component(v: &str) -> ComponentId {
        ComponentId::Module(ModuleVersionIdentifier::parse(&format!("g:n:{v}")).unwrap())
    }

    #[tokio::test]
    async fn concurrent_fetches_are_coalesced() {
        let provider = Arc::new(CountingProvider::default());
        let cache = Arc::new(MetadataCache::new(provider.clone()));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move { cache.fetch(&component("1.0")).await }));
        }
        for handle in handles {
            assert!(handle.await.unwrap().is_ok());
        }
        assert_eq!(provider.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failures_are_cached() {
        let provider = Arc::new(CountingProvider::default());
        let cache = MetadataCache::new(provider.clone());
        assert!(cache.fetch(&component("0.0")).await.is_err());
        assert!(cache.fetch(&component("0.0")).await.is_err());
        assert_eq!(provider.fetches.load(Ordering::SeqCst), 1);
        assert_eq!(cache.hits(), 1);
    }

    #[tokio::test]
    async fn versions_are_sorted_and_deduplicated() {
        let provider = Arc::new(CountingProvider::default());
        let cache = MetadataCache::new(provider.clone());
        let module = ModuleIdentifier::new("g", "n");
        let versions = cache.versions(&module).await.unwrap();
        let listed: Vec<&str> = versions.iter().map(|v| v.original.as_str()).collect();
        assert_eq!(listed, vec!["1.0", "1.10", "2.0"]);
        cache.versions(&module).await.unwrap();
        assert_eq!(provider.listings.load(Ordering::SeqCst), 1);
    }
}
