use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use depsolve_core::config::ResolverConfig;
use depsolve_core::identity::{ComponentId, ModuleIdentifier};
use depsolve_core::metadata::ComponentMetadata;
use depsolve_core::selector::ComponentSelector;
use depsolve_resolver::provider::{FetchFailure, MetadataProvider};
use depsolve_resolver::repository::StaticRepository;
use depsolve_resolver::rules::ResolutionRules;
use depsolve_resolver::{ResolveError, ResolveRequest, Resolver, RootComponent};

const REPO: &str = r#"
[[component]]
module = "org:a"
version = "1.0"
dependencies = ["org:b:1.0", "org:c:[1.0,2.0)"]

[[component]]
module = "org:b"
version = "1.0"
dependencies = ["org:c:1.0"]

[[component]]
module = "org:c"
versions = ["1.0", "1.1"]
"#;

fn root(coords: &str) -> RootComponent {
    RootComponent::synthetic(ComponentSelector::parse_module(coords).unwrap())
}

/// Never answers.
struct Hanging {
    started: AtomicUsize,
}

#[async_trait]
impl MetadataProvider for Hanging {
    async fn fetch(&self, _: &ComponentId) -> Result<ComponentMetadata, FetchFailure> {
        self.started.fetch_add(1, Ordering::SeqCst);
        std::future::pending().await
    }

    async fn list_versions(&self, _: &ModuleIdentifier) -> Result<Vec<String>, FetchFailure> {
        std::future::pending().await
    }
}

#[tokio::test]
async fn cancellation_abandons_in_flight_fetches() {
    let provider = Arc::new(Hanging {
        started: AtomicUsize::new(0),
    });
    let resolver = Resolver::new(provider.clone(), ResolverConfig::default());
    let cancel = CancellationToken::new();
    let request = ResolveRequest::new(root("org:a:1.0")).with_cancellation(cancel.clone());

    let trigger = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
    });
    let result = tokio::time::timeout(
        Duration::from_secs(5),
        resolver.resolve_graph(request, &ResolutionRules::new()),
    )
    .await
    .expect("cancelled resolution must return promptly");
    trigger.await.unwrap();

    assert!(matches!(result, Err(ResolveError::Cancelled)));
    assert_eq!(provider.started.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn concurrent_resolutions_share_fetches() {
    let repo = Arc::new(StaticRepository::parse(REPO).unwrap());
    let resolver = Arc::new(Resolver::new(repo.clone(), ResolverConfig::default()));
    let rules = ResolutionRules::new();

    let (first, second) = tokio::join!(
        resolver.resolve_graph(ResolveRequest::new(root("org:a:1.0")), &rules),
        resolver.resolve_graph(ResolveRequest::new(root("org:a:1.0")), &rules),
    );
    let first = first.unwrap();
    let second = second.unwrap();
    assert_eq!(first.to_json().unwrap(), second.to_json().unwrap());
    assert_eq!(first.version_of("org:c"), Some("1.1"));

    // a, b and c:1.1 are each fetched once across both resolutions.
    assert_eq!(repo.fetch_count(), 3);
    assert!(resolver.cache().hits() > 0);
}

#[tokio::test]
async fn fetch_concurrency_is_bounded() {
    struct Tracking {
        inner: StaticRepository,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl MetadataProvider for Tracking {
        async fn fetch(&self, id: &ComponentId) -> Result<ComponentMetadata, FetchFailure> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.inner.fetch(id).await
        }

        async fn list_versions(&self, module: &ModuleIdentifier) -> Result<Vec<String>, FetchFailure> {
            self.inner.list_versions(module).await
        }
    }

    let mut repo = String::new();
    let mut deps = Vec::new();
    for i in 0..12 {
        repo.push_str(&format!("[[component]]\nmodule = \"org:leaf{i}\"\nversion = \"1.0\"\n\n"));
        deps.push(format!("\"org:leaf{i}:1.0\""));
    }
    repo.push_str(&format!(
        "[[component]]\nmodule = \"org:wide\"\nversion = \"1.0\"\ndependencies = [{}]\n",
        deps.join(", ")
    ));

    let provider = Arc::new(Tracking {
        inner: StaticRepository::parse(&repo).unwrap(),
        in_flight: AtomicUsize::new(0),
        peak: AtomicUsize::new(0),
    });
    let config = ResolverConfig {
        max_concurrent_fetches: 3,
        ..ResolverConfig::default()
    };
    let resolver = Resolver::new(provider.clone(), config);
    let graph = resolver
        .resolve_graph(ResolveRequest::new(root("org:wide:1.0")), &ResolutionRules::new())
        .await
        .unwrap();
    assert_eq!(graph.len(), 13);
    assert!(provider.peak.load(Ordering::SeqCst) <= 3);
}
