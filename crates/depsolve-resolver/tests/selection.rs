use std::sync::Arc;

use depsolve_core::config::ResolverConfig;
use depsolve_core::lockfile::{LockedModule, Lockfile};
use depsolve_core::manifest::Manifest;
use depsolve_resolver::conflict::SelectionReason;
use depsolve_resolver::repository::StaticRepository;
use depsolve_resolver::rules::ResolutionRules;
use depsolve_resolver::{ResolutionFailure, ResolveError, ResolveRequest, ResolvedGraph, Resolver, RootComponent};

const REPO: &str = r#"
[[component]]
module = "org:lib"
versions = ["1.0", "1.5", "2.0", "2.5", "3.0"]

[[component]]
module = "org:a"
version = "1.0"
dependencies = ["org:lib:1.5"]

[[component]]
module = "org:b"
version = "1.0"
dependencies = ["org:lib:2.0"]

[[component]]
module = "org:strict"
version = "1.0"
dependencies = [{ module = "org:lib", strictly = "1.5" }]

[[component]]
module = "org:nightly"
version = "1.0"

[[component]]
module = "org:nightly"
version = "2.0"
status = "milestone"

[[component]]
module = "org:nightly"
version = "3.0"
status = "integration"
"#;

async fn resolve_with(manifest: &str, lock: Option<Lockfile>) -> Result<ResolvedGraph, ResolveError> {
    let manifest = Manifest::from_str(manifest).unwrap();
    let config = match &manifest.resolver {
        Some(overrides) => overrides.apply(&ResolverConfig::default()),
        None => ResolverConfig::default(),
    };
    let repo = Arc::new(StaticRepository::parse(REPO).unwrap());
    let resolver = Resolver::new(repo, config);
    let rules = ResolutionRules::from_spec(&manifest.rules).unwrap();
    let mut request = ResolveRequest::new(RootComponent::from_manifest(&manifest).unwrap());
    if let Some(lock) = lock {
        request = request.with_lock(Arc::new(lock));
    }
    resolver.resolve_graph(request, &rules).await
}

async fn resolve(manifest: &str) -> Result<ResolvedGraph, ResolveError> {
    resolve_with(manifest, None).await
}

fn reason_of(graph: &ResolvedGraph, key: &str) -> SelectionReason {
    graph.component(graph.find(key).unwrap()).reason
}

#[tokio::test]
async fn range_selects_highest_available() {
    let graph = resolve(
        r#"
[root]
group = "com.acme"
name = "app"

[dependencies]
lib = "org:lib:[1.0,3.0)"
"#,
    )
    .await
    .unwrap();
    assert_eq!(graph.version_of("org:lib"), Some("2.5"));
    assert_eq!(reason_of(&graph, "org:lib"), SelectionReason::Requested);
    assert!(graph.print_tree(None).contains("org:lib:[1.0,3.0) -> 2.5"));
}

#[tokio::test]
async fn prefix_and_preferred_versions() {
    let graph = resolve(
        r#"
[root]
group = "com.acme"
name = "app"

[dependencies]
lib = { module = "org:lib", version = "[1.0,3.0)", prefer = "1.5" }
"#,
    )
    .await
    .unwrap();
    assert_eq!(graph.version_of("org:lib"), Some("1.5"));

    let graph = resolve(
        r#"
[root]
group = "com.acme"
name = "app"

[dependencies]
lib = "org:lib:1.+"
"#,
    )
    .await
    .unwrap();
    assert_eq!(graph.version_of("org:lib"), Some("1.5"));
}

#[tokio::test]
async fn highest_requested_version_wins_conflict() {
    let graph = resolve(
        r#"
[root]
group = "com.acme"
name = "app"

[dependencies]
a = "org:a:1.0"
b = "org:b:1.0"
"#,
    )
    .await
    .unwrap();
    assert_eq!(graph.version_of("org:lib"), Some("2.0"));
    assert_eq!(reason_of(&graph, "org:lib"), SelectionReason::ConflictResolution);

    assert_eq!(graph.conflicts.len(), 1);
    let report = graph.conflicts.to_string();
    assert!(report.contains("org:lib requested 1.5, 2.0 but resolved 2.0 (by conflict resolution)"));
}

#[tokio::test]
async fn rejected_versions_are_skipped() {
    let graph = resolve(
        r#"
[root]
group = "com.acme"
name = "app"

[dependencies]
lib = { module = "org:lib", version = "[1.0,3.0)", reject = ["2.5"] }
"#,
    )
    .await
    .unwrap();
    assert_eq!(graph.version_of("org:lib"), Some("2.0"));
}

#[tokio::test]
async fn strict_constraint_violation_names_every_selector() {
    let err = resolve(
        r#"
[root]
group = "com.acme"
name = "app"

[dependencies]
b = "org:b:1.0"
strict = "org:strict:1.0"
"#,
    )
    .await
    .unwrap_err();

    let ResolveError::Failed { failures, graph, .. } = &err else {
        panic!("expected a failed resolution, got {err:?}");
    };
    assert_eq!(failures.len(), 1);
    let ResolutionFailure::VersionConflict { module, requested, .. } = &failures[0] else {
        panic!("expected a version conflict, got {:?}", failures[0]);
    };
    assert_eq!(module.to_string(), "org:lib");
    let selectors: Vec<&str> = requested.iter().map(|p| p.selector.as_str()).collect();
    assert!(selectors.contains(&"org:lib:2.0"));
    assert!(selectors.contains(&"org:lib:{strictly 1.5}"));

    let message = err.to_string();
    assert!(message.contains("does not satisfy strict constraint strictly 1.5"));
    assert!(message.contains("(via com.acme:app:unspecified -> org:b:1.0)"));

    // The rest of the graph is still resolved for diagnostics.
    assert_eq!(graph.version_of("org:b"), Some("1.0"));
    assert!(graph.find("org:lib").is_none());
}

#[tokio::test]
async fn forced_version_overrides_requests() {
    let graph = resolve(
        r#"
[root]
group = "com.acme"
name = "app"

[dependencies]
a = "org:a:1.0"
b = "org:b:1.0"

[rules]
force = ["org:lib:1.0"]
"#,
    )
    .await
    .unwrap();
    assert_eq!(graph.version_of("org:lib"), Some("1.0"));
    assert_eq!(reason_of(&graph, "org:lib"), SelectionReason::Forced);
    assert!(graph.conflicts.to_string().contains("resolved 1.0 (forced)"));
}

#[tokio::test]
async fn forced_version_is_checked_against_strict_constraints() {
    let err = resolve(
        r#"
[root]
group = "com.acme"
name = "app"

[dependencies]
strict = "org:strict:1.0"

[rules]
force = ["org:lib:2.0"]
"#,
    )
    .await
    .unwrap_err();
    assert!(err
        .to_string()
        .contains("forced version 2.0 does not satisfy strict constraint strictly 1.5"));
}

#[tokio::test]
async fn lock_pins_version_and_force_beats_lock() {
    let lock = Lockfile::generate(vec![LockedModule {
        group: "org".into(),
        name: "lib".into(),
        version: "1.5".into(),
    }]);
    let manifest = r#"
[root]
group = "com.acme"
name = "app"

[dependencies]
b = "org:b:1.0"
"#;
    let graph = resolve_with(manifest, Some(lock.clone())).await.unwrap();
    assert_eq!(graph.version_of("org:lib"), Some("1.5"));
    assert_eq!(reason_of(&graph, "org:lib"), SelectionReason::Locked);

    let forced = format!("{manifest}\n[rules]\nforce = [\"org:lib:2.5\"]\n");
    let graph = resolve_with(&forced, Some(lock)).await.unwrap();
    assert_eq!(graph.version_of("org:lib"), Some("2.5"));
    assert_eq!(reason_of(&graph, "org:lib"), SelectionReason::Forced);
}

#[tokio::test]
async fn latest_status_selectors_use_metadata() {
    let graph = resolve(
        r#"
[root]
group = "com.acme"
name = "app"

[dependencies]
release = "org:nightly:latest.release"
"#,
    )
    .await
    .unwrap();
    assert_eq!(graph.version_of("org:nightly"), Some("1.0"));

    let graph = resolve(
        r#"
[root]
group = "com.acme"
name = "app"

[dependencies]
milestone = "org:nightly:latest.milestone"
"#,
    )
    .await
    .unwrap();
    assert_eq!(graph.version_of("org:nightly"), Some("2.0"));

    let graph = resolve(
        r#"
[root]
group = "com.acme"
name = "app"

[dependencies]
integration = "org:nightly:latest.integration"
"#,
    )
    .await
    .unwrap();
    assert_eq!(graph.version_of("org:nightly"), Some("3.0"));
}

#[tokio::test]
async fn fail_on_version_conflict() {
    let err = resolve(
        r#"
[root]
group = "com.acme"
name = "app"

[dependencies]
a = "org:a:1.0"
b = "org:b:1.0"

[resolver]
fail-on-version-conflict = true
"#,
    )
    .await
    .unwrap_err();
    assert!(matches!(
        err.failures(),
        [ResolutionFailure::VersionConflict { .. }]
    ));
    assert!(err.to_string().contains("failing on version conflicts is enabled"));
}

#[tokio::test]
async fn fail_on_dynamic_versions() {
    let err = resolve(
        r#"
[root]
group = "com.acme"
name = "app"

[dependencies]
lib = "org:lib:1.+"

[resolver]
fail-on-dynamic-versions = true
"#,
    )
    .await
    .unwrap_err();
    let [ResolutionFailure::DynamicVersion { selector, .. }] = err.failures() else {
        panic!("expected a dynamic version failure, got {:?}", err.failures());
    };
    assert_eq!(selector, "org:lib:1.+");
}

#[tokio::test]
async fn empty_range_is_a_conflict() {
    let err = resolve(
        r#"
[root]
group = "com.acme"
name = "app"

[dependencies]
lib = "org:lib:[4.0,5.0)"
"#,
    )
    .await
    .unwrap_err();
    assert!(err.to_string().contains("no available version satisfies [4.0,5.0)"));
}
