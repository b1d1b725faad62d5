//! Loading the manifest, repository, configuration and lockfile that one
//! command invocation resolves against.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use miette::Result;
use tokio_util::sync::CancellationToken;

use depsolve_core::config::{GlobalConfig, OutputFormat};
use depsolve_core::lockfile::Lockfile;
use depsolve_core::manifest::Manifest;
use depsolve_resolver::repository::StaticRepository;
use depsolve_resolver::rules::ResolutionRules;
use depsolve_resolver::{ResolveRequest, ResolvedGraph, Resolver, RootComponent};
use depsolve_util::errors::DepsolveError;

const DEFAULT_REPOSITORY: &str = "repository.toml";
const DEFAULT_LOCKFILE: &str = "depsolve.lock";

pub struct Session {
    pub manifest: Manifest,
    pub output: OutputFormat,
    pub lockfile_path: PathBuf,
    resolver: Resolver,
    rules: ResolutionRules,
}

impl Session {
    /// Load the manifest at `manifest_path` and the repository it resolves
    /// against (`repository`, or `repository.toml` beside the manifest).
    pub fn load(manifest_path: &Path, repository: Option<&Path>) -> Result<Self> {
        if !manifest_path.is_file() {
            return Err(DepsolveError::Manifest {
                message: format!("No manifest found at {}", manifest_path.display()),
            }
            .into());
        }
        let manifest = Manifest::from_path(manifest_path)?;
        let manifest_dir = manifest_path.parent().unwrap_or_else(|| Path::new("."));

        let repository_path = match repository {
            Some(path) => path.to_path_buf(),
            None => manifest_dir.join(DEFAULT_REPOSITORY),
        };
        let repository = StaticRepository::from_path(&repository_path)?;

        let global = GlobalConfig::load()?;
        let config = match &manifest.resolver {
            Some(overrides) => overrides.apply(&global.resolver),
            None => global.resolver,
        };
        let rules = ResolutionRules::from_spec(&manifest.rules)?;
        let lockfile_path = manifest
            .lockfile_path(manifest_dir)
            .unwrap_or_else(|| manifest_dir.join(DEFAULT_LOCKFILE));

        tracing::debug!(
            manifest = %manifest_path.display(),
            repository = %repository_path.display(),
            max_concurrent_fetches = config.max_concurrent_fetches,
            "loaded session"
        );

        Ok(Self {
            manifest,
            output: global.output.format,
            lockfile_path,
            resolver: Resolver::new(Arc::new(repository), config),
            rules,
        })
    }

    /// The request for the manifest's root, pinned by the lockfile when
    /// `use_lock` is set and one exists.
    pub fn request(&self, use_lock: bool) -> Result<ResolveRequest> {
        let mut request = ResolveRequest::new(RootComponent::from_manifest(&self.manifest)?);
        if use_lock && self.lockfile_path.is_file() {
            match Lockfile::from_path(&self.lockfile_path) {
                Ok(lock) => {
                    tracing::debug!(modules = lock.locked.len(), "using lockfile");
                    request = request.with_lock(Arc::new(lock));
                }
                Err(e) => tracing::warn!("ignoring unreadable lockfile: {e}"),
            }
        }
        Ok(request)
    }

    /// Run a resolution, cancelling it on Ctrl-C.
    pub async fn resolve(&self, request: ResolveRequest, build_deps: bool) -> Result<ResolvedGraph> {
        let cancel = CancellationToken::new();
        let request = request.with_cancellation(cancel.clone());
        let interrupt = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupted, cancelling resolution");
                cancel.cancel();
            }
        });

        let result = if build_deps {
            self.resolver.resolve_build_dependencies(request, &self.rules).await
        } else {
            self.resolver.resolve_graph(request, &self.rules).await
        };
        interrupt.abort();

        let graph = result?;
        for failure in &graph.failures {
            eprintln!("warning: {failure}");
        }
        Ok(graph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const MANIFEST: &str = r#"
[root]
group = "com.acme"
name = "app"

[dependencies]
lib = "org:lib:1.0"
"#;

    const REPOSITORY: &str = r#"
[[component]]
module = "org:lib"
version = "1.0"
"#;

    fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn missing_manifest_is_reported() {
        let tmp = TempDir::new().unwrap();
        let err = Session::load(&tmp.path().join("depsolve.toml"), None).err().unwrap();
        assert!(err.to_string().contains("No manifest found"));
    }

    #[tokio::test]
    async fn repository_defaults_to_manifest_directory() {
        let tmp = TempDir::new().unwrap();
        let manifest = write(tmp.path(), "depsolve.toml", MANIFEST);
        write(tmp.path(), "repository.toml", REPOSITORY);

        let session = Session::load(&manifest, None).unwrap();
        assert_eq!(session.lockfile_path, tmp.path().join("depsolve.lock"));
        let graph = session.resolve(session.request(true).unwrap(), false).await.unwrap();
        assert_eq!(graph.version_of("org:lib"), Some("1.0"));
    }

    #[test]
    fn unreadable_lockfile_is_ignored() {
        let tmp = TempDir::new().unwrap();
        let manifest = write(tmp.path(), "depsolve.toml", MANIFEST);
        write(tmp.path(), "repository.toml", REPOSITORY);
        write(tmp.path(), "depsolve.lock", "locked = 42");

        let session = Session::load(&manifest, None).unwrap();
        assert!(session.request(true).unwrap().lock.is_none());
    }
}
