//! Collaborator contracts: where metadata and lock pins come from.

use async_trait::async_trait;
use thiserror::Error;

use depsolve_core::identity::{ComponentId, ModuleIdentifier};
use depsolve_core::lockfile::Lockfile;
use depsolve_core::metadata::ComponentMetadata;

/// Why metadata could not be produced.
///
/// Providers are expected to enforce their own timeouts and report them as
/// `Unavailable` instead of hanging.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchFailure {
    #[error("{0} was not found")]
    NotFound(String),

    #[error("{subject} is unavailable: {message}")]
    Unavailable { subject: String, message: String },
}

/// Supplies component metadata and version listings.
///
/// Implementations must be safe to call concurrently; the resolver fans
/// requests out across tasks.
#[async_trait]
pub trait MetadataProvider: Send + Sync {
    /// Metadata of one component: a module at a concrete version, or a
    /// local project by path.
    async fn fetch(&self, id: &ComponentId) -> Result<ComponentMetadata, FetchFailure>;

    /// Every published version of a module, in any order.
    async fn list_versions(&self, module: &ModuleIdentifier) -> Result<Vec<String>, FetchFailure>;
}

/// Optional per-module pinned version, used as a forced candidate.
pub trait LockConstraintProvider: Send + Sync {
    fn locked_version(&self, module: &ModuleIdentifier) -> Option<String>;
}

impl LockConstraintProvider for Lockfile {
    fn locked_version(&self, module: &ModuleIdentifier) -> Option<String> {
        Lockfile::locked_version(self, module).map(str::to_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use depsolve_core::lockfile::LockedModule;

    #[test]
    fn lockfile_pins_modules() {
        let lock = Lockfile::generate(vec![LockedModule {
            group: "com.acme".into(),
            name: "lib".into(),
            version: "1.5".into(),
        }]);
        let provider: &dyn LockConstraintProvider = &lock;
        assert_eq!(
            provider.locked_version(&ModuleIdentifier::new("com.acme", "lib")),
            Some("1.5".to_string())
        );
        assert_eq!(provider.locked_version(&ModuleIdentifier::new("com.acme", "other")), None);
    }

    #[test]
    fn fetch_failure_display() {
        assert_eq!(
            FetchFailure::NotFound("com.acme:lib:9.9".into()).to_string(),
            "com.acme:lib:9.9 was not found"
        );
    }
}
