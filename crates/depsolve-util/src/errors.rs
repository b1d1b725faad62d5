use miette::Diagnostic;
use thiserror::Error;

/// Unified error type for depsolve's loaders and front ends.
///
/// Failures of the resolution algorithm itself are collected as typed
/// resolution failures by the resolver crate; this type covers everything
/// around it.
#[derive(Debug, Error, Diagnostic)]
pub enum DepsolveError {
    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid or malformed resolution manifest (e.g. depsolve.toml).
    #[error("Manifest error: {message}")]
    #[diagnostic(help("Check your depsolve.toml for syntax errors"))]
    Manifest { message: String },

    /// Invalid repository description or metadata.
    #[error("Repository error: {message}")]
    Repository { message: String },

    /// Dependency resolution failed (version conflicts, missing modules, etc.).
    #[error("Dependency resolution failed: {message}")]
    Resolution { message: String },

    /// Global or per-manifest configuration could not be loaded.
    #[error("Configuration error: {message}")]
    #[diagnostic(help("Check ~/.depsolve/config.toml or the [resolver] table of your manifest"))]
    Config { message: String },

    /// Catch-all for miscellaneous errors.
    #[error("{message}")]
    Generic { message: String },
}

/// Convenience alias for `miette::Result<T>`.
pub type DepsolveResult<T> = miette::Result<T>;
