use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Global user configuration loaded from `~/.depsolve/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlobalConfig {
    #[serde(default)]
    pub resolver: ResolverConfig,

    #[serde(default)]
    pub output: OutputConfig,
}

/// Resolution engine settings from `[resolver]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Upper bound on metadata fetches in flight at once.
    #[serde(default = "default_max_concurrent_fetches", rename = "max-concurrent-fetches")]
    pub max_concurrent_fetches: usize,
    /// Treat any disagreement between selectors of one module as a failure.
    #[serde(default, rename = "fail-on-version-conflict")]
    pub fail_on_version_conflict: bool,
    /// Treat any dynamic selector left in the final graph as a failure.
    #[serde(default, rename = "fail-on-dynamic-versions")]
    pub fail_on_dynamic_versions: bool,
    /// How many times one module may change its selected version before it
    /// stops moving to lower versions.
    #[serde(default = "default_max_selection_changes", rename = "max-selection-changes")]
    pub max_selection_changes: u32,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            max_concurrent_fetches: default_max_concurrent_fetches(),
            fail_on_version_conflict: false,
            fail_on_dynamic_versions: false,
            max_selection_changes: default_max_selection_changes(),
        }
    }
}

fn default_max_concurrent_fetches() -> usize {
    8
}

fn default_max_selection_changes() -> u32 {
    64
}

/// Per-manifest overrides of [`ResolverConfig`]; unset fields keep the
/// global value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ResolverOverrides {
    pub max_concurrent_fetches: Option<usize>,
    pub fail_on_version_conflict: Option<bool>,
    pub fail_on_dynamic_versions: Option<bool>,
    pub max_selection_changes: Option<u32>,
}

impl ResolverOverrides {
    pub fn apply(&self, base: &ResolverConfig) -> ResolverConfig {
        ResolverConfig {
            max_concurrent_fetches: self
                .max_concurrent_fetches
                .unwrap_or(base.max_concurrent_fetches)
                .max(1),
            fail_on_version_conflict: self
                .fail_on_version_conflict
                .unwrap_or(base.fail_on_version_conflict),
            fail_on_dynamic_versions: self
                .fail_on_dynamic_versions
                .unwrap_or(base.fail_on_dynamic_versions),
            max_selection_changes: self
                .max_selection_changes
                .unwrap_or(base.max_selection_changes),
        }
    }
}

/// Output settings from `[output]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub format: OutputFormat,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: OutputFormat::Tree,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Tree,
    Json,
}

impl GlobalConfig {
    /// Load the global configuration from `~/.depsolve/config.toml`, or return defaults if the file doesn't exist.
    pub fn load() -> miette::Result<Self> {
        Self::load_from(&Self::default_path())
    }

    /// Load from an explicit path, or return defaults if the file doesn't exist.
    pub fn load_from(path: &Path) -> miette::Result<Self> {
        if path.is_file() {
            let content = std::fs::read_to_string(path).map_err(|e| {
                depsolve_util::errors::DepsolveError::Config {
                    message: format!("Failed to read global config: {e}"),
                }
            })?;
            toml::from_str(&content).map_err(|e| {
                depsolve_util::errors::DepsolveError::Config {
                    message: format!("Failed to parse global config: {e}"),
                }
                .into()
            })
        } else {
            tracing::debug!("no global config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Returns the default path to the global config file.
    pub fn default_path() -> PathBuf {
        dirs_path().join("config.toml")
    }
}

/// Returns the depsolve data directory: `$DEPSOLVE_HOME`, or `~/.depsolve/`.
pub fn dirs_path() -> PathBuf {
    if let Ok(dir) = std::env::var("DEPSOLVE_HOME") {
        return PathBuf::from(dir);
    }
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_else(|_| ".".to_string());
    Path::new(&home).join(".depsolve")
}
