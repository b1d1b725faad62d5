//! CLI argument definitions for depsolve.
//!
//! Uses `clap` derive macros to define the command surface. Each command
//! corresponds to a handler in the [`super::commands`] module.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use depsolve_core::config::OutputFormat;

#[derive(Parser, Debug)]
#[command(
    name = "depsolve",
    version,
    about = "Resolve dependency graphs of modules and local projects",
    long_about = "depsolve resolves the transitive dependency graph described by a manifest \
                  against a repository of component metadata, applying version conflict \
                  resolution, exclusions, substitutions and capability rules."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Path to the resolution manifest
    #[arg(short, long, global = true, default_value = "depsolve.toml")]
    pub manifest: PathBuf,

    /// Path to the repository description [default: repository.toml next to the manifest]
    #[arg(short, long, global = true, env = "DEPSOLVE_REPOSITORY")]
    pub repository: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Resolve the dependency graph and print it
    Resolve {
        /// Output format [default: from ~/.depsolve/config.toml, else tree]
        #[arg(short, long, value_enum)]
        format: Option<Format>,
        /// Maximum tree depth
        #[arg(long)]
        depth: Option<usize>,
        /// Show version conflicts instead of the graph
        #[arg(long)]
        conflicts: bool,
        /// Only resolve what is needed to list the local projects to build
        #[arg(long)]
        build_deps: bool,
        /// Ignore the lockfile
        #[arg(long)]
        no_lock: bool,
    },

    /// Explain why a module is in the graph
    Why {
        /// Module as `group:name`, or just `name`
        module: String,
    },

    /// Print the dependency path from the root to a module
    Path {
        /// Module as `group:name`, or just `name`
        module: String,
    },

    /// Resolve from scratch and write the lockfile
    Lock,
}

/// Output format for `depsolve resolve`.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Format {
    Tree,
    Json,
}

impl From<OutputFormat> for Format {
    fn from(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Tree => Self::Tree,
            OutputFormat::Json => Self::Json,
        }
    }
}

/// Parse command-line arguments.
pub fn parse() -> Cli {
    Cli::parse()
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn global_options_follow_subcommands() {
        let cli = Cli::try_parse_from(["depsolve", "resolve", "--manifest", "app/depsolve.toml", "-f", "json"])
            .unwrap();
        assert_eq!(cli.manifest, PathBuf::from("app/depsolve.toml"));
        let Command::Resolve { format, .. } = cli.command else {
            panic!("expected resolve");
        };
        assert_eq!(format, Some(Format::Json));
    }
}
