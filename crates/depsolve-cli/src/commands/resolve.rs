//! Handler for `depsolve resolve`.

use miette::Result;

use depsolve_util::errors::DepsolveError;

use crate::cli::Format;
use crate::session::Session;

/// Options for `depsolve resolve`.
pub struct ResolveOptions {
    pub format: Format,
    /// Maximum tree depth to display.
    pub depth: Option<usize>,
    /// Show version conflicts.
    pub conflicts: bool,
    /// Stop expanding at external modules.
    pub build_deps: bool,
    pub use_lock: bool,
}

pub async fn exec(session: &Session, opts: &ResolveOptions) -> Result<()> {
    let request = session.request(opts.use_lock)?;
    let graph = session.resolve(request, opts.build_deps).await?;

    if opts.conflicts {
        println!("{}", graph.conflicts.to_string().trim_end());
        return Ok(());
    }

    match opts.format {
        Format::Json => {
            let json = graph.to_json().map_err(|e| DepsolveError::Generic {
                message: format!("Failed to serialize graph: {e}"),
            })?;
            println!("{json}");
        }
        Format::Tree if opts.build_deps => {
            let projects = graph.build_dependencies();
            if projects.is_empty() {
                println!("No local projects to build.");
            }
            for project in projects {
                println!("{project}");
            }
        }
        Format::Tree => print!("{}", graph.print_tree(opts.depth)),
    }
    Ok(())
}
