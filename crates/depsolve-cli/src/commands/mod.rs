//! Command dispatch and handler modules.

mod lock;
mod path;
mod resolve;
mod why;

use miette::Result;

use crate::cli::{Cli, Command};
use crate::session::Session;

/// Route a parsed CLI invocation to the appropriate command handler.
pub async fn dispatch(cli: Cli) -> Result<()> {
    let session = Session::load(&cli.manifest, cli.repository.as_deref())?;
    match cli.command {
        Command::Resolve {
            format,
            depth,
            conflicts,
            build_deps,
            no_lock,
        } => {
            let opts = resolve::ResolveOptions {
                format: format.unwrap_or_else(|| session.output.into()),
                depth,
                conflicts,
                build_deps,
                use_lock: !no_lock,
            };
            resolve::exec(&session, &opts).await
        }
        Command::Why { module } => why::exec(&session, &module).await,
        Command::Path { module } => path::exec(&session, &module).await,
        Command::Lock => lock::exec(&session, cli.verbose).await,
    }
}
