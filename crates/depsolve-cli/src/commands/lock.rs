//! Handler for `depsolve lock`.

use miette::Result;

use depsolve_core::lockfile::{LockedModule, Lockfile};

use crate::session::Session;

/// Resolve without the existing lock and record every selected module.
pub async fn exec(session: &Session, verbose: bool) -> Result<()> {
    let graph = session.resolve(session.request(false)?, false).await?;

    let locked: Vec<LockedModule> = graph
        .components()
        .into_iter()
        .filter(|c| !c.is_project())
        .map(|c| LockedModule {
            group: c.module.group().to_string(),
            name: c.module.name().to_string(),
            version: c.version.clone(),
        })
        .collect();
    let lockfile = Lockfile::generate(locked);
    lockfile.write_to(&session.lockfile_path)?;

    if verbose {
        for module in &lockfile.locked {
            eprintln!("  {}:{}:{}", module.group, module.name, module.version);
        }
    }
    eprintln!(
        "Locked {} modules to {}",
        lockfile.locked.len(),
        session.lockfile_path.display()
    );
    Ok(())
}
