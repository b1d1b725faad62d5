//! Handler for `depsolve path`.

use miette::Result;

use crate::session::Session;

pub async fn exec(session: &Session, module: &str) -> Result<()> {
    let graph = session.resolve(session.request(true)?, false).await?;
    match graph.find_path(module) {
        Some(path) => {
            println!("Path to {module}:");
            for (i, node) in path.iter().enumerate() {
                let indent = "  ".repeat(i);
                println!("{indent}{node}");
            }
        }
        None => println!("Dependency '{module}' not found in the graph."),
    }
    Ok(())
}
