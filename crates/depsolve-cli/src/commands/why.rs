//! Handler for `depsolve why`.

use miette::Result;

use crate::session::Session;

pub async fn exec(session: &Session, module: &str) -> Result<()> {
    let graph = session.resolve(session.request(true)?, false).await?;
    let tree = graph.print_inverted_tree(module);
    if tree.is_empty() {
        println!("Dependency '{module}' not found in the graph.");
    } else {
        print!("{tree}");
    }
    Ok(())
}
