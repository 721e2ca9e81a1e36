//! Service-worker copy tasks: the worker script flattens to the
//! destination root, and the cache polyfill comes along from its
//! dependency bundle under a stable name.

use crate::error::Result;
use crate::graph::{TaskGraph, TaskSpec};
use crate::paths::Role;
use crate::pipeline::Rename;

use super::BuildContext;

const POLYFILL_PACKAGE: &str = "serviceworker-cache-polyfill";

pub fn register(graph: &mut TaskGraph, cx: &BuildContext) -> Result<()> {
    let source_root = cx.resolver.source_dir(Role::Source)?;
    let node_modules = cx.resolver.source_dir(Role::NodeModules)?;
    let dest_root = cx.resolver.dest_root().to_path_buf();

    graph.register(
        TaskSpec::new("polyfill:copy")
            .base(node_modules.join(POLYFILL_PACKAGE))
            .source(format!(
                "{}/{}/index.js",
                node_modules.display(),
                POLYFILL_PACKAGE
            ))
            .dest(dest_root.clone())
            .step(Rename::basename("cache-polyfill")),
    )?;

    graph.register(
        TaskSpec::new("sw:copy")
            .dep("polyfill:copy")
            .base(source_root.clone())
            .source(format!("{}/**/sw.js", source_root.display()))
            .source(format!("!{}/**/*.md", source_root.display()))
            .source(format!("!{}/**/*.txt", source_root.display()))
            .source(format!("!{}/**/*.ico", source_root.display()))
            .dest(dest_root)
            .step(Rename::strip_component("_scripts")),
    )?;

    Ok(())
}
