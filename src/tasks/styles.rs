//! Stylesheet task: compile the entry stylesheet with include resolution,
//! minify under the production gate.

use crate::collaborators::{CompileStep, IncludeResolvingCompiler, MinifyStep, PassthroughMinifier};
use crate::error::Result;
use crate::graph::{TaskGraph, TaskSpec};
use crate::paths::Role;
use crate::pipeline::ConditionalGate;

use super::BuildContext;

pub fn register(graph: &mut TaskGraph, cx: &BuildContext) -> Result<()> {
    let styles_src = cx.resolver.source_dir(Role::Styles)?;
    let dest = cx.resolver.resolve(Role::Styles)?;
    let include_paths = vec![styles_src.clone(), cx.resolver.source_dir(Role::Modules)?];

    graph.register(
        TaskSpec::new("styles")
            .base(styles_src.clone())
            .source(format!("{}/{}", styles_src.display(), cx.entries.css))
            .dest(dest)
            .step(CompileStep::new(Box::new(IncludeResolvingCompiler::new(
                include_paths,
            ))))
            .step(ConditionalGate::when(
                cx.flags.production,
                MinifyStep::new(Box::new(PassthroughMinifier)),
            )),
    )?;

    Ok(())
}
