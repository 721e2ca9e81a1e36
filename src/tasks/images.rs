//! Image tasks: alternate-format conversion plus production-gated
//! compression.

use crate::collaborators::{ConvertStep, ExtensionConverter, OptimizeStep, PassthroughOptimizer};
use crate::error::Result;
use crate::graph::{TaskGraph, TaskSpec};
use crate::paths::Role;
use crate::pipeline::{ChangedFilter, ConditionalGate};

use super::{BuildContext, IMAGE_EXTENSIONS};

pub fn register(graph: &mut TaskGraph, cx: &BuildContext) -> Result<()> {
    let source = cx.resolver.source_dir(Role::Images)?;
    let dest = cx.resolver.resolve(Role::Images)?;
    let patterns = cx.resolver.glob_for(Role::Images, IMAGE_EXTENSIONS)?;

    // Alternate-format siblings are produced unconditionally, before the
    // main image task runs.
    graph.register(
        TaskSpec::new("images:convert")
            .base(source.clone())
            .sources(patterns.clone())
            .dest(dest.clone())
            .step(ConvertStep::new(Box::new(ExtensionConverter::new("webp")))),
    )?;

    graph.register(
        TaskSpec::new("images")
            .dep("images:convert")
            .base(source)
            .sources(patterns)
            .dest(dest)
            .step(Box::new(ChangedFilter))
            .step(ConditionalGate::when(
                cx.flags.production,
                OptimizeStep::new(Box::new(PassthroughOptimizer)),
            )),
    )?;

    Ok(())
}
