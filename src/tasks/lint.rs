//! Lint tasks: script and style checks, aggregated behind a sequential
//! `lint` task so reports always arrive in the same order.

use crate::collaborators::{script_lint, style_lint, LintStep};
use crate::error::Result;
use crate::graph::{TaskGraph, TaskSpec};
use crate::paths::Role;

use super::BuildContext;

pub fn register(graph: &mut TaskGraph, cx: &BuildContext) -> Result<()> {
    let scripts = cx.resolver.source_dir(Role::Scripts)?;
    let styles = cx.resolver.source_dir(Role::Styles)?;
    let modules = cx.resolver.source_dir(Role::Modules)?;
    let source_root = cx.resolver.source_dir(Role::Source)?;

    // Report-only sinks: no dest, nothing is written.
    graph.register(
        TaskSpec::new("scripts:lint")
            .base(source_root.clone())
            .source(format!("{}/**/*.js", scripts.display()))
            .source(format!("{}/**/*.js", modules.display()))
            .step(LintStep::new(script_lint())),
    )?;

    graph.register(
        TaskSpec::new("styles:lint")
            .base(source_root)
            .source(format!("{}/**/*.scss", styles.display()))
            .source(format!("{}/**/*.scss", modules.display()))
            .step(LintStep::new(style_lint())),
    )?;

    graph.register(
        TaskSpec::new("lint")
            .dep("scripts:lint")
            .dep("styles:lint")
            .sequential(),
    )?;

    Ok(())
}
