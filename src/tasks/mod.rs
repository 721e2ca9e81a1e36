//! The standard asset-pipeline task set.
//!
//! Each submodule registers the tasks for one asset family; `register_all`
//! wires the whole set plus the aggregate `build` task.

mod images;
mod lint;
mod service_worker;
mod styles;

use crate::config::Entries;
use crate::error::Result;
use crate::graph::{TaskGraph, TaskSpec};
use crate::paths::PathResolver;
use crate::runner::RuntimeFlags;

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "gif", "svg", "png"];

/// Everything task registration needs.
pub struct BuildContext {
    pub resolver: PathResolver,
    pub entries: Entries,
    pub flags: RuntimeFlags,
}

pub fn register_all(graph: &mut TaskGraph, cx: &BuildContext) -> Result<()> {
    images::register(graph, cx)?;
    lint::register(graph, cx)?;
    styles::register(graph, cx)?;
    service_worker::register(graph, cx)?;

    graph.register(
        TaskSpec::new("build")
            .dep("images")
            .dep("styles")
            .dep("sw:copy"),
    )?;

    Ok(())
}
