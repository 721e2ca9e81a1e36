//! Built-in transform steps: change filtering and path rewriting.

use async_trait::async_trait;
use std::path::PathBuf;
use tokio::fs;

use super::{StepContext, TransformStep};
use crate::entry::FileEntry;
use crate::error::Result;

/// Drops entries whose destination copy is at least as new as the source.
/// Running a task twice with unchanged sources writes nothing the second
/// time.
pub struct ChangedFilter;

#[async_trait]
impl TransformStep for ChangedFilter {
    fn name(&self) -> &str {
        "changed"
    }

    async fn apply(&self, entries: Vec<FileEntry>, cx: &StepContext) -> Result<Vec<FileEntry>> {
        let Some(dest_root) = cx.dest.as_deref() else {
            return Ok(entries);
        };

        let mut kept = Vec::with_capacity(entries.len());
        for entry in entries {
            let dest = entry.dest_path(dest_root);
            let up_to_date = match (fs::metadata(&dest).await, entry.mtime) {
                (Ok(meta), Some(src_mtime)) => meta
                    .modified()
                    .map(|dest_mtime| dest_mtime >= src_mtime)
                    .unwrap_or(false),
                _ => false,
            };
            if !up_to_date {
                kept.push(entry);
            }
        }
        Ok(kept)
    }
}

/// Rewrites entry paths with a caller-supplied mapping. Entry order is
/// preserved.
pub struct Rename {
    label: &'static str,
    map: Box<dyn Fn(&mut PathBuf) + Send + Sync>,
}

impl Rename {
    pub fn new(
        label: &'static str,
        map: impl Fn(&mut PathBuf) + Send + Sync + 'static,
    ) -> Box<dyn TransformStep> {
        Box::new(Self {
            label,
            map: Box::new(map),
        })
    }

    /// Removes every path component equal to `component`, flattening that
    /// level away. `_scripts/sw.js` -> `sw.js`.
    pub fn strip_component(component: &'static str) -> Box<dyn TransformStep> {
        Rename::new("strip-component", move |path| {
            let parts: Vec<PathBuf> = path
                .components()
                .filter(|c| c.as_os_str() != component)
                .map(|c| PathBuf::from(c.as_os_str()))
                .collect();
            *path = parts.into_iter().collect();
        })
    }

    /// Replaces the file stem, keeping directory and extension.
    /// `index.js` -> `cache-polyfill.js`.
    pub fn basename(stem: &'static str) -> Box<dyn TransformStep> {
        Rename::new("basename", move |path| {
            let extension = path.extension().map(|e| e.to_os_string());
            path.set_file_name(stem);
            if let Some(ext) = extension {
                path.set_extension(ext);
            }
        })
    }
}

#[async_trait]
impl TransformStep for Rename {
    fn name(&self) -> &str {
        self.label
    }

    async fn apply(&self, mut entries: Vec<FileEntry>, _cx: &StepContext) -> Result<Vec<FileEntry>> {
        for entry in &mut entries {
            (self.map)(&mut entry.rel_path);
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn entry(rel: &str) -> FileEntry {
        FileEntry {
            rel_path: rel.into(),
            contents: b"data".to_vec(),
            base: "src".into(),
            mtime: Some(std::time::SystemTime::now()),
        }
    }

    #[tokio::test]
    async fn test_strip_component() {
        let step = Rename::strip_component("_scripts");
        let cx = StepContext {
            dest: None,
            task: "sw:copy".to_string(),
        };
        let out = step
            .apply(vec![entry("_scripts/sw.js"), entry("other/app.js")], &cx)
            .await
            .unwrap();
        assert_eq!(out[0].rel_path, PathBuf::from("sw.js"));
        assert_eq!(out[1].rel_path, PathBuf::from("other/app.js"));
    }

    #[tokio::test]
    async fn test_basename_keeps_extension() {
        let step = Rename::basename("cache-polyfill");
        let cx = StepContext {
            dest: None,
            task: "polyfill:copy".to_string(),
        };
        let out = step.apply(vec![entry("index.js")], &cx).await.unwrap();
        assert_eq!(out[0].rel_path, PathBuf::from("cache-polyfill.js"));
    }

    #[tokio::test]
    async fn test_changed_filter_drops_up_to_date_entries() {
        let dir = tempfile::tempdir().unwrap();
        let dest_root = dir.path().join("dist");
        std::fs::create_dir_all(&dest_root).unwrap();

        // a.txt already exists at the destination, written after the
        // source mtime; b.txt does not.
        let src_mtime = std::time::SystemTime::now() - std::time::Duration::from_secs(60);
        std::fs::write(dest_root.join("a.txt"), b"old").unwrap();

        let mut stale = entry("a.txt");
        stale.mtime = Some(src_mtime);
        let fresh = entry("b.txt");

        let cx = StepContext {
            dest: Some(dest_root),
            task: "images".to_string(),
        };
        let out = ChangedFilter
            .apply(vec![stale, fresh], &cx)
            .await
            .unwrap();

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].rel_path, Path::new("b.txt"));
    }

    #[tokio::test]
    async fn test_changed_filter_without_dest_keeps_all() {
        let cx = StepContext {
            dest: None,
            task: "lint".to_string(),
        };
        let out = ChangedFilter
            .apply(vec![entry("a.txt")], &cx)
            .await
            .unwrap();
        assert_eq!(out.len(), 1);
    }
}
