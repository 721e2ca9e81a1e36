//! In-memory representation of a file flowing through a pipeline.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tokio::fs;

use crate::error::{Error, Result};

/// A single file moving through a task pipeline. Created per matched file
/// per task invocation, mutated in place by steps, consumed by the sink
/// write.
#[derive(Debug, Clone)]
pub struct FileEntry {
    /// Path relative to the directory the entry was globbed under.
    pub rel_path: PathBuf,
    pub contents: Vec<u8>,
    /// Directory the entry was read from.
    pub base: PathBuf,
    /// Source modification time, when the filesystem reports one.
    pub mtime: Option<SystemTime>,
}

impl FileEntry {
    pub async fn read(base: &Path, rel_path: &Path) -> Result<Self> {
        let full = base.join(rel_path);
        let contents = fs::read(&full).await.map_err(|source| Error::Io {
            path: full.clone(),
            source,
        })?;
        let mtime = fs::metadata(&full)
            .await
            .ok()
            .and_then(|meta| meta.modified().ok());

        Ok(Self {
            rel_path: rel_path.to_path_buf(),
            contents,
            base: base.to_path_buf(),
            mtime,
        })
    }

    /// Destination path under `dest_root`, preserving relative structure.
    pub fn dest_path(&self, dest_root: &Path) -> PathBuf {
        dest_root.join(&self.rel_path)
    }

    pub fn set_extension(&mut self, extension: &str) {
        self.rel_path.set_extension(extension);
    }
}
