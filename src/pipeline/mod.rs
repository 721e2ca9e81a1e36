//! Transform pipeline model.
//!
//! A task pipes its file entries through an ordered list of steps. Steps
//! mutate, rename, or drop entries; they must not reorder them unless the
//! transform's semantics require it.

mod steps;

pub use steps::{ChangedFilter, Rename};

use async_trait::async_trait;
use std::path::PathBuf;

use crate::entry::FileEntry;
use crate::error::Result;

/// Read-only state shared by every step invocation within one task run.
#[derive(Debug, Clone)]
pub struct StepContext {
    /// Destination root the task will write to, when it has one.
    pub dest: Option<PathBuf>,
    /// Name of the owning task, for error labeling.
    pub task: String,
}

#[async_trait]
pub trait TransformStep: Send + Sync {
    /// Short name used in step-failure reporting.
    fn name(&self) -> &str;

    async fn apply(&self, entries: Vec<FileEntry>, cx: &StepContext) -> Result<Vec<FileEntry>>;
}

/// Wraps a step so it runs only when the guard was set at construction.
/// Guard false is an identity pass-through: the entry stream is returned
/// untouched.
pub struct ConditionalGate {
    guard: bool,
    inner: Box<dyn TransformStep>,
}

impl ConditionalGate {
    pub fn when(guard: bool, inner: Box<dyn TransformStep>) -> Box<dyn TransformStep> {
        Box::new(Self { guard, inner })
    }
}

#[async_trait]
impl TransformStep for ConditionalGate {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn apply(&self, entries: Vec<FileEntry>, cx: &StepContext) -> Result<Vec<FileEntry>> {
        if self.guard {
            self.inner.apply(entries, cx).await
        } else {
            Ok(entries)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    struct Uppercase;

    #[async_trait]
    impl TransformStep for Uppercase {
        fn name(&self) -> &str {
            "uppercase"
        }

        async fn apply(
            &self,
            mut entries: Vec<FileEntry>,
            _cx: &StepContext,
        ) -> Result<Vec<FileEntry>> {
            for entry in &mut entries {
                entry.contents.make_ascii_uppercase();
            }
            Ok(entries)
        }
    }

    struct Failing;

    #[async_trait]
    impl TransformStep for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        async fn apply(
            &self,
            _entries: Vec<FileEntry>,
            _cx: &StepContext,
        ) -> Result<Vec<FileEntry>> {
            Err(Error::Engine("boom".to_string()))
        }
    }

    fn entry(rel: &str, contents: &[u8]) -> FileEntry {
        FileEntry {
            rel_path: rel.into(),
            contents: contents.to_vec(),
            base: "src".into(),
            mtime: None,
        }
    }

    fn cx() -> StepContext {
        StepContext {
            dest: None,
            task: "test".to_string(),
        }
    }

    #[tokio::test]
    async fn test_gate_open_delegates() {
        let gate = ConditionalGate::when(true, Box::new(Uppercase));
        let out = gate.apply(vec![entry("a.txt", b"abc")], &cx()).await.unwrap();
        assert_eq!(out[0].contents, b"ABC");
    }

    #[tokio::test]
    async fn test_gate_closed_is_identity() {
        let gate = ConditionalGate::when(false, Box::new(Uppercase));
        let input = vec![entry("a.txt", b"abc"), entry("b.txt", b"def")];
        let out = gate.apply(input, &cx()).await.unwrap();

        assert_eq!(out.len(), 2);
        assert_eq!(out[0].contents, b"abc");
        assert_eq!(out[1].contents, b"def");
        assert_eq!(out[0].rel_path, PathBuf::from("a.txt"));
    }

    #[tokio::test]
    async fn test_gate_closed_suppresses_inner_failure() {
        let gate = ConditionalGate::when(false, Box::new(Failing));
        let out = gate.apply(vec![entry("a.txt", b"abc")], &cx()).await;
        assert!(out.is_ok());
    }
}
