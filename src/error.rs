//! Error taxonomy for the pipeline.
//!
//! Configuration and graph errors abort before any I/O; step errors abort
//! the owning task only. Report errors carry lint findings and are
//! downgraded to notifications during watch sessions.

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// A single lint or style-check finding.
#[derive(Debug, Clone)]
pub struct Finding {
    pub file: PathBuf,
    pub line: usize,
    pub message: String,
}

impl std::fmt::Display for Finding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{} {}", self.file.display(), self.line, self.message)
    }
}

#[derive(Debug, Error)]
pub enum Error {
    /// Unresolvable role or malformed configuration.
    #[error("configuration error: {0}")]
    Config(String),

    #[error("task '{0}' is not registered")]
    TaskNotFound(String),

    #[error("dependency cycle involving task '{0}'")]
    Cycle(String),

    /// A transform step failed; the owning task aborts, siblings keep going.
    #[error("step '{step}' failed in task '{task}': {message}")]
    Step {
        task: String,
        step: String,
        message: String,
    },

    /// Lint or style-check findings. Fatal in batch runs, reported-only in
    /// watch sessions.
    #[error("{} finding(s) reported by task '{task}'", findings.len())]
    Report { task: String, findings: Vec<Finding> },

    /// Failure inside an external engine, before step labeling is applied.
    #[error("{0}")]
    Engine(String),

    #[error("io error on {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    pub fn is_report(&self) -> bool {
        matches!(self, Error::Report { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_display_counts_findings() {
        let err = Error::Report {
            task: "scripts:lint".to_string(),
            findings: vec![
                Finding {
                    file: PathBuf::from("app.js"),
                    line: 3,
                    message: "trailing whitespace".to_string(),
                },
                Finding {
                    file: PathBuf::from("app.js"),
                    line: 7,
                    message: "tab indentation".to_string(),
                },
            ],
        };

        assert!(err.is_report());
        assert_eq!(
            err.to_string(),
            "2 finding(s) reported by task 'scripts:lint'"
        );
    }

    #[test]
    fn test_step_display() {
        let err = Error::Step {
            task: "styles".to_string(),
            step: "compile".to_string(),
            message: "unresolved import 'colors'".to_string(),
        };
        assert!(!err.is_report());
        assert!(err.to_string().contains("styles"));
        assert!(err.to_string().contains("compile"));
    }
}
