//! File watcher for automatic task re-running.
//!
//! Watches the source tree and re-runs the tasks whose source globs match
//! the changed files. Failures are reported and notified, never fatal to
//! the session.

use anyhow::Result;
use colored::Colorize;
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver};
use std::time::{Duration, Instant};

use crate::graph::tasks_matching_file;
use crate::runner::Runner;

const DEBOUNCE_MS: u128 = 300;
const EXCLUDED_DIRS: &[&str] = &["target", "node_modules", "dist", ".git"];

pub struct PipelineWatcher {
    runner: Runner,
    source_root: PathBuf,
    task_filter: Option<String>,
}

impl PipelineWatcher {
    pub fn new(runner: Runner, source_root: PathBuf, task_filter: Option<String>) -> Self {
        Self {
            runner,
            source_root,
            task_filter,
        }
    }

    pub fn start(&self) -> Result<()> {
        let rt = tokio::runtime::Runtime::new()?;

        // Initial build so the watch session starts from a complete tree.
        let initial = self.task_filter.as_deref().unwrap_or("build");
        if let Err(e) = rt.block_on(self.runner.run(initial)) {
            eprintln!("{} {}", "✗".red(), e);
        }

        let (tx, rx) = mpsc::channel();

        let mut watcher = RecommendedWatcher::new(
            move |res: std::result::Result<Event, notify::Error>| {
                if let Ok(event) = res {
                    let _ = tx.send(event);
                }
            },
            notify::Config::default(),
        )?;

        watcher.watch(&self.source_root, RecursiveMode::Recursive)?;

        println!(
            "\n{} {} {}\n",
            "👀".cyan(),
            "Watching for changes in".bold(),
            self.source_root.display()
        );

        if let Some(ref filter) = self.task_filter {
            println!("   Re-running task: {}\n", filter.cyan());
        }

        println!("{}", "Press Ctrl+C to stop\n".dimmed());

        self.event_loop(&rt, rx)
    }

    fn event_loop(&self, rt: &tokio::runtime::Runtime, rx: Receiver<Event>) -> Result<()> {
        let mut last_run = Instant::now() - Duration::from_secs(10);

        while let Ok(event) = rx.recv() {
            // Debounce
            if last_run.elapsed().as_millis() < DEBOUNCE_MS {
                continue;
            }

            let changed_files: Vec<PathBuf> = event
                .paths
                .iter()
                .filter(|p| !is_excluded(p))
                .cloned()
                .collect();

            if changed_files.is_empty() {
                continue;
            }

            let tasks = self.tasks_for(&changed_files);
            if tasks.is_empty() {
                continue;
            }

            last_run = Instant::now();

            println!(
                "\n{} {} {}",
                "↻".yellow(),
                "Files changed:".bold(),
                changed_files
                    .iter()
                    .map(|p| display_relative(p, &self.source_root))
                    .collect::<Vec<_>>()
                    .join(", ")
                    .dimmed()
            );

            for task in &tasks {
                if let Err(e) = rt.block_on(self.runner.run(task)) {
                    eprintln!("{} {}", "✗".red(), e);
                }
            }

            println!("\n{}", "Watching for changes...".dimmed());
        }

        Ok(())
    }

    /// Map changed files to the tasks whose source globs match them,
    /// restricted to the filtered task when one was given.
    fn tasks_for(&self, changed_files: &[PathBuf]) -> Vec<String> {
        let mut tasks: Vec<String> = Vec::new();
        for path in changed_files {
            for task in tasks_matching_file(self.runner.graph(), path) {
                if !tasks.contains(&task) {
                    tasks.push(task);
                }
            }
        }

        if let Some(ref filter) = self.task_filter {
            tasks.retain(|t| t == filter);
        }

        tasks
    }
}

fn is_excluded(path: &Path) -> bool {
    path.components().any(|c| {
        EXCLUDED_DIRS
            .iter()
            .any(|excluded| c.as_os_str() == *excluded)
    })
}

fn display_relative(path: &Path, root: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_excluded() {
        assert!(is_excluded(Path::new("/p/node_modules/x/index.js")));
        assert!(is_excluded(Path::new("/p/dist/images/a.png")));
        assert!(!is_excluded(Path::new("/p/src/_images/a.png")));
    }

    #[test]
    fn test_display_relative() {
        assert_eq!(
            display_relative(Path::new("/p/src/a.scss"), Path::new("/p/src")),
            "a.scss"
        );
        assert_eq!(
            display_relative(Path::new("/q/other.js"), Path::new("/p/src")),
            "/q/other.js"
        );
    }
}
