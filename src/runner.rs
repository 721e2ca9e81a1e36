//! Task execution: prerequisite resolution, per-level concurrency, sinks.
//!
//! Within one task, steps apply in strict declared order. Across tasks,
//! ordering is guaranteed only via declared prerequisites or an explicit
//! sequence; independent tasks in a level run concurrently under a worker
//! cap. A failed task aborts the rest of the run; siblings already in
//! flight finish, they are not cancelled.

use colored::Colorize;
use futures::future::BoxFuture;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::fs;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::entry::FileEntry;
use crate::error::{Error, Result};
use crate::graph::{execution_levels, topological_sort, TaskGraph, TaskSpec};
use crate::notifications::Notifier;
use crate::pipeline::StepContext;

pub const DEFAULT_WORKERS: usize = 4;

/// Process-wide build switches, set once at startup and handed to the
/// runner explicitly. Gates and failure policy read this injected value,
/// never ambient global state.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuntimeFlags {
    /// Enables size-oriented transforms at the cost of build time.
    pub production: bool,
    /// Watch sessions downgrade failures to notifications and keep going.
    pub lenient: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Ok,
    /// Findings were reported and tolerated (lenient mode).
    Reported,
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct TaskResult {
    pub name: String,
    pub outcome: TaskOutcome,
    pub duration_ms: u128,
    pub files_written: usize,
}

impl TaskResult {
    pub fn success(&self) -> bool {
        !matches!(self.outcome, TaskOutcome::Failed(_))
    }
}

pub struct Runner {
    graph: Arc<TaskGraph>,
    flags: RuntimeFlags,
    notifier: Arc<Notifier>,
    workers: usize,
}

impl Runner {
    /// Validates the registry (prerequisite references, acyclicity) before
    /// anything touches the filesystem.
    pub fn new(graph: TaskGraph, flags: RuntimeFlags, notifier: Notifier) -> Result<Self> {
        graph.validate()?;
        Ok(Self {
            graph: Arc::new(graph),
            flags,
            notifier: Arc::new(notifier),
            workers: DEFAULT_WORKERS,
        })
    }

    pub fn graph(&self) -> &TaskGraph {
        &self.graph
    }

    /// Run one task and its transitive prerequisites, each at most once.
    pub async fn run(&self, task_name: &str) -> Result<Vec<TaskResult>> {
        let order = topological_sort(&self.graph, &[task_name])?;
        println!(
            "\n{} {} task(s) to run: {}\n",
            "→".blue(),
            order.len(),
            order.join(", ").dimmed()
        );

        let mut done = HashSet::new();
        let results = self.run_with_done(task_name, &mut done).await?;
        self.print_summary(&results);
        Ok(results)
    }

    /// Run the named tasks strictly in the given order, each completing
    /// (with its full prerequisite subgraph) before the next starts. The
    /// at-most-once set is shared across the whole sequence.
    pub async fn run_sequence(&self, names: &[&str]) -> Result<Vec<TaskResult>> {
        for name in names {
            if self.graph.get(name).is_none() {
                return Err(Error::TaskNotFound(name.to_string()));
            }
        }

        let mut done = HashSet::new();
        let mut results = Vec::new();
        for name in names {
            let batch = self.run_with_done(name, &mut done).await?;
            let failed = batch.iter().any(|r| !r.success());
            results.extend(batch);
            if failed {
                println!("{} Stopping due to task failure", "!".yellow());
                break;
            }
        }
        self.print_summary(&results);
        Ok(results)
    }

    fn run_with_done<'a>(
        &'a self,
        task_name: &'a str,
        done: &'a mut HashSet<String>,
    ) -> BoxFuture<'a, Result<Vec<TaskResult>>> {
        Box::pin(async move {
            let spec = self
                .graph
                .get(task_name)
                .ok_or_else(|| Error::TaskNotFound(task_name.to_string()))?;

            if done.contains(task_name) {
                return Ok(Vec::new());
            }

            if spec.sequential {
                return self.run_sequential(spec, done).await;
            }

            let levels = execution_levels(&self.graph, &[task_name])?;
            let semaphore = Arc::new(Semaphore::new(self.workers));
            let mut results = Vec::new();

            for level in levels {
                let pending: Vec<String> =
                    level.into_iter().filter(|t| !done.contains(t)).collect();
                if pending.is_empty() {
                    continue;
                }

                // A sequential member of a level runs inline so its
                // remaining prerequisites keep declared order.
                let mut join_set = JoinSet::new();
                let mut level_results = Vec::new();
                for name in &pending {
                    let inner = self.graph.get(name.as_str());
                    if inner.map(|s| s.sequential).unwrap_or(false) {
                        let batch = self.run_with_done(name.as_str(), done).await?;
                        level_results.extend(batch);
                        continue;
                    }

                    let graph = Arc::clone(&self.graph);
                    let notifier = Arc::clone(&self.notifier);
                    let flags = self.flags;
                    let sem = Arc::clone(&semaphore);
                    let name = name.clone();
                    join_set.spawn(async move {
                        let _permit = sem.acquire().await.expect("Semaphore closed");
                        execute_task(&graph, &name, flags, &notifier).await
                    });
                }

                let mut panicked = false;
                while let Some(joined) = join_set.join_next().await {
                    match joined {
                        Ok(result) => level_results.push(result),
                        Err(e) => {
                            eprintln!("{} Task panicked: {}", "✗".red(), e);
                            panicked = true;
                        }
                    }
                }

                for result in &level_results {
                    done.insert(result.name.clone());
                }
                let failed = panicked || level_results.iter().any(|r| !r.success());
                results.extend(level_results);

                if failed {
                    println!("{} Stopping due to task failure", "!".yellow());
                    break;
                }
            }

            Ok(results)
        })
    }

    /// Prerequisites of a sequential task run one after another in
    /// declared order, then the task itself.
    async fn run_sequential(
        &self,
        spec: &TaskSpec,
        done: &mut HashSet<String>,
    ) -> Result<Vec<TaskResult>> {
        let mut results = Vec::new();

        for dep in &spec.deps {
            let batch = self.run_with_done(dep, done).await?;
            let failed = batch.iter().any(|r| !r.success());
            results.extend(batch);
            if failed {
                println!("{} Stopping due to task failure", "!".yellow());
                return Ok(results);
            }
        }

        let result = execute_task(&self.graph, &spec.name, self.flags, &self.notifier).await;
        done.insert(result.name.clone());
        results.push(result);
        Ok(results)
    }

    fn print_summary(&self, results: &[TaskResult]) {
        let total = results.len();
        if total == 0 {
            return;
        }

        let passed = results.iter().filter(|r| r.success()).count();
        let failed = total - passed;
        let total_time: u128 = results.iter().map(|r| r.duration_ms).sum();
        let written: usize = results.iter().map(|r| r.files_written).sum();

        println!("{}", "─".repeat(50).dimmed());

        if failed == 0 {
            println!(
                "{} All {} task(s) completed, {} file(s) written ({}ms)",
                "✓".green().bold(),
                total,
                written,
                total_time
            );
        } else {
            println!(
                "{} {}/{} task(s) failed ({}ms)",
                "✗".red().bold(),
                failed,
                total,
                total_time
            );

            println!("\n{}", "Failed tasks:".red());
            for result in results.iter().filter(|r| !r.success()) {
                println!("  {} {}", "•".red(), result.name);
            }
        }
    }
}

/// Execute one task's pipeline. Failures land in the outcome; lenient
/// mode downgrades them to notifications so a watch session keeps going.
async fn execute_task(
    graph: &TaskGraph,
    name: &str,
    flags: RuntimeFlags,
    notifier: &Notifier,
) -> TaskResult {
    let started = Instant::now();

    let Some(spec) = graph.get(name) else {
        return TaskResult {
            name: name.to_string(),
            outcome: TaskOutcome::Failed(format!("task '{}' is not registered", name)),
            duration_ms: started.elapsed().as_millis(),
            files_written: 0,
        };
    };

    println!("{} {}", "→".blue(), name.cyan());

    match run_pipeline(spec).await {
        Ok(files_written) => {
            let duration_ms = started.elapsed().as_millis();
            println!(
                "{} {} ({}ms, {} file(s))",
                "✓".green(),
                name.cyan(),
                duration_ms,
                files_written
            );
            TaskResult {
                name: name.to_string(),
                outcome: TaskOutcome::Ok,
                duration_ms,
                files_written,
            }
        }
        Err(err) => {
            if let Error::Report { findings, .. } = &err {
                for finding in findings {
                    eprintln!("  {} {}", "✗".red(), finding);
                }
            }
            eprintln!("{} {} {}", "✗".red(), name.cyan(), err);

            let outcome = if flags.lenient {
                notifier.notify_failure(name, &err);
                if err.is_report() {
                    TaskOutcome::Reported
                } else {
                    TaskOutcome::Failed(err.to_string())
                }
            } else {
                TaskOutcome::Failed(err.to_string())
            };

            TaskResult {
                name: name.to_string(),
                outcome,
                duration_ms: started.elapsed().as_millis(),
                files_written: 0,
            }
        }
    }
}

/// Read matching sources, apply steps in declared order, write surviving
/// entries under the destination root. The first step error aborts the
/// remaining steps; writes already flushed are not rolled back.
async fn run_pipeline(spec: &TaskSpec) -> Result<usize> {
    let mut entries = collect_entries(spec).await?;

    let cx = StepContext {
        dest: spec.dest.clone(),
        task: spec.name.clone(),
    };

    for step in &spec.steps {
        entries = match step.apply(entries, &cx).await {
            Ok(entries) => entries,
            Err(err @ Error::Report { .. }) | Err(err @ Error::Step { .. }) => return Err(err),
            Err(err) => {
                return Err(Error::Step {
                    task: spec.name.clone(),
                    step: step.name().to_string(),
                    message: err.to_string(),
                })
            }
        };
    }

    let Some(dest_root) = &spec.dest else {
        return Ok(0);
    };

    let mut written = 0;
    for entry in &entries {
        let dest = entry.dest_path(dest_root);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).await.map_err(|source| Error::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        fs::write(&dest, &entry.contents)
            .await
            .map_err(|source| Error::Io {
                path: dest.clone(),
                source,
            })?;
        written += 1;
    }

    Ok(written)
}

/// Expand a task's source globs into file entries. `!` patterns exclude;
/// matches are sorted for deterministic step input order.
async fn collect_entries(spec: &TaskSpec) -> Result<Vec<FileEntry>> {
    let mut include: Vec<&str> = Vec::new();
    let mut exclude: Vec<glob::Pattern> = Vec::new();

    for pattern in &spec.sources {
        match pattern.strip_prefix('!') {
            Some(negated) => {
                let compiled = glob::Pattern::new(negated)
                    .map_err(|e| Error::Config(format!("bad glob '{}': {}", negated, e)))?;
                exclude.push(compiled);
            }
            None => include.push(pattern),
        }
    }

    let mut paths: Vec<PathBuf> = Vec::new();
    for pattern in include {
        let matches = glob::glob(pattern)
            .map_err(|e| Error::Config(format!("bad glob '{}': {}", pattern, e)))?;
        for path in matches.filter_map(|p| p.ok()) {
            if !path.is_file() {
                continue;
            }
            if exclude.iter().any(|ex| ex.matches_path(&path)) {
                continue;
            }
            paths.push(path);
        }
    }

    paths.sort();
    paths.dedup();

    let mut entries = Vec::with_capacity(paths.len());
    for path in paths {
        let rel = path
            .strip_prefix(&spec.base)
            .unwrap_or(path.as_path())
            .to_path_buf();
        entries.push(FileEntry::read(&spec.base, &rel).await?);
    }

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Notification;
    use crate::pipeline::TransformStep;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingStep {
        count: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl TransformStep for CountingStep {
        fn name(&self) -> &str {
            "counting"
        }

        async fn apply(
            &self,
            entries: Vec<FileEntry>,
            _cx: &StepContext,
        ) -> Result<Vec<FileEntry>> {
            self.count.fetch_add(1, Ordering::SeqCst);
            Ok(entries)
        }
    }

    struct FailingStep;

    #[async_trait]
    impl TransformStep for FailingStep {
        fn name(&self) -> &str {
            "failing"
        }

        async fn apply(
            &self,
            _entries: Vec<FileEntry>,
            _cx: &StepContext,
        ) -> Result<Vec<FileEntry>> {
            Err(Error::Engine("simulated failure".to_string()))
        }
    }

    fn counting_spec(name: &str, count: &Arc<AtomicUsize>) -> TaskSpec {
        TaskSpec::new(name).step(Box::new(CountingStep {
            count: Arc::clone(count),
        }))
    }

    fn runner(graph: TaskGraph, flags: RuntimeFlags) -> Runner {
        Runner::new(graph, flags, Notifier::new(Notification::default())).unwrap()
    }

    #[tokio::test]
    async fn test_diamond_executes_each_task_once() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut graph = TaskGraph::new();
        graph.register(counting_spec("a", &count)).unwrap();
        graph.register(counting_spec("b", &count).dep("a")).unwrap();
        graph.register(counting_spec("c", &count).dep("a")).unwrap();
        graph
            .register(counting_spec("d", &count).dep("b").dep("c"))
            .unwrap();

        let runner = runner(graph, RuntimeFlags::default());
        let results = runner.run("d").await.unwrap();

        assert_eq!(results.len(), 4);
        assert_eq!(count.load(Ordering::SeqCst), 4);
        assert!(results.iter().all(|r| r.success()));
    }

    #[tokio::test]
    async fn test_cycle_fails_before_running() {
        let mut graph = TaskGraph::new();
        graph.register(TaskSpec::new("a").dep("b")).unwrap();
        graph.register(TaskSpec::new("b").dep("a")).unwrap();

        let result = Runner::new(
            graph,
            RuntimeFlags::default(),
            Notifier::new(Notification::default()),
        );
        assert!(matches!(result, Err(Error::Cycle(_))));
    }

    #[tokio::test]
    async fn test_failed_task_stops_run() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut graph = TaskGraph::new();
        graph
            .register(TaskSpec::new("broken").step(Box::new(FailingStep)))
            .unwrap();
        graph
            .register(counting_spec("after", &count).dep("broken"))
            .unwrap();

        let runner = runner(graph, RuntimeFlags::default());
        let results = runner.run("after").await.unwrap();

        assert_eq!(results.len(), 1);
        assert!(!results[0].success());
        // The dependent never ran.
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_step_error_carries_task_and_step_names() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"x").unwrap();

        let spec = TaskSpec::new("broken")
            .base(dir.path())
            .source(format!("{}/*.txt", dir.path().display()))
            .step(Box::new(FailingStep));

        let err = run_pipeline(&spec).await.unwrap_err();
        match err {
            Error::Step { task, step, .. } => {
                assert_eq!(task, "broken");
                assert_eq!(step, "failing");
            }
            other => panic!("expected step error, got {}", other),
        }
    }

    #[tokio::test]
    async fn test_sequence_shares_at_most_once_set() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut graph = TaskGraph::new();
        graph.register(counting_spec("shared", &count)).unwrap();
        graph
            .register(counting_spec("first", &count).dep("shared"))
            .unwrap();
        graph
            .register(counting_spec("second", &count).dep("shared"))
            .unwrap();

        let runner = runner(graph, RuntimeFlags::default());
        let results = runner.run_sequence(&["first", "second"]).await.unwrap();

        // shared, first, second: three executions, not four.
        assert_eq!(results.len(), 3);
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_sequential_task_runs_deps_in_declared_order() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut graph = TaskGraph::new();
        graph.register(counting_spec("one", &count)).unwrap();
        graph.register(counting_spec("two", &count)).unwrap();
        graph
            .register(TaskSpec::new("both").dep("one").dep("two").sequential())
            .unwrap();

        let runner = runner(graph, RuntimeFlags::default());
        let results = runner.run("both").await.unwrap();

        let names: Vec<&str> = results.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["one", "two", "both"]);
    }

    #[tokio::test]
    async fn test_collect_entries_applies_exclusions() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("keep.js"), b"x").unwrap();
        std::fs::write(dir.path().join("skip.md"), b"x").unwrap();

        let spec = TaskSpec::new("copy")
            .base(dir.path())
            .source(format!("{}/**/*", dir.path().display()))
            .source(format!("!{}/**/*.md", dir.path().display()));

        let entries = collect_entries(&spec).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].rel_path, PathBuf::from("keep.js"));
    }
}
