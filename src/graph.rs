//! Task registry and dependency ordering.
//!
//! Tasks register once at startup; the whole registry is cycle-checked
//! before the runner touches the filesystem. Ordering uses topological
//! sort (Kahn's algorithm), with execution levels for running independent
//! tasks concurrently.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::pipeline::TransformStep;

/// A registered pipeline task: globbed sources through ordered steps into
/// a destination root.
pub struct TaskSpec {
    pub name: String,
    pub deps: Vec<String>,
    /// Source glob patterns; `!`-prefixed patterns exclude matches.
    pub sources: Vec<String>,
    /// Directory matched paths are made relative to.
    pub base: PathBuf,
    /// Destination root; `None` for report-only tasks that write nothing.
    pub dest: Option<PathBuf>,
    pub steps: Vec<Box<dyn TransformStep>>,
    /// Run prerequisites strictly in declared order instead of by level,
    /// for sub-checks that must report in a fixed order.
    pub sequential: bool,
}

impl TaskSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            deps: Vec::new(),
            sources: Vec::new(),
            base: PathBuf::new(),
            dest: None,
            steps: Vec::new(),
            sequential: false,
        }
    }

    pub fn dep(mut self, name: impl Into<String>) -> Self {
        self.deps.push(name.into());
        self
    }

    pub fn source(mut self, pattern: impl Into<String>) -> Self {
        self.sources.push(pattern.into());
        self
    }

    pub fn sources(mut self, patterns: impl IntoIterator<Item = String>) -> Self {
        self.sources.extend(patterns);
        self
    }

    pub fn base(mut self, base: impl Into<PathBuf>) -> Self {
        self.base = base.into();
        self
    }

    pub fn dest(mut self, dest: impl Into<PathBuf>) -> Self {
        self.dest = Some(dest.into());
        self
    }

    pub fn step(mut self, step: Box<dyn TransformStep>) -> Self {
        self.steps.push(step);
        self
    }

    pub fn sequential(mut self) -> Self {
        self.sequential = true;
        self
    }
}

#[derive(Default)]
pub struct TaskGraph {
    tasks: HashMap<String, TaskSpec>,
}

impl TaskGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, spec: TaskSpec) -> Result<()> {
        if self.tasks.contains_key(&spec.name) {
            return Err(Error::Config(format!(
                "task '{}' registered twice",
                spec.name
            )));
        }
        self.tasks.insert(spec.name.clone(), spec);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&TaskSpec> {
        self.tasks.get(name)
    }

    pub fn task_names(&self) -> Vec<&String> {
        self.tasks.keys().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &TaskSpec)> {
        self.tasks.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Checks prerequisite references and acyclicity for the whole
    /// registry. Runs at registration time, before any I/O.
    pub fn validate(&self) -> Result<()> {
        for task in self.tasks.values() {
            for dep in &task.deps {
                if !self.tasks.contains_key(dep) {
                    return Err(Error::TaskNotFound(dep.clone()));
                }
            }
        }

        // Kahn over the full graph; leftover nodes sit on a cycle.
        let mut in_degree: HashMap<&str, usize> = HashMap::new();
        let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();

        for name in self.tasks.keys() {
            in_degree.entry(name.as_str()).or_insert(0);
            dependents.entry(name.as_str()).or_default();
        }

        for (name, task) in &self.tasks {
            for dep in &task.deps {
                *in_degree.entry(name.as_str()).or_insert(0) += 1;
                dependents.entry(dep.as_str()).or_default().push(name.as_str());
            }
        }

        let mut queue: VecDeque<&str> = in_degree
            .iter()
            .filter(|(_, &deg)| deg == 0)
            .map(|(&name, _)| name)
            .collect();

        let mut visited = 0;
        while let Some(current) = queue.pop_front() {
            visited += 1;
            if let Some(deps) = dependents.get(current) {
                for &dependent in deps {
                    if let Some(deg) = in_degree.get_mut(dependent) {
                        *deg -= 1;
                        if *deg == 0 {
                            queue.push_back(dependent);
                        }
                    }
                }
            }
        }

        if visited != self.tasks.len() {
            let mut on_cycle: Vec<&str> = in_degree
                .iter()
                .filter(|(_, &deg)| deg > 0)
                .map(|(&name, _)| name)
                .collect();
            on_cycle.sort_unstable();
            return Err(Error::Cycle(on_cycle[0].to_string()));
        }

        Ok(())
    }
}

/// Collect all tasks required to run the given roots, including
/// transitive prerequisites.
fn collect_required_tasks(graph: &TaskGraph, roots: &[&str]) -> Result<HashSet<String>> {
    let mut required: HashSet<String> = HashSet::new();
    let mut queue: VecDeque<String> = roots.iter().map(|&s| s.to_string()).collect();

    while let Some(name) = queue.pop_front() {
        if required.contains(&name) {
            continue;
        }

        if let Some(task) = graph.get(&name) {
            required.insert(name.clone());
            for dep in &task.deps {
                if !required.contains(dep) {
                    queue.push_back(dep.clone());
                }
            }
        } else {
            return Err(Error::TaskNotFound(name));
        }
    }

    Ok(required)
}

/// Build execution order over the prerequisite closure of `roots`. Every
/// transitive prerequisite appears exactly once, before its dependents.
pub fn topological_sort(graph: &TaskGraph, roots: &[&str]) -> Result<Vec<String>> {
    let required = collect_required_tasks(graph, roots)?;

    let mut in_degree: HashMap<&str, usize> = HashMap::new();
    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();

    for name in &required {
        in_degree.entry(name.as_str()).or_insert(0);
        dependents.entry(name.as_str()).or_default();
    }

    for name in &required {
        if let Some(task) = graph.get(name) {
            for dep in &task.deps {
                if required.contains(dep) {
                    *in_degree.entry(name.as_str()).or_insert(0) += 1;
                    dependents.entry(dep.as_str()).or_default().push(name.as_str());
                }
            }
        }
    }

    let mut queue: Vec<&str> = in_degree
        .iter()
        .filter(|(_, &deg)| deg == 0)
        .map(|(&name, _)| name)
        .collect();
    queue.sort_unstable();
    let mut queue: VecDeque<&str> = queue.into();

    let mut result: Vec<String> = Vec::new();

    while let Some(current) = queue.pop_front() {
        result.push(current.to_string());

        if let Some(deps) = dependents.get(current) {
            for &dependent in deps {
                if let Some(deg) = in_degree.get_mut(dependent) {
                    *deg -= 1;
                    if *deg == 0 {
                        queue.push_back(dependent);
                    }
                }
            }
        }
    }

    if result.len() != required.len() {
        let mut on_cycle: Vec<&str> = in_degree
            .iter()
            .filter(|(_, &deg)| deg > 0)
            .map(|(&name, _)| name)
            .collect();
        on_cycle.sort_unstable();
        return Err(Error::Cycle(on_cycle[0].to_string()));
    }

    Ok(result)
}

/// Group the prerequisite closure of `roots` into levels: tasks in one
/// level have no dependency edges between them and may run concurrently.
pub fn execution_levels(graph: &TaskGraph, roots: &[&str]) -> Result<Vec<Vec<String>>> {
    let all_tasks = topological_sort(graph, roots)?;
    let task_set: HashSet<String> = all_tasks.iter().cloned().collect();

    let mut dependents: HashMap<String, Vec<String>> = HashMap::new();
    let mut in_degree: HashMap<String, usize> = HashMap::new();

    for name in &all_tasks {
        in_degree.insert(name.clone(), 0);
        dependents.insert(name.clone(), Vec::new());
    }

    for name in &all_tasks {
        if let Some(task) = graph.get(name) {
            for dep in &task.deps {
                if task_set.contains(dep) {
                    *in_degree.entry(name.clone()).or_insert(0) += 1;
                    dependents.entry(dep.clone()).or_default().push(name.clone());
                }
            }
        }
    }

    let mut levels: Vec<Vec<String>> = Vec::new();
    let mut remaining: HashSet<String> = task_set;

    while !remaining.is_empty() {
        let mut current_level: Vec<String> = remaining
            .iter()
            .filter(|task| in_degree.get(*task).copied().unwrap_or(0) == 0)
            .cloned()
            .collect();

        if current_level.is_empty() {
            let mut stuck: Vec<&String> = remaining.iter().collect();
            stuck.sort_unstable();
            return Err(Error::Cycle(stuck[0].clone()));
        }

        current_level.sort_unstable();

        for task in &current_level {
            remaining.remove(task);
            if let Some(deps) = dependents.get(task) {
                for dep in deps.clone() {
                    if let Some(degree) = in_degree.get_mut(&dep) {
                        *degree = degree.saturating_sub(1);
                    }
                }
            }
        }

        levels.push(current_level);
    }

    Ok(levels)
}

/// Find tasks whose source globs match the given file. Used by watch mode
/// to map changed files back to tasks.
pub fn tasks_matching_file(graph: &TaskGraph, path: &Path) -> Vec<String> {
    let mut matching = Vec::new();

    for (name, task) in graph.iter() {
        for pattern in &task.sources {
            if pattern.starts_with('!') {
                continue;
            }
            if let Ok(glob_pattern) = glob::Pattern::new(pattern) {
                if glob_pattern.matches_path(path) {
                    matching.push(name.clone());
                    break;
                }
            }
        }
    }

    matching.sort_unstable();
    matching
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diamond_graph() -> TaskGraph {
        // d depends on b and c, both of which depend on a.
        let mut graph = TaskGraph::new();
        graph.register(TaskSpec::new("a")).unwrap();
        graph.register(TaskSpec::new("b").dep("a")).unwrap();
        graph.register(TaskSpec::new("c").dep("a")).unwrap();
        graph
            .register(TaskSpec::new("d").dep("b").dep("c"))
            .unwrap();
        graph
    }

    #[test]
    fn test_topological_sort_orders_deps_first() {
        let graph = diamond_graph();
        let order = topological_sort(&graph, &["d"]).unwrap();

        let pos = |name: &str| order.iter().position(|x| x == name).unwrap();
        assert!(pos("a") < pos("b"));
        assert!(pos("a") < pos("c"));
        assert!(pos("b") < pos("d"));
        assert!(pos("c") < pos("d"));
    }

    #[test]
    fn test_diamond_prerequisite_appears_once() {
        let graph = diamond_graph();
        let order = topological_sort(&graph, &["d"]).unwrap();

        assert_eq!(order.len(), 4);
        assert_eq!(order.iter().filter(|x| *x == "a").count(), 1);
    }

    #[test]
    fn test_sort_limited_to_required_subgraph() {
        let mut graph = diamond_graph();
        graph.register(TaskSpec::new("unrelated")).unwrap();

        let order = topological_sort(&graph, &["b"]).unwrap();
        assert_eq!(order, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_execution_levels() {
        let graph = diamond_graph();
        let levels = execution_levels(&graph, &["d"]).unwrap();

        assert_eq!(levels.len(), 3);
        assert_eq!(levels[0], vec!["a".to_string()]);
        assert_eq!(levels[1], vec!["b".to_string(), "c".to_string()]);
        assert_eq!(levels[2], vec!["d".to_string()]);
    }

    #[test]
    fn test_cycle_rejected_at_validation() {
        let mut graph = TaskGraph::new();
        graph.register(TaskSpec::new("a").dep("b")).unwrap();
        graph.register(TaskSpec::new("b").dep("a")).unwrap();

        assert!(matches!(graph.validate(), Err(Error::Cycle(_))));
    }

    #[test]
    fn test_unknown_dep_rejected_at_validation() {
        let mut graph = TaskGraph::new();
        graph.register(TaskSpec::new("a").dep("ghost")).unwrap();

        match graph.validate() {
            Err(Error::TaskNotFound(name)) => assert_eq!(name, "ghost"),
            other => panic!("expected TaskNotFound, got {:?}", other.err()),
        }
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let mut graph = TaskGraph::new();
        graph.register(TaskSpec::new("a")).unwrap();
        assert!(graph.register(TaskSpec::new("a")).is_err());
    }

    #[test]
    fn test_unknown_root_is_task_not_found() {
        let graph = diamond_graph();
        assert!(matches!(
            topological_sort(&graph, &["ghost"]),
            Err(Error::TaskNotFound(_))
        ));
    }

    #[test]
    fn test_tasks_matching_file() {
        let mut graph = TaskGraph::new();
        graph
            .register(TaskSpec::new("images").source("src/_images/**/*.png"))
            .unwrap();
        graph
            .register(
                TaskSpec::new("sw:copy")
                    .source("src/**/sw.js")
                    .source("!src/**/*.md"),
            )
            .unwrap();

        let matched = tasks_matching_file(&graph, Path::new("src/_images/logo.png"));
        assert_eq!(matched, vec!["images".to_string()]);

        // Negative patterns never select a task.
        let matched = tasks_matching_file(&graph, Path::new("src/readme.md"));
        assert!(matched.is_empty());
    }
}
