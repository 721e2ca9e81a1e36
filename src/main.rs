use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::{Path, PathBuf};

use assetx::config::Config;
use assetx::graph::TaskGraph;
use assetx::notifications::Notifier;
use assetx::paths::{PathResolver, Role};
use assetx::runner::{Runner, RuntimeFlags};
use assetx::tasks::{register_all, BuildContext};
use assetx::watcher::PipelineWatcher;

const CONFIG_FILE: &str = "assetx.toml";

#[derive(Parser)]
#[command(name = "assetx")]
#[command(about = "Asset pipeline runner with glob-driven tasks and watch mode")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to config file (default: assetx.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a task and its prerequisites (default: build)
    Run {
        /// Task names; more than one runs as a strict sequence
        tasks: Vec<String>,

        /// Enable production-only optimization steps
        #[arg(long)]
        production: bool,
    },

    /// Watch source files and re-run matching tasks on changes
    Watch {
        /// Task to re-run (re-runs any matching task if not specified)
        task: Option<String>,

        /// Enable production-only optimization steps
        #[arg(long)]
        production: bool,
    },

    /// List all registered tasks
    List,
}

fn main() {
    if let Err(e) = run() {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.unwrap_or_else(|| PathBuf::from(CONFIG_FILE));
    let config_path = std::fs::canonicalize(&config_path)
        .with_context(|| format!("Could not find config file: {}", config_path.display()))?;

    let base_dir = config_path
        .parent()
        .map(|p| p.to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."));

    let config = Config::load(&config_path)
        .with_context(|| format!("Could not load {}", config_path.display()))?;

    match cli.command {
        Commands::Run { tasks, production } => cmd_run(&config, &base_dir, tasks, production),
        Commands::Watch { task, production } => cmd_watch(&config, &base_dir, task, production),
        Commands::List => cmd_list(&config, &base_dir),
    }
}

fn build_runner(config: &Config, base_dir: &Path, flags: RuntimeFlags) -> Result<Runner> {
    let resolver = PathResolver::new(base_dir, config.directories.clone(), &config.build.dest);
    let mut graph = TaskGraph::new();
    let cx = BuildContext {
        resolver,
        entries: config.entries.clone(),
        flags,
    };
    register_all(&mut graph, &cx)?;

    let notifier = Notifier::new(config.notification.clone());
    Ok(Runner::new(graph, flags, notifier)?)
}

#[tokio::main]
async fn cmd_run(
    config: &Config,
    base_dir: &Path,
    tasks: Vec<String>,
    production: bool,
) -> Result<()> {
    let flags = RuntimeFlags {
        production,
        lenient: false,
    };
    let runner = build_runner(config, base_dir, flags)?;

    let results = match tasks.len() {
        0 => runner.run("build").await?,
        1 => runner.run(&tasks[0]).await?,
        _ => {
            let refs: Vec<&str> = tasks.iter().map(|s| s.as_str()).collect();
            runner.run_sequence(&refs).await?
        }
    };

    // Exit with error code if any task failed
    if !results.iter().all(|r| r.success()) {
        std::process::exit(1);
    }

    Ok(())
}

fn cmd_watch(
    config: &Config,
    base_dir: &Path,
    task: Option<String>,
    production: bool,
) -> Result<()> {
    let flags = RuntimeFlags {
        production,
        lenient: true,
    };
    let runner = build_runner(config, base_dir, flags)?;

    if let Some(ref name) = task {
        if runner.graph().get(name).is_none() {
            anyhow::bail!(
                "Task '{}' not found. Use 'assetx list' to see available tasks.",
                name
            );
        }
    }

    let source_root = PathResolver::new(base_dir, config.directories.clone(), &config.build.dest)
        .source_dir(Role::Source)?;

    let watcher = PipelineWatcher::new(runner, source_root, task);
    watcher.start()
}

fn cmd_list(config: &Config, base_dir: &Path) -> Result<()> {
    let runner = build_runner(config, base_dir, RuntimeFlags::default())?;
    let graph = runner.graph();

    println!("\n{} {}\n", "📦".cyan(), config.project.name.bold());

    if graph.is_empty() {
        println!("  {}", "No tasks registered".dimmed());
        return Ok(());
    }

    println!("{}", "Tasks:".bold());

    let mut task_names = graph.task_names();
    task_names.sort();

    for name in task_names {
        let task = match graph.get(name) {
            Some(task) => task,
            None => continue,
        };

        println!("  {} {}", "•".green(), name.cyan());

        if !task.deps.is_empty() {
            let mode = if task.sequential { " (sequential)" } else { "" };
            println!(
                "    {} {}{}",
                "depends_on:".dimmed(),
                task.deps.join(", "),
                mode.dimmed()
            );
        }

        for source in &task.sources {
            println!("    {} {}", "source:".dimmed(), source);
        }

        match &task.dest {
            Some(dest) => println!("    {} {}", "dest:".dimmed(), dest.display()),
            None => println!("    {} {}", "dest:".dimmed(), "(report only)".dimmed()),
        }

        println!();
    }

    Ok(())
}
