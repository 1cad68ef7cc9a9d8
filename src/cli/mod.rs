//! Command-line interface for Themeforge
//!
//! `themeforge [TASK] [--env=<mode>]...` runs one task with its
//! prerequisites; `--tasks` lists what can be run.

mod list;

use std::sync::Arc;

use anyhow::Result;
use clap::{ArgAction, Parser};
use colored::Colorize;
use tracing::info;

use crate::config::{Config, CONFIG_FILE};
use crate::mode::Mode;
use crate::notify::ConsoleNotifier;
use crate::runner::{RunReport, Runner, TaskOutcome};
use crate::tasks::{standard_graph, DEFAULT_TASK};
use crate::utils::format_duration;

/// Themeforge - asset pipeline and live reload for themes
#[derive(Parser, Debug)]
#[command(name = "themeforge")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Task to run
    #[arg(default_value = DEFAULT_TASK)]
    pub task: String,

    /// Mode of the run, as `--env=<mode>`. The first value made of
    /// letters only wins; other values are ignored.
    #[arg(
        long = "env",
        value_name = "MODE",
        action = ArgAction::Append,
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = ""
    )]
    pub env: Vec<String>,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Path to the config file
    #[arg(short, long, default_value = CONFIG_FILE)]
    pub config: String,

    /// List available tasks and exit
    #[arg(long)]
    pub tasks: bool,
}

impl Cli {
    /// Mode requested on the command line
    pub fn mode(&self) -> Mode {
        Mode::from_env_flags(&self.env)
    }

    /// Execute the CLI command
    pub async fn execute(&self) -> Result<()> {
        let graph = standard_graph()?;

        if self.tasks {
            list::print_tasks(&graph);
            return Ok(());
        }

        print_banner();

        info!("Loading configuration from {}", self.config);
        let config = Arc::new(Config::load(&self.config)?);
        let runner = Runner::new(graph, config, Arc::new(ConsoleNotifier))?;

        let mode = self.mode();
        eprintln!(
            "{} Running '{}' in `{}` mode...",
            "→".blue(),
            self.task.cyan(),
            mode.as_str().yellow()
        );

        let report = runner.run(&self.task, mode).await?;
        print_summary(&report);

        Ok(())
    }
}

/// Print the Themeforge banner
fn print_banner() {
    eprintln!(
        "\n{} {} {}\n",
        "⚒".cyan(),
        "Themeforge".bold().cyan(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
}

fn print_summary(report: &RunReport) {
    eprintln!(
        "\n{} Finished '{}' ({} task(s), `{}` mode) in {}\n",
        "✓".green().bold(),
        report.target,
        report.tasks.len(),
        report.mode,
        format_duration(report.elapsed)
    );

    for task in &report.tasks {
        match &task.outcome {
            TaskOutcome::Completed => eprintln!(
                "  {} {} {}",
                "•".dimmed(),
                task.name.cyan(),
                format_duration(task.elapsed).dimmed()
            ),
            TaskOutcome::Degraded(reason) => eprintln!(
                "  {} {} {}",
                "!".yellow().bold(),
                task.name.yellow(),
                reason.dimmed()
            ),
        }
    }

    eprintln!();
}
