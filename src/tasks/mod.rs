//! The standard theme tasks
//!
//! | task          | prerequisites                                          |
//! |---------------|--------------------------------------------------------|
//! | clean         |                                                        |
//! | copy          | (after clean)                                          |
//! | postcss       |                                                        |
//! | styles        | postcss                                                |
//! | jshint        |                                                        |
//! | template      |                                                        |
//! | uglify        | (after clean)                                          |
//! | envProduction |                                                        |
//! | watch         | template, styles, jshint                               |
//! | build         | envProduction, clean, template, styles, jshint, copy, uglify |
//! | shrinkwrap    |                                                        |
//! | default       | watch                                                  |

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use colored::Colorize;
use tracing::info;

use crate::graph::{GraphError, TaskBody, TaskGraph, TaskSpec};
use crate::mode::Mode;
use crate::notify::ErrorHandler;
use crate::pipeline::{files, lint, scripts, shrinkwrap, styles, template};
use crate::runner::{Task, TaskContext, TaskOutcome};
use crate::server::LiveReloadServer;
use crate::utils::{display_path, format_size};
use crate::watch::WatchCoordinator;

/// Task run when none is named
pub const DEFAULT_TASK: &str = "default";

/// Build the graph of standard tasks
pub fn standard_graph() -> Result<TaskGraph, GraphError> {
    let mut graph = TaskGraph::new();

    let specs = [
        TaskSpec::action(Arc::new(CleanTask)).describe("Remove .tmp and dist"),
        TaskSpec::action(Arc::new(CopyTask))
            .with_after(&["clean"])
            .describe("Copy templates, images, fonts and translations to dist"),
        TaskSpec::action(Arc::new(PostcssTask)).describe("Compile the entry stylesheet"),
        TaskSpec::action(Arc::new(StylesTask))
            .with_prerequisites(&["postcss"])
            .describe("Bundle the theme stylesheet (minified in production)"),
        TaskSpec::action(Arc::new(JshintTask)).describe("Lint theme scripts"),
        TaskSpec::action(Arc::new(TemplateTask)).describe("Render the debug-flag template"),
        TaskSpec::action(Arc::new(UglifyTask))
            .with_after(&["clean"])
            .describe("Concatenate and minify scripts"),
        TaskSpec::new("envProduction", TaskBody::ForceMode(Mode::Production))
            .describe("Force production mode for the run"),
        TaskSpec::action(Arc::new(WatchTask))
            .with_prerequisites(&["template", "styles", "jshint"])
            .describe("Rebuild on change and live-reload the browser"),
        TaskSpec::action(Arc::new(BuildTask))
            .with_prerequisites(&["envProduction", "clean", "template", "styles", "jshint", "copy", "uglify"])
            .describe("Full production build"),
        TaskSpec::action(Arc::new(ShrinkwrapTask)).describe("Pin package.json dependencies to exact versions"),
        TaskSpec::new(DEFAULT_TASK, TaskBody::Group)
            .with_prerequisites(&["watch"])
            .describe("Alias for watch"),
    ];

    for spec in specs {
        graph.register(spec)?;
    }

    Ok(graph)
}

fn announce_mode(task: &str, mode: &Mode) {
    eprintln!(
        "  {} `{}` task run in `{}` environment",
        "•".dimmed(),
        task.cyan(),
        mode.as_str().yellow()
    );
}

fn log_written(path: &Path, ctx: &TaskContext) {
    let size = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
    info!("Wrote {} ({})", display_path(path, &ctx.config.root), format_size(size));
}

struct CleanTask;

#[async_trait]
impl Task for CleanTask {
    fn name(&self) -> &str {
        "clean"
    }

    async fn run(&self, ctx: &TaskContext) -> Result<TaskOutcome> {
        for dir in files::clean(&ctx.config)? {
            info!("Removed {}", display_path(&dir, &ctx.config.root));
        }
        Ok(TaskOutcome::Completed)
    }
}

struct CopyTask;

#[async_trait]
impl Task for CopyTask {
    fn name(&self) -> &str {
        "copy"
    }

    async fn run(&self, ctx: &TaskContext) -> Result<TaskOutcome> {
        let written = files::copy_assets(&ctx.config)?;
        info!("Copied {} file(s)", written.len());
        Ok(TaskOutcome::Completed)
    }
}

struct PostcssTask;

#[async_trait]
impl Task for PostcssTask {
    fn name(&self) -> &str {
        "postcss"
    }

    async fn run(&self, ctx: &TaskContext) -> Result<TaskOutcome> {
        // Compile errors are reported and the run goes on
        match styles::compile(&ctx.config) {
            Ok(_) => Ok(TaskOutcome::Completed),
            Err(e) => Ok(ErrorHandler::compile_errors(ctx.notifier.as_ref()).handle(&e)),
        }
    }
}

struct StylesTask;

#[async_trait]
impl Task for StylesTask {
    fn name(&self) -> &str {
        "styles"
    }

    async fn run(&self, ctx: &TaskContext) -> Result<TaskOutcome> {
        announce_mode(self.name(), &ctx.mode);
        let output = styles::bundle(&ctx.config, &ctx.mode)?;
        log_written(&output, ctx);
        Ok(TaskOutcome::Completed)
    }
}

struct JshintTask;

#[async_trait]
impl Task for JshintTask {
    fn name(&self) -> &str {
        "jshint"
    }

    async fn run(&self, ctx: &TaskContext) -> Result<TaskOutcome> {
        let report = lint::lint(&ctx.config)?;
        if !report.is_clean() {
            eprint!("{}", report.stylish(&ctx.config.root));
        }
        let report = report.into_result()?;
        info!("Linted {} file(s)", report.checked);
        Ok(TaskOutcome::Completed)
    }
}

struct TemplateTask;

#[async_trait]
impl Task for TemplateTask {
    fn name(&self) -> &str {
        "template"
    }

    async fn run(&self, ctx: &TaskContext) -> Result<TaskOutcome> {
        announce_mode(self.name(), &ctx.mode);
        let output = template::render_debug_template(&ctx.config, &ctx.mode)?;
        info!("Wrote {}", display_path(&output, &ctx.config.root));
        Ok(TaskOutcome::Completed)
    }
}

struct UglifyTask;

#[async_trait]
impl Task for UglifyTask {
    fn name(&self) -> &str {
        "uglify"
    }

    async fn run(&self, ctx: &TaskContext) -> Result<TaskOutcome> {
        let output = scripts::bundle(&ctx.config)?;
        log_written(&output, ctx);
        Ok(TaskOutcome::Completed)
    }
}

struct BuildTask;

#[async_trait]
impl Task for BuildTask {
    fn name(&self) -> &str {
        "build"
    }

    async fn run(&self, _ctx: &TaskContext) -> Result<TaskOutcome> {
        info!("Build is finished");
        Ok(TaskOutcome::Completed)
    }
}

struct ShrinkwrapTask;

#[async_trait]
impl Task for ShrinkwrapTask {
    fn name(&self) -> &str {
        "shrinkwrap"
    }

    async fn run(&self, ctx: &TaskContext) -> Result<TaskOutcome> {
        let (path, pinned) = shrinkwrap::shrinkwrap(&ctx.config)?;
        for pin in &pinned {
            eprintln!("  {} {} {} → {}", "•".dimmed(), pin.name, pin.from.dimmed(), pin.to.green());
        }
        info!("Pinned {} dependency(ies) in {}", pinned.len(), display_path(&path, &ctx.config.root));
        Ok(TaskOutcome::Completed)
    }
}

struct WatchTask;

#[async_trait]
impl Task for WatchTask {
    fn name(&self) -> &str {
        "watch"
    }

    async fn run(&self, ctx: &TaskContext) -> Result<TaskOutcome> {
        let server = LiveReloadServer::new(ctx.config.livereload.clone());
        let coordinator = WatchCoordinator::new(
            ctx.config.clone(),
            ctx.runner.clone(),
            ctx.mode.clone(),
            Some(server.handle()),
        )?;

        eprintln!(
            "{} Watching {} for changes, live reload on {}\n  {} Press {} to stop\n",
            "→".blue(),
            ctx.config.root.display().to_string().cyan(),
            format!("{}:{}", ctx.config.livereload.host, ctx.config.livereload.port).cyan(),
            "•".dimmed(),
            "Ctrl+C".yellow()
        );

        tokio::select! {
            result = server.start() => result.context("live-reload server stopped")?,
            result = coordinator.run() => result.context("watcher stopped")?,
            _ = tokio::signal::ctrl_c() => info!("Stopping watch"),
        }

        Ok(TaskOutcome::Completed)
    }
}
