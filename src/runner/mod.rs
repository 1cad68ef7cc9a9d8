//! Task runner
//!
//! Executes an [`ExecutionPlan`] level by level. Tasks within a level run
//! concurrently; the first failure cancels the rest of its level and stops
//! the run.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::task::JoinSet;
use tracing::{debug, info};

use crate::config::Config;
use crate::graph::{ExecutionPlan, GraphError, TaskBody, TaskGraph};
use crate::mode::Mode;
use crate::notify::Notifier;

/// Everything a task body may read. Immutable for the whole run.
#[derive(Clone)]
pub struct TaskContext {
    /// Project configuration
    pub config: Arc<Config>,

    /// Mode of the run
    pub mode: Mode,

    /// Sink for user-facing notifications
    pub notifier: Arc<dyn Notifier>,

    /// Runner that started this task, for tasks that trigger further runs
    pub runner: Runner,
}

/// How a task finished
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Completed,

    /// The task hit an error that was reported and deliberately not propagated
    Degraded(String),
}

/// Task trait - implement this to add a task body
#[async_trait]
pub trait Task: Send + Sync {
    /// Task name, also its name in the graph
    fn name(&self) -> &str;

    /// Run the task
    async fn run(&self, ctx: &TaskContext) -> Result<TaskOutcome>;
}

/// Result of one executed task
#[derive(Debug, Clone)]
pub struct TaskReport {
    pub name: String,
    pub outcome: TaskOutcome,
    pub elapsed: Duration,
}

/// Result of a run
#[derive(Debug, Clone)]
pub struct RunReport {
    pub target: String,
    pub mode: Mode,
    pub tasks: Vec<TaskReport>,
    pub elapsed: Duration,
}

impl RunReport {
    /// Tasks that completed in degraded state
    pub fn degraded(&self) -> impl Iterator<Item = &TaskReport> {
        self.tasks
            .iter()
            .filter(|t| matches!(t.outcome, TaskOutcome::Degraded(_)))
    }

    /// Names of executed tasks in completion order
    pub fn executed(&self) -> Vec<&str> {
        self.tasks.iter().map(|t| t.name.as_str()).collect()
    }
}

/// Runs tasks of a validated graph
#[derive(Clone)]
pub struct Runner {
    graph: Arc<TaskGraph>,
    config: Arc<Config>,
    notifier: Arc<dyn Notifier>,
}

impl Runner {
    /// Create a runner. The graph is validated here, before anything runs.
    pub fn new(graph: TaskGraph, config: Arc<Config>, notifier: Arc<dyn Notifier>) -> Result<Self, GraphError> {
        graph.validate()?;
        Ok(Self {
            graph: Arc::new(graph),
            config,
            notifier,
        })
    }

    pub fn graph(&self) -> &TaskGraph {
        &self.graph
    }

    pub fn config(&self) -> &Arc<Config> {
        &self.config
    }

    /// Plan a task without running it
    pub fn plan(&self, name: &str, mode: Mode) -> Result<ExecutionPlan, GraphError> {
        self.graph.plan(name, mode)
    }

    /// Run a task and all of its prerequisites
    pub async fn run(&self, name: &str, mode: Mode) -> Result<RunReport> {
        let start = Instant::now();
        let plan = self.plan(name, mode)?;

        debug!("Plan for '{}': {:?}", plan.target, plan.levels);

        let ctx = Arc::new(TaskContext {
            config: self.config.clone(),
            mode: plan.mode.clone(),
            notifier: self.notifier.clone(),
            runner: self.clone(),
        });

        let mut reports = Vec::with_capacity(plan.len());

        for level in &plan.levels {
            let mut join_set = JoinSet::new();

            for task_name in level {
                let body = self
                    .graph
                    .get(task_name)
                    .map(|spec| spec.body.clone())
                    .ok_or_else(|| GraphError::UnknownTask(task_name.clone()))?;
                let ctx = ctx.clone();
                let task_name = task_name.clone();

                join_set.spawn(async move {
                    let started = Instant::now();
                    let result = run_body(&body, &task_name, &ctx).await;
                    (task_name, result, started.elapsed())
                });
            }

            while let Some(joined) = join_set.join_next().await {
                let (task_name, result, elapsed) = joined.context("task panicked")?;
                match result {
                    Ok(outcome) => {
                        debug!("Finished '{}' after {:?}", task_name, elapsed);
                        reports.push(TaskReport {
                            name: task_name,
                            outcome,
                            elapsed,
                        });
                    }
                    Err(err) => {
                        join_set.abort_all();
                        return Err(err.context(format!("task '{}' failed", task_name)));
                    }
                }
            }
        }

        Ok(RunReport {
            target: plan.target,
            mode: plan.mode,
            tasks: reports,
            elapsed: start.elapsed(),
        })
    }
}

async fn run_body(body: &TaskBody, name: &str, ctx: &TaskContext) -> Result<TaskOutcome> {
    match body {
        TaskBody::Action(task) => {
            info!("Starting '{}'", name);
            task.run(ctx).await
        }
        TaskBody::ForceMode(mode) => {
            info!("'{}' set the mode to `{}`", name, mode);
            Ok(TaskOutcome::Completed)
        }
        TaskBody::Group => Ok(TaskOutcome::Completed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::TaskSpec;
    use crate::notify::CapturingNotifier;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;

    /// Records the order tasks ran in and the mode they saw
    struct Probe {
        name: String,
        log: Arc<Mutex<Vec<(String, Mode)>>>,
        fail: bool,
        delay_ms: u64,
    }

    #[async_trait]
    impl Task for Probe {
        fn name(&self) -> &str {
            &self.name
        }

        async fn run(&self, ctx: &TaskContext) -> Result<TaskOutcome> {
            tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
            self.log.lock().push((self.name.clone(), ctx.mode.clone()));
            if self.fail {
                anyhow::bail!("{} broke", self.name);
            }
            Ok(TaskOutcome::Completed)
        }
    }

    fn probe(log: &Arc<Mutex<Vec<(String, Mode)>>>, name: &str, fail: bool, delay_ms: u64) -> TaskSpec {
        TaskSpec::action(Arc::new(Probe {
            name: name.to_string(),
            log: log.clone(),
            fail,
            delay_ms,
        }))
    }

    fn runner(specs: Vec<TaskSpec>) -> Runner {
        let mut graph = TaskGraph::new();
        for spec in specs {
            graph.register(spec).unwrap();
        }
        Runner::new(
            graph,
            Arc::new(Config::default_config(".")),
            Arc::new(CapturingNotifier::default()),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_prerequisites_run_first_and_once() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let runner = runner(vec![
            probe(&log, "base", false, 0),
            probe(&log, "left", false, 0).with_prerequisites(&["base"]),
            probe(&log, "right", false, 0).with_prerequisites(&["base"]),
            probe(&log, "top", false, 0).with_prerequisites(&["left", "right"]),
        ]);

        let report = runner.run("top", Mode::Development).await.unwrap();
        let order: Vec<String> = log.lock().iter().map(|(n, _)| n.clone()).collect();

        assert_eq!(order.len(), 4);
        assert_eq!(order[0], "base");
        assert_eq!(order[3], "top");
        assert_eq!(report.tasks.len(), 4);
        assert_eq!(report.mode, Mode::Development);
    }

    #[tokio::test]
    async fn test_forced_mode_seen_by_every_task() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let runner = runner(vec![
            TaskSpec::new("envProduction", TaskBody::ForceMode(Mode::Production)),
            probe(&log, "styles", false, 0),
            probe(&log, "template", false, 0),
            TaskSpec::new("build", TaskBody::Group).with_prerequisites(&["envProduction", "styles", "template"]),
        ]);

        runner.run("build", Mode::Development).await.unwrap();
        assert!(log.lock().iter().all(|(_, mode)| *mode == Mode::Production));

        log.lock().clear();
        runner.run("styles", Mode::Development).await.unwrap();
        assert_eq!(log.lock()[0].1, Mode::Development);
    }

    #[tokio::test]
    async fn test_failure_stops_dependents_and_cancels_siblings() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let runner = runner(vec![
            probe(&log, "broken", true, 0),
            probe(&log, "slow", false, 2_000),
            probe(&log, "after", false, 0).with_prerequisites(&["broken", "slow"]),
        ]);

        let started = Instant::now();
        let err = runner.run("after", Mode::Development).await.unwrap_err();

        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(err.to_string(), "task 'broken' failed");
        assert!(format!("{:#}", err).contains("broken broke"));
        let ran: Vec<String> = log.lock().iter().map(|(n, _)| n.clone()).collect();
        assert_eq!(ran, vec!["broken".to_string()]);
    }

    #[test]
    fn test_invalid_graph_rejected_before_running() {
        let mut graph = TaskGraph::new();
        graph
            .register(TaskSpec::new("a", TaskBody::Group).with_prerequisites(&["a"]))
            .unwrap();
        let result = Runner::new(
            graph,
            Arc::new(Config::default_config(".")),
            Arc::new(CapturingNotifier::default()),
        );
        assert!(matches!(result, Err(GraphError::Cycle(_))));
    }
}
