//! Task graph data structures
//!
//! Tasks are registered once at startup into a [`TaskGraph`], validated as a
//! DAG, and planned into topological levels by [`TaskGraph::plan`].

mod plan;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::mode::Mode;
use crate::runner::Task;

pub use plan::ExecutionPlan;

/// Errors raised while building or planning the task graph
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GraphError {
    #[error("task '{0}' is registered twice")]
    DuplicateTask(String),

    #[error("task '{0}' is not defined")]
    UnknownTask(String),

    #[error("task '{task}' depends on undefined task '{missing}'")]
    MissingPrerequisite { task: String, missing: String },

    #[error("task dependency cycle: {}", .0.join(" -> "))]
    Cycle(Vec<String>),
}

/// What a task does when it runs
#[derive(Clone)]
pub enum TaskBody {
    /// Runs an action
    Action(Arc<dyn Task>),

    /// Forces the mode of every task in the same plan
    ForceMode(Mode),

    /// Only aggregates prerequisites
    Group,
}

impl fmt::Debug for TaskBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskBody::Action(task) => write!(f, "Action({})", task.name()),
            TaskBody::ForceMode(mode) => write!(f, "ForceMode({})", mode),
            TaskBody::Group => f.write_str("Group"),
        }
    }
}

/// A named unit of work and its position in the graph
#[derive(Debug, Clone)]
pub struct TaskSpec {
    pub name: String,

    /// Tasks that must complete first; pulled into every plan of this task
    pub prerequisites: Vec<String>,

    /// Tasks that must complete first only when they are part of the same plan
    pub after: Vec<String>,

    /// One-line description for `--tasks`
    pub description: String,

    pub body: TaskBody,
}

impl TaskSpec {
    pub fn new(name: &str, body: TaskBody) -> Self {
        Self {
            name: name.to_string(),
            prerequisites: Vec::new(),
            after: Vec::new(),
            description: String::new(),
            body,
        }
    }

    pub fn action(task: Arc<dyn Task>) -> Self {
        let name = task.name().to_string();
        Self::new(&name, TaskBody::Action(task))
    }

    pub fn with_prerequisites(mut self, names: &[&str]) -> Self {
        self.prerequisites = names.iter().map(|n| n.to_string()).collect();
        self
    }

    pub fn with_after(mut self, names: &[&str]) -> Self {
        self.after = names.iter().map(|n| n.to_string()).collect();
        self
    }

    pub fn describe(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }
}

/// The task dependency graph
#[derive(Debug, Default)]
pub struct TaskGraph {
    /// Tasks in registration order
    tasks: Vec<TaskSpec>,

    /// Map from name to index in `tasks`
    index: HashMap<String, usize>,
}

impl TaskGraph {
    /// Create a new empty task graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a task. Names must be unique.
    pub fn register(&mut self, spec: TaskSpec) -> Result<(), GraphError> {
        if self.index.contains_key(&spec.name) {
            return Err(GraphError::DuplicateTask(spec.name));
        }
        self.index.insert(spec.name.clone(), self.tasks.len());
        self.tasks.push(spec);
        Ok(())
    }

    /// Check that every referenced task exists and that there are no cycles
    pub fn validate(&self) -> Result<(), GraphError> {
        for spec in &self.tasks {
            for dep in spec.prerequisites.iter().chain(&spec.after) {
                if !self.index.contains_key(dep) {
                    return Err(GraphError::MissingPrerequisite {
                        task: spec.name.clone(),
                        missing: dep.clone(),
                    });
                }
            }
        }

        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            New,
            Active,
            Done,
        }

        fn visit(
            graph: &TaskGraph,
            id: usize,
            marks: &mut [Mark],
            stack: &mut Vec<usize>,
        ) -> Result<(), GraphError> {
            match marks[id] {
                Mark::Done => return Ok(()),
                Mark::Active => {
                    let start = stack.iter().position(|&s| s == id).unwrap_or(0);
                    let mut cycle: Vec<String> = stack[start..]
                        .iter()
                        .map(|&s| graph.tasks[s].name.clone())
                        .collect();
                    cycle.push(graph.tasks[id].name.clone());
                    return Err(GraphError::Cycle(cycle));
                }
                Mark::New => {}
            }

            marks[id] = Mark::Active;
            stack.push(id);
            for dep in graph.edges(id) {
                visit(graph, dep, marks, stack)?;
            }
            stack.pop();
            marks[id] = Mark::Done;
            Ok(())
        }

        let mut marks = vec![Mark::New; self.tasks.len()];
        let mut stack = Vec::new();
        for id in 0..self.tasks.len() {
            visit(self, id, &mut marks, &mut stack)?;
        }

        Ok(())
    }

    /// Plan a run of `name`.
    ///
    /// The plan holds every transitive prerequisite exactly once, grouped in
    /// levels that only depend on earlier levels. A `ForceMode` task in the
    /// plan overrides `base_mode` for the whole run.
    pub fn plan(&self, name: &str, base_mode: Mode) -> Result<ExecutionPlan, GraphError> {
        let target = self.id(name)?;
        plan::build(self, target, base_mode)
    }

    /// Get a task by name
    pub fn get(&self, name: &str) -> Option<&TaskSpec> {
        self.index.get(name).map(|&id| &self.tasks[id])
    }

    /// All tasks in registration order
    pub fn tasks(&self) -> &[TaskSpec] {
        &self.tasks
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    fn id(&self, name: &str) -> Result<usize, GraphError> {
        self.index
            .get(name)
            .copied()
            .ok_or_else(|| GraphError::UnknownTask(name.to_string()))
    }

    /// Prerequisite and ordering edges of a task (validated graphs only)
    fn edges(&self, id: usize) -> impl Iterator<Item = usize> + '_ {
        let spec = &self.tasks[id];
        spec.prerequisites
            .iter()
            .chain(&spec.after)
            .filter_map(|name| self.index.get(name).copied())
    }

    fn prerequisite_ids(&self, id: usize) -> impl Iterator<Item = usize> + '_ {
        self.tasks[id]
            .prerequisites
            .iter()
            .filter_map(|name| self.index.get(name).copied())
    }

    fn after_ids(&self, id: usize) -> impl Iterator<Item = usize> + '_ {
        self.tasks[id]
            .after
            .iter()
            .filter_map(|name| self.index.get(name).copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn group(name: &str, deps: &[&str]) -> TaskSpec {
        TaskSpec::new(name, TaskBody::Group).with_prerequisites(deps)
    }

    #[test]
    fn test_duplicate_registration() {
        let mut graph = TaskGraph::new();
        graph.register(group("a", &[])).unwrap();
        assert_eq!(
            graph.register(group("a", &[])),
            Err(GraphError::DuplicateTask("a".to_string()))
        );
    }

    #[test]
    fn test_missing_prerequisite() {
        let mut graph = TaskGraph::new();
        graph.register(group("a", &["ghost"])).unwrap();
        assert_eq!(
            graph.validate(),
            Err(GraphError::MissingPrerequisite {
                task: "a".to_string(),
                missing: "ghost".to_string(),
            })
        );
    }

    #[test]
    fn test_cycle_detected() {
        let mut graph = TaskGraph::new();
        graph.register(group("a", &["b"])).unwrap();
        graph.register(group("b", &["c"])).unwrap();
        graph.register(group("c", &["a"])).unwrap();

        let err = graph.validate().unwrap_err();
        assert_eq!(
            err,
            GraphError::Cycle(vec![
                "a".to_string(),
                "b".to_string(),
                "c".to_string(),
                "a".to_string()
            ])
        );
        assert_eq!(err.to_string(), "task dependency cycle: a -> b -> c -> a");
    }

    #[test]
    fn test_cycle_through_after_edge() {
        let mut graph = TaskGraph::new();
        graph.register(group("a", &["b"])).unwrap();
        graph
            .register(TaskSpec::new("b", TaskBody::Group).with_after(&["a"]))
            .unwrap();
        assert!(matches!(graph.validate(), Err(GraphError::Cycle(_))));
    }

    #[test]
    fn test_unknown_task() {
        let graph = TaskGraph::new();
        assert_eq!(
            graph.plan("nope", Mode::Development).unwrap_err(),
            GraphError::UnknownTask("nope".to_string())
        );
    }
}
