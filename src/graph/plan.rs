//! Execution planning

use std::collections::{HashMap, HashSet};

use super::{GraphError, TaskBody, TaskGraph};
use crate::mode::Mode;

/// An ordered plan for one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionPlan {
    /// Requested task
    pub target: String,

    /// Mode every task of the run observes
    pub mode: Mode,

    /// Task names grouped by level; a level only depends on earlier ones
    pub levels: Vec<Vec<String>>,
}

impl ExecutionPlan {
    /// Number of tasks in the plan
    pub fn len(&self) -> usize {
        self.levels.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Whether a task is part of the plan
    pub fn contains(&self, name: &str) -> bool {
        self.levels.iter().flatten().any(|n| n == name)
    }

    /// Task names in execution order
    pub fn order(&self) -> impl Iterator<Item = &str> {
        self.levels.iter().flatten().map(String::as_str)
    }
}

pub(super) fn build(graph: &TaskGraph, target: usize, base_mode: Mode) -> Result<ExecutionPlan, GraphError> {
    // Transitive prerequisites of the target
    let mut members = HashSet::new();
    let mut stack = vec![target];
    while let Some(id) = stack.pop() {
        if members.insert(id) {
            stack.extend(graph.prerequisite_ids(id));
        }
    }

    let mut levels_of: HashMap<usize, usize> = HashMap::new();
    let mut visiting = Vec::new();
    for &id in &members {
        level_of(graph, id, &members, &mut levels_of, &mut visiting)?;
    }

    let depth = levels_of.values().copied().max().map_or(0, |max| max + 1);
    let mut levels: Vec<Vec<usize>> = vec![Vec::new(); depth];
    for (&id, &level) in &levels_of {
        levels[level].push(id);
    }
    for level in &mut levels {
        level.sort_unstable();
    }

    let mut mode = base_mode;
    for &id in levels.iter().flatten() {
        if let TaskBody::ForceMode(forced) = &graph.tasks[id].body {
            mode = forced.clone();
        }
    }

    Ok(ExecutionPlan {
        target: graph.tasks[target].name.clone(),
        mode,
        levels: levels
            .into_iter()
            .map(|level| level.into_iter().map(|id| graph.tasks[id].name.clone()).collect())
            .collect(),
    })
}

/// Level of a task: one above the highest of its in-plan dependencies
fn level_of(
    graph: &TaskGraph,
    id: usize,
    members: &HashSet<usize>,
    memo: &mut HashMap<usize, usize>,
    visiting: &mut Vec<usize>,
) -> Result<usize, GraphError> {
    if let Some(&level) = memo.get(&id) {
        return Ok(level);
    }
    if let Some(start) = visiting.iter().position(|&v| v == id) {
        let mut cycle: Vec<String> = visiting[start..]
            .iter()
            .map(|&v| graph.tasks[v].name.clone())
            .collect();
        cycle.push(graph.tasks[id].name.clone());
        return Err(GraphError::Cycle(cycle));
    }

    visiting.push(id);
    let deps: Vec<usize> = graph
        .prerequisite_ids(id)
        .chain(graph.after_ids(id).filter(|dep| members.contains(dep)))
        .collect();

    let mut level = 0;
    for dep in deps {
        level = level.max(level_of(graph, dep, members, memo, visiting)? + 1);
    }
    visiting.pop();

    memo.insert(id, level);
    Ok(level)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::TaskSpec;
    use pretty_assertions::assert_eq;

    fn graph() -> TaskGraph {
        let mut graph = TaskGraph::new();
        for spec in [
            TaskSpec::new("envProduction", TaskBody::ForceMode(Mode::Production)),
            TaskSpec::new("clean", TaskBody::Group),
            TaskSpec::new("postcss", TaskBody::Group),
            TaskSpec::new("styles", TaskBody::Group).with_prerequisites(&["postcss"]),
            TaskSpec::new("template", TaskBody::Group),
            TaskSpec::new("copy", TaskBody::Group).with_after(&["clean"]),
            TaskSpec::new("bundle", TaskBody::Group).with_prerequisites(&["styles", "template"]),
            TaskSpec::new("build", TaskBody::Group).with_prerequisites(&[
                "envProduction",
                "clean",
                "styles",
                "copy",
                "bundle",
            ]),
        ] {
            graph.register(spec).unwrap();
        }
        graph.validate().unwrap();
        graph
    }

    #[test]
    fn test_levels_follow_dependencies() {
        let plan = graph().plan("bundle", Mode::Development).unwrap();
        assert_eq!(
            plan.levels,
            vec![
                vec!["postcss".to_string(), "template".to_string()],
                vec!["styles".to_string()],
                vec!["bundle".to_string()],
            ]
        );
        assert_eq!(plan.mode, Mode::Development);
    }

    #[test]
    fn test_shared_prerequisite_planned_once() {
        let plan = graph().plan("build", Mode::Development).unwrap();
        assert_eq!(plan.order().filter(|&n| n == "styles").count(), 1);
        assert_eq!(plan.order().filter(|&n| n == "postcss").count(), 1);
        assert_eq!(plan.len(), 8);
    }

    #[test]
    fn test_force_mode_applies_to_whole_plan() {
        let plan = graph().plan("build", Mode::Development).unwrap();
        assert_eq!(plan.mode, Mode::Production);

        let plan = graph().plan("styles", Mode::Development).unwrap();
        assert_eq!(plan.mode, Mode::Development);
    }

    #[test]
    fn test_after_orders_only_within_plan() {
        let plan = graph().plan("build", Mode::Development).unwrap();
        let position = |name: &str| plan.levels.iter().position(|l| l.iter().any(|n| n == name));
        assert!(position("clean") < position("copy"));

        let plan = graph().plan("copy", Mode::Development).unwrap();
        assert!(!plan.contains("clean"));
        assert_eq!(plan.levels, vec![vec!["copy".to_string()]]);
    }
}
