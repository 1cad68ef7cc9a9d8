//! Task listing

use colored::Colorize;

use crate::graph::{TaskBody, TaskGraph};

/// Print every task with its prerequisites
pub fn print_tasks(graph: &TaskGraph) {
    let width = graph.tasks().iter().map(|t| t.name.len()).max().unwrap_or(0);

    println!("\n{}", "Tasks:".bold());
    for spec in graph.tasks() {
        let mut line = format!("  {}  {}", format!("{:<width$}", spec.name, width = width).cyan(), spec.description);
        if !spec.prerequisites.is_empty() {
            line.push_str(&format!(" {}", format!("[{}]", spec.prerequisites.join(", ")).dimmed()));
        }
        if let TaskBody::ForceMode(mode) = &spec.body {
            line.push_str(&format!(" {}", format!("(mode: {})", mode).yellow()));
        }
        println!("{}", line);
    }
    println!();
}
