//! Themeforge library
//!
//! Task graph, asset pipelines and live reload behind the `themeforge` CLI.

pub mod cli;
pub mod config;
pub mod graph;
pub mod mode;
pub mod notify;
pub mod pipeline;
pub mod runner;
pub mod server;
pub mod tasks;
pub mod utils;
pub mod watch;

pub use cli::Cli;
pub use config::Config;
pub use graph::{ExecutionPlan, TaskGraph, TaskSpec};
pub use mode::Mode;
pub use runner::{Runner, Task, TaskContext, TaskOutcome};
