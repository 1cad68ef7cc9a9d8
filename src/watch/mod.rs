//! Watch coordinator
//!
//! Maps file changes to live-reload notifications and task reruns. Each
//! configured subscription is independent: one change may reload the
//! browser and rerun several tasks at once.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use colored::Colorize;
use dashmap::DashMap;
use globset::GlobSet;
use notify::RecursiveMode;
use notify_debouncer_mini::new_debouncer;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use crate::config::{Config, WatchConfig};
use crate::mode::Mode;
use crate::pipeline::{compile_globset, expand_excluding, relative_key};
use crate::runner::Runner;
use crate::server::ReloadHandle;
use crate::utils::{display_path, hash_content};

/// Debounce window for file events
const DEBOUNCE: Duration = Duration::from_millis(100);

/// A compiled watch subscription
struct Subscription {
    config: WatchConfig,
    include: GlobSet,
    exclude: GlobSet,
}

impl Subscription {
    fn matches(&self, key: &str) -> bool {
        self.include.is_match(key) && !self.exclude.is_match(key)
    }
}

/// What a change triggered
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Dispatch {
    /// Live-reload clients were notified
    pub reloaded: bool,

    /// Tasks to rerun, without duplicates
    pub tasks: Vec<String>,
}

impl Dispatch {
    pub fn is_empty(&self) -> bool {
        !self.reloaded && self.tasks.is_empty()
    }
}

/// Reacts to file changes under the project root
pub struct WatchCoordinator {
    config: Arc<Config>,
    subscriptions: Vec<Subscription>,
    runner: Runner,
    mode: Mode,
    reload: Option<ReloadHandle>,

    /// Last seen content hash per file, to skip events that changed nothing
    hashes: DashMap<PathBuf, Option<String>>,
}

impl WatchCoordinator {
    /// Create a coordinator. Reruns use `mode`, the mode of the watch run.
    pub fn new(config: Arc<Config>, runner: Runner, mode: Mode, reload: Option<ReloadHandle>) -> Result<Self> {
        let mut subscriptions = Vec::with_capacity(config.watches.len());
        for watch in &config.watches {
            for task in &watch.tasks {
                if runner.graph().get(task).is_none() {
                    anyhow::bail!("watch triggers undefined task '{}'", task);
                }
            }
            subscriptions.push(Subscription {
                include: compile_globset(&watch.patterns)?,
                exclude: compile_globset(&watch.exclude)?,
                config: watch.clone(),
            });
        }

        Ok(Self {
            config,
            subscriptions,
            runner,
            mode,
            reload,
            hashes: DashMap::new(),
        })
    }

    /// Record the current content of every watched file
    pub fn prime(&self) -> Result<()> {
        for sub in &self.subscriptions {
            for path in expand_excluding(&self.config.root, &sub.config.patterns, &sub.config.exclude)? {
                let hash = file_hash(&path);
                self.hashes.insert(path, hash);
            }
        }
        debug!("Tracking {} file(s)", self.hashes.len());
        Ok(())
    }

    /// Whether the file content differs from the last time it was seen
    pub fn content_changed(&self, path: &Path) -> bool {
        let hash = file_hash(path);
        match self.hashes.insert(path.to_path_buf(), hash.clone()) {
            Some(previous) => previous != hash,
            None => true,
        }
    }

    /// Notify clients and collect the tasks a change triggers
    pub fn dispatch(&self, path: &Path) -> Dispatch {
        let Some(key) = relative_key(&self.config.root, path) else {
            return Dispatch::default();
        };

        let mut dispatch = Dispatch::default();
        for sub in self.subscriptions.iter().filter(|s| s.matches(&key)) {
            if sub.config.reload {
                dispatch.reloaded = true;
            }
            for task in &sub.config.tasks {
                if !dispatch.tasks.contains(task) {
                    dispatch.tasks.push(task.clone());
                }
            }
        }

        if dispatch.reloaded {
            eprintln!(
                "  {} File changed: {}",
                "↻".yellow(),
                display_path(path, &self.config.root).dimmed()
            );
            if let Some(reload) = &self.reload {
                reload.changed(&path.display().to_string());
            }
        }

        dispatch
    }

    /// Whether any subscription covers `path`
    pub fn is_watched(&self, path: &Path) -> bool {
        relative_key(&self.config.root, path).is_some_and(|key| self.subscriptions.iter().any(|s| s.matches(&key)))
    }

    /// Handle one changed path: dispatch it and start the task reruns
    pub fn handle_change(&self, path: &Path) -> Dispatch {
        // Only watched files are hashed, so build outputs never enter the cache
        if !self.is_watched(path) {
            return Dispatch::default();
        }
        if !self.content_changed(path) {
            debug!("Unchanged: {}", path.display());
            return Dispatch::default();
        }

        let dispatch = self.dispatch(path);
        for task in &dispatch.tasks {
            let runner = self.runner.clone();
            let mode = self.mode.clone();
            let task = task.clone();
            tokio::spawn(async move {
                if let Err(e) = runner.run(&task, mode).await {
                    error!("{:#}", e);
                }
            });
        }
        dispatch
    }

    /// Watch the project root until the process stops
    pub async fn run(self) -> Result<()> {
        self.prime()?;

        let (event_tx, mut event_rx) = mpsc::unbounded_channel::<PathBuf>();
        let (tx, rx) = std::sync::mpsc::channel();
        let mut debouncer = new_debouncer(DEBOUNCE, tx)?;
        debouncer
            .watcher()
            .watch(&self.config.root, RecursiveMode::Recursive)?;

        // The debouncer is moved into the thread to keep it alive
        std::thread::spawn(move || {
            let _debouncer = debouncer;
            loop {
                match rx.recv() {
                    Ok(Ok(events)) => {
                        for event in events {
                            if event_tx.send(event.path).is_err() {
                                return;
                            }
                        }
                    }
                    Ok(Err(e)) => warn!("Watch error: {:?}", e),
                    Err(_) => return,
                }
            }
        });

        while let Some(path) = event_rx.recv().await {
            self.handle_change(&path);
        }

        Ok(())
    }
}

fn file_hash(path: &Path) -> Option<String> {
    std::fs::read(path).ok().map(|content| hash_content(&content))
}
