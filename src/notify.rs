//! Build notifications and the compile error handler

use std::fmt;

use colored::Colorize;
use parking_lot::Mutex;
use tracing::error;

use crate::runner::TaskOutcome;

/// Title of notifications raised for failed style compiles
pub const COMPILE_ERROR_TITLE: &str = "Compile Error";

/// A user-facing notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub message: String,
}

/// Destination for user-facing notifications
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Prints notifications to stderr
#[derive(Debug, Default)]
pub struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn notify(&self, notification: Notification) {
        eprintln!(
            "\n  {} {}\n  {}\n",
            "✗".red().bold(),
            notification.title.red().bold(),
            notification.message
        );
    }
}

/// Keeps notifications in memory
#[derive(Debug, Default)]
pub struct CapturingNotifier {
    received: Mutex<Vec<Notification>>,
}

impl CapturingNotifier {
    pub fn notifications(&self) -> Vec<Notification> {
        self.received.lock().clone()
    }
}

impl Notifier for CapturingNotifier {
    fn notify(&self, notification: Notification) {
        self.received.lock().push(notification);
    }
}

/// Turns a pipeline error into a notification and a degraded outcome
pub struct ErrorHandler<'a> {
    title: &'a str,
    notifier: &'a dyn Notifier,
}

impl<'a> ErrorHandler<'a> {
    pub fn new(title: &'a str, notifier: &'a dyn Notifier) -> Self {
        Self { title, notifier }
    }

    /// Handler used by the style transform
    pub fn compile_errors(notifier: &'a dyn Notifier) -> Self {
        Self::new(COMPILE_ERROR_TITLE, notifier)
    }

    /// Report the error and let the task finish
    pub fn handle<E: fmt::Display>(&self, err: &E) -> TaskOutcome {
        let message = err.to_string();
        error!("{}: {}", self.title, message);
        self.notifier.notify(Notification {
            title: self.title.to_string(),
            message: message.clone(),
        });
        TaskOutcome::Degraded(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_notifies_and_degrades() {
        let notifier = CapturingNotifier::default();
        let outcome = ErrorHandler::compile_errors(&notifier).handle(&"unexpected token");

        assert_eq!(outcome, TaskOutcome::Degraded("unexpected token".to_string()));
        assert_eq!(
            notifier.notifications(),
            vec![Notification {
                title: "Compile Error".to_string(),
                message: "unexpected token".to_string(),
            }]
        );
    }
}
