//! User-facing failure surfacing.
//!
//! Renders the configured notification descriptor for failures that must
//! not abort an interactive session (style compile errors, lint findings
//! during watch).

use colored::Colorize;

use crate::config::Notification;
use crate::error::Error;

pub struct Notifier {
    descriptor: Notification,
}

impl Notifier {
    pub fn new(descriptor: Notification) -> Self {
        Self { descriptor }
    }

    /// Render the descriptor templates for a failed task and surface the
    /// result on stderr.
    pub fn notify_failure(&self, task: &str, error: &Error) {
        let title = render(&self.descriptor.title, task, error);
        let message = render(&self.descriptor.message, task, error);
        eprintln!("{} {}", "!".yellow().bold(), title.bold());
        eprintln!("  {}", message.dimmed());
    }
}

fn render(template: &str, task: &str, error: &Error) -> String {
    template
        .replace("{task}", task)
        .replace("{error}", &error.to_string())
}
