// ABOUTME: Progress reporting handed into the copy core by the caller
// ABOUTME: The CLI renders events on one rewritable terminal line with indicatif

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    /// The destination table was polled and is not yet usable (or just became so).
    WaitingForTable { table: String, polls: u32 },
    TableActive { table: String },
    /// Cumulative count after a batch (or retried sub-batch) resolved.
    Copied { copied: u64 },
    Finished { copied: u64 },
    /// Schema-only run ended without copying data.
    SchemaReady { table: String },
}

pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: &ProgressEvent);
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _event: &ProgressEvent) {}
}

pub struct SpinnerReporter {
    bar: ProgressBar,
}

impl SpinnerReporter {
    pub fn new() -> Self {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner:.green} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.enable_steady_tick(Duration::from_millis(120));
        Self { bar }
    }

    #[cfg(test)]
    fn hidden() -> Self {
        Self {
            bar: ProgressBar::hidden(),
        }
    }
}

impl Default for SpinnerReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressReporter for SpinnerReporter {
    fn report(&self, event: &ProgressEvent) {
        match event {
            ProgressEvent::WaitingForTable { table, polls } => {
                let dots = ".".repeat(*polls as usize);
                self.bar
                    .set_message(format!("Creating destination table ({}) {}", table, dots));
            }
            ProgressEvent::TableActive { table } => {
                self.bar.println(format!("Destination table ({}) is active", table));
            }
            ProgressEvent::Copied { copied } => {
                self.bar.set_message(format!("Copied {} items", copied));
            }
            ProgressEvent::Finished { copied } => {
                self.bar.finish_with_message(format!("Copied {} items", copied));
            }
            ProgressEvent::SchemaReady { table } => {
                self.bar
                    .finish_with_message(format!("Destination table ({}) is ready", table));
            }
        }
    }
}
