//! Terminal feedback for an ingestion run.
//!
//! Loaders report through the progress protocol (absolute or relative
//! updates of a shared current/max pair). [`LoadProgress`] accumulates those
//! reports in a [`ProgressTracker`] and mirrors them onto a bar. Everything
//! here is a no-op when output is suppressed.

use std::sync::Arc;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use pathweave_core::{ProgressFn, ProgressTracker};

const LOAD_TEMPLATE: &str = "{msg} [{bar:40.cyan/blue}] {percent}% ({elapsed_precise})";
const STAGE_TEMPLATE: &str = "{spinner:.cyan} {msg}";
const DONE_TEMPLATE: &str = "{prefix:.green} {msg}";

/// Loader progress mirrored onto a bar.
pub struct LoadProgress {
    bar: Option<ProgressBar>,
    tracker: Arc<ProgressTracker>,
}

impl LoadProgress {
    pub fn new(message: &str, quiet: bool) -> Self {
        let bar = (!quiet).then(|| {
            let bar = ProgressBar::new(0);
            bar.set_style(
                ProgressStyle::default_bar()
                    .template(LOAD_TEMPLATE)
                    .expect("Invalid load template")
                    .progress_chars("█▓░"),
            );
            bar.set_message(message.to_string());
            bar
        });
        Self::with_bar(bar)
    }

    fn with_bar(bar: Option<ProgressBar>) -> Self {
        Self {
            bar,
            tracker: Arc::new(ProgressTracker::new()),
        }
    }

    /// Callback handed to the engine; may be called from any loader thread.
    pub fn callback(&self) -> ProgressFn {
        let tracker = Arc::clone(&self.tracker);
        let bar = self.bar.clone();
        Arc::new(move |current, max| {
            tracker.report(current, max);
            if let Some(ref bar) = bar {
                bar.set_length(tracker.max().max(0) as u64);
                bar.set_position(tracker.current().max(0) as u64);
            }
        })
    }

    /// Units reported done and expected so far.
    pub fn totals(&self) -> (i64, i64) {
        (self.tracker.current(), self.tracker.max())
    }

    pub fn finish(self) {
        if let Some(bar) = self.bar {
            bar.finish_and_clear();
        }
    }
}

/// Spinner for a stage with no measurable progress.
pub struct Stage(Option<ProgressBar>);

impl Stage {
    pub fn start(message: &str, quiet: bool) -> Self {
        Stage((!quiet).then(|| {
            let bar = ProgressBar::new_spinner();
            bar.set_style(
                ProgressStyle::default_spinner()
                    .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
                    .template(STAGE_TEMPLATE)
                    .expect("Invalid stage template"),
            );
            bar.set_message(message.to_string());
            bar.enable_steady_tick(Duration::from_millis(100));
            bar
        }))
    }

    pub fn done(self, message: &str) {
        if let Some(bar) = self.0 {
            bar.set_style(
                ProgressStyle::default_spinner()
                    .template(DONE_TEMPLATE)
                    .expect("Invalid done template"),
            );
            bar.set_prefix("✓");
            bar.finish_with_message(message.to_string());
        }
    }
}
