//! Spinner that follows generation events.

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

use studyqa_core::{GenerationEvent, GenerationObserver};

/// CLI observer using an indicatif spinner.
pub(crate) struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    pub(crate) fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        // Template is a literal; a parse failure falls back to the default style.
        if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
            spinner.set_style(
                style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
            );
        }
        spinner.enable_steady_tick(Duration::from_millis(80));
        Self { spinner }
    }

    pub(crate) fn set_message(&self, msg: impl Into<String>) {
        self.spinner.set_message(msg.into());
    }

    pub(crate) fn finish(&self) {
        self.spinner.finish_and_clear();
    }
}

impl GenerationObserver for CliProgress {
    fn on_event(&self, event: &GenerationEvent) {
        match event {
            GenerationEvent::Started {
                content_version, ..
            } => {
                self.set_message(format!(
                    "Generating questions for content {}",
                    content_version.short()
                ));
            }
            GenerationEvent::Discarded { .. } => {
                self.set_message("Content changed, waiting for the newer attempt");
            }
            GenerationEvent::Succeeded { .. }
            | GenerationEvent::Partial { .. }
            | GenerationEvent::Failed { .. }
            | GenerationEvent::Skipped { .. } => self.finish(),
        }
    }
}
