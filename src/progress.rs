//! # Progress Tracking and Statistics Module
//!
//! Questo modulo gestisce il progress tracking e le statistiche di un run di publish.
//!
//! ## Componenti principali:
//! - `ProgressManager`: progress bar `indicatif` con messaggio per ogni asset
//! - `PublishStats`: conteggio degli esiti (`PublishOutcome`) e byte risparmiati
//!
//! ## Visual feedback:
//! ```text
//! ⠋ [00:00:04] [========================================] 42/42 (100%) logo.png: optimized 48.1%
//! ```

use crate::optimizer::PublishOutcome;
use crate::utils::{format_size, reduction_percent};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Manages the progress bar of a publish run
#[derive(Clone)]
pub struct ProgressManager {
    bar: ProgressBar,
}

impl ProgressManager {
    pub fn new(total: u64) -> Self {
        let bar = ProgressBar::new(total);

        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}")
            .map(|style| style.progress_chars("=>-"))
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        bar.set_style(style);
        bar.enable_steady_tick(Duration::from_millis(100));

        Self { bar }
    }

    /// Advance by one and show `message`
    pub fn update(&self, message: &str) {
        self.bar.inc(1);
        self.bar.set_message(message.to_string());
    }

    pub fn set_message(&self, message: &str) {
        self.bar.set_message(message.to_string());
    }

    pub fn finish(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }
}

/// Counts of publish outcomes over one run
#[derive(Debug, Default, Clone, PartialEq)]
pub struct PublishStats {
    pub published: usize,
    pub optimized: usize,
    pub cached: usize,
    pub staged: usize,
    pub passthrough: usize,
    pub fallbacks: usize,
    pub errors: usize,
    pub total_original_size: u64,
    pub total_bytes_saved: u64,
}

impl PublishStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, outcome: &PublishOutcome) {
        self.published += 1;
        match outcome {
            PublishOutcome::Optimized {
                original_size,
                optimized_size,
            } => {
                self.optimized += 1;
                self.total_original_size += original_size;
                self.total_bytes_saved += original_size.saturating_sub(*optimized_size);
            }
            PublishOutcome::Cached { .. } => self.cached += 1,
            PublishOutcome::AlreadyStaged => self.staged += 1,
            PublishOutcome::NotApplicable => self.passthrough += 1,
            PublishOutcome::FailedFallback => self.fallbacks += 1,
        }
    }

    pub fn add_error(&mut self) {
        self.errors += 1;
    }

    pub fn overall_reduction_percent(&self) -> f64 {
        reduction_percent(
            self.total_original_size,
            self.total_original_size - self.total_bytes_saved,
        )
    }

    pub fn format_summary(&self) -> String {
        format!(
            "Published: {} | Optimized: {} | Cached: {} | Passthrough: {} | Fallback: {} | Errors: {} | Saved: {} ({:.2}%)",
            self.published,
            self.optimized,
            self.cached + self.staged,
            self.passthrough,
            self.fallbacks,
            self.errors,
            format_size(self.total_bytes_saved),
            self.overall_reduction_percent()
        )
    }
}

/// One-line description of an outcome for the progress bar
pub fn describe(filename: &str, outcome: &PublishOutcome) -> String {
    match outcome {
        PublishOutcome::Optimized {
            original_size,
            optimized_size,
        } => format!(
            "{}: optimized {:.1}%",
            filename,
            reduction_percent(*original_size, *optimized_size)
        ),
        PublishOutcome::Cached { .. } | PublishOutcome::AlreadyStaged => format!("{}: cached", filename),
        PublishOutcome::NotApplicable => format!("{}: published", filename),
        PublishOutcome::FailedFallback => format!("{}: optimizer failed, original published", filename),
    }
}
