//! Progress reporting for batch registration.
//!
//! Interactive runs get an indicatif bar; log-only runs hide the bar and emit
//! periodic `tracing` lines instead, which keeps output tail-friendly.

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::info;

use crate::request::RegisterOutcome;

/// Global flag for log-only mode (set from args in main)
pub static LOG_ONLY: AtomicBool = AtomicBool::new(false);

pub fn set_log_only(value: bool) {
    LOG_ONLY.store(value, Ordering::Relaxed);
}

pub fn is_log_only() -> bool {
    LOG_ONLY.load(Ordering::Relaxed)
}

/// Format duration in human-readable format
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs_f64();
    if secs < 60.0 {
        format!("{:.1}s", secs)
    } else {
        format!("{:.1}m", secs / 60.0)
    }
}

/// Final counts for a batch run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub registered: u64,
    pub no_lyrics: u64,
    pub already: u64,
    pub failed: u64,
    /// Requests that errored before reaching the store.
    pub errors: u64,
}

impl BatchSummary {
    pub fn total(&self) -> u64 {
        self.registered + self.no_lyrics + self.already + self.failed + self.errors
    }

    pub fn has_failures(&self) -> bool {
        self.failed + self.errors > 0
    }
}

/// Thread-safe tracker shared by the rayon workers of a batch run.
pub struct BatchProgress {
    bar: ProgressBar,
    total: u64,
    interval: u64,
    started: Instant,
    registered: AtomicU64,
    no_lyrics: AtomicU64,
    already: AtomicU64,
    failed: AtomicU64,
    errors: AtomicU64,
}

impl BatchProgress {
    pub fn new(total: u64, msg: &str) -> Self {
        let bar = ProgressBar::new(total);
        if is_log_only() {
            bar.set_draw_target(ProgressDrawTarget::hidden());
        } else if let Ok(style) = ProgressStyle::default_bar()
            .template("{msg} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec}, ETA: {eta})")
        {
            bar.set_style(style.progress_chars("=> "));
        }
        bar.set_message(msg.to_string());

        Self {
            bar,
            total,
            interval: (total / 20).max(1),
            started: Instant::now(),
            registered: AtomicU64::new(0),
            no_lyrics: AtomicU64::new(0),
            already: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            errors: AtomicU64::new(0),
        }
    }

    pub fn record(&self, outcome: RegisterOutcome) {
        let counter = match outcome {
            RegisterOutcome::Registered => &self.registered,
            RegisterOutcome::NoLyrics => &self.no_lyrics,
            RegisterOutcome::Already => &self.already,
            RegisterOutcome::Failed => &self.failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        self.tick();
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
        self.tick();
    }

    fn tick(&self) {
        self.bar.inc(1);
        let current = self.bar.position();
        if is_log_only() && (current % self.interval == 0 || current == self.total) {
            let pct = 100.0 * current as f64 / self.total.max(1) as f64;
            info!("[batch] {}/{} ({:.1}%)", current, self.total, pct);
        }
    }

    pub fn summary(&self) -> BatchSummary {
        BatchSummary {
            registered: self.registered.load(Ordering::Relaxed),
            no_lyrics: self.no_lyrics.load(Ordering::Relaxed),
            already: self.already.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }

    pub fn finish(&self) -> BatchSummary {
        self.bar.finish_and_clear();
        let summary = self.summary();
        info!(
            "Batch finished in {}: {} registered, {} without lyrics, {} already present, {} failed, {} errors",
            format_duration(self.started.elapsed()),
            summary.registered,
            summary.no_lyrics,
            summary.already,
            summary.failed,
            summary.errors
        );
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(1500)), "1.5s");
        assert_eq!(format_duration(Duration::from_secs(90)), "1.5m");
    }

    #[test]
    fn test_counts_each_outcome() {
        let progress = BatchProgress::new(5, "test");
        progress.record(RegisterOutcome::Registered);
        progress.record(RegisterOutcome::Registered);
        progress.record(RegisterOutcome::NoLyrics);
        progress.record(RegisterOutcome::Failed);
        progress.record_error();

        let summary = progress.finish();
        assert_eq!(
            summary,
            BatchSummary {
                registered: 2,
                no_lyrics: 1,
                already: 0,
                failed: 1,
                errors: 1,
            }
        );
        assert_eq!(summary.total(), 5);
        assert!(summary.has_failures());
    }

    #[test]
    fn test_parallel_updates() {
        use rayon::prelude::*;

        let progress = BatchProgress::new(100, "test");
        (0..100).into_par_iter().for_each(|_| progress.record(RegisterOutcome::Already));
        assert_eq!(progress.summary().already, 100);
        assert!(!progress.summary().has_failures());
    }
}
