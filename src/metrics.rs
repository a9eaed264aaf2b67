// Run counters for a single process.
//
// Lock-free tallies of export, lookup, and UI activity. The GUI process logs
// them once at shutdown; nothing here is persisted.

use std::sync::LazyLock;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

static GLOBAL: LazyLock<Metrics> = LazyLock::new(Metrics::new);

/// Process-wide metrics instance.
///
/// Workers are separate processes with their own instance; the GUI process
/// folds their results in when outcomes arrive over the wire.
pub fn global() -> &'static Metrics {
    &GLOBAL
}

/// Counters covering one process lifetime, updated with relaxed atomics so
/// hot paths never take a lock.
#[derive(Debug)]
pub struct Metrics {
    /// Projects fully processed, whatever the per-crop results were
    pub projects_completed: AtomicUsize,

    /// Map crops successfully exported
    pub crops_exported: AtomicUsize,

    /// Map crops that failed to render
    pub crops_failed: AtomicUsize,

    /// Map crops skipped because the file was already on disk
    pub crops_skipped: AtomicUsize,

    /// Wall-clock export time across all runs, in milliseconds
    pub total_export_time_ms: AtomicU64,

    /// Web service requests issued
    pub http_requests: AtomicU64,

    /// Browser screenshots captured
    pub browser_captures: AtomicU64,

    /// Mutations applied to the shared application state
    pub state_updates: AtomicU64,

    /// Refreshes queued to the Slint event loop
    pub ui_updates: AtomicU64,

    /// Refreshes dropped because the UI queue was full
    pub ui_update_channel_full: AtomicU64,

    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            projects_completed: AtomicUsize::new(0),
            crops_exported: AtomicUsize::new(0),
            crops_failed: AtomicUsize::new(0),
            crops_skipped: AtomicUsize::new(0),
            total_export_time_ms: AtomicU64::new(0),
            http_requests: AtomicU64::new(0),
            browser_captures: AtomicU64::new(0),
            state_updates: AtomicU64::new(0),
            ui_updates: AtomicU64::new(0),
            ui_update_channel_full: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Fold in the crop tallies of one fully processed project.
    pub fn record_project_outcome(&self, exported: usize, failed: usize, skipped: usize) {
        self.projects_completed.fetch_add(1, Ordering::Relaxed);
        self.crops_exported.fetch_add(exported, Ordering::Relaxed);
        self.crops_failed.fetch_add(failed, Ordering::Relaxed);
        self.crops_skipped.fetch_add(skipped, Ordering::Relaxed);
    }

    /// Add the wall-clock time of a finished export run.
    pub fn record_export_time(&self, duration: Duration) {
        self.total_export_time_ms
            .fetch_add(duration.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn record_http_request(&self) {
        self.http_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_browser_capture(&self) {
        self.browser_captures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_state_update(&self) {
        self.state_updates.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_ui_update(&self) {
        self.ui_updates.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_ui_channel_full(&self) {
        self.ui_update_channel_full.fetch_add(1, Ordering::Relaxed);
    }

    /// Time since the process started.
    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Mean export time per project in milliseconds, zero before any project
    /// has finished.
    pub fn avg_project_time_ms(&self) -> f64 {
        let total = self.total_export_time_ms.load(Ordering::Relaxed) as f64;
        match self.projects_completed.load(Ordering::Relaxed) {
            0 => 0.0,
            count => total / count as f64,
        }
    }

    /// Write every counter to the log, called once on shutdown.
    pub fn log_summary(&self) {
        tracing::info!("=== Session counters ===");
        tracing::info!(uptime_secs = self.uptime().as_secs(), "Session length");
        tracing::info!(
            "Projects: {} processed ({} crops exported, {} failed, {} skipped)",
            self.projects_completed.load(Ordering::Relaxed),
            self.crops_exported.load(Ordering::Relaxed),
            self.crops_failed.load(Ordering::Relaxed),
            self.crops_skipped.load(Ordering::Relaxed)
        );
        tracing::info!(
            "Export time: {:.2}s total, {:.2}ms mean per project",
            self.total_export_time_ms.load(Ordering::Relaxed) as f64 / 1000.0,
            self.avg_project_time_ms()
        );
        tracing::info!(
            "Web requests: {}, browser captures: {}",
            self.http_requests.load(Ordering::Relaxed),
            self.browser_captures.load(Ordering::Relaxed)
        );
        tracing::info!(
            "State updates: {}, UI updates: {}, UI drops: {}",
            self.state_updates.load(Ordering::Relaxed),
            self.ui_updates.load(Ordering::Relaxed),
            self.ui_update_channel_full.load(Ordering::Relaxed)
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_counters_start_at_zero() {
        let metrics = Metrics::new();
        assert_eq!(metrics.projects_completed.load(Ordering::Relaxed), 0);
        assert_eq!(metrics.crops_failed.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_record_project_outcomes() {
        let metrics = Metrics::new();

        metrics.record_project_outcome(2, 0, 0);
        metrics.record_project_outcome(1, 1, 0);
        metrics.record_project_outcome(0, 0, 2);

        assert_eq!(metrics.projects_completed.load(Ordering::Relaxed), 3);
        assert_eq!(metrics.crops_exported.load(Ordering::Relaxed), 3);
        assert_eq!(metrics.crops_failed.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.crops_skipped.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn test_record_export_time() {
        let metrics = Metrics::new();

        metrics.record_project_outcome(2, 0, 0);
        metrics.record_export_time(Duration::from_millis(100));
        metrics.record_project_outcome(2, 0, 0);
        metrics.record_export_time(Duration::from_millis(200));

        assert_eq!(metrics.total_export_time_ms.load(Ordering::Relaxed), 300);
        assert_eq!(metrics.avg_project_time_ms(), 150.0);
    }

    #[test]
    fn test_avg_project_time_no_projects() {
        let metrics = Metrics::new();
        assert_eq!(metrics.avg_project_time_ms(), 0.0);
    }

    #[test]
    fn test_uptime_advances() {
        let metrics = Metrics::new();
        thread::sleep(Duration::from_millis(10));
        assert!(metrics.uptime().as_millis() >= 10);
    }

    #[test]
    fn test_activity_counters() {
        let metrics = Metrics::new();

        metrics.record_http_request();
        metrics.record_browser_capture();
        metrics.record_state_update();
        metrics.record_ui_update();
        metrics.record_ui_channel_full();

        assert_eq!(metrics.http_requests.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.browser_captures.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.state_updates.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.ui_updates.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.ui_update_channel_full.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_global_instance_is_shared() {
        let before = global().state_updates.load(Ordering::Relaxed);
        global().record_state_update();
        assert!(global().state_updates.load(Ordering::Relaxed) > before);
    }
}
