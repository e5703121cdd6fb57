use std::sync::{Arc, Mutex};
use std::time::Duration;

use once_cell::sync::Lazy;
use serde::Serialize;
use tracing::{info, warn};

/// Serializable snapshot of one pipeline run: the per-step ledger, every
/// advisory warning recorded along the way and the artifact count.
#[derive(Debug, Default, Serialize, Clone)]
pub struct RunSummary {
    pub steps: Vec<StepRecord>,
    pub warnings: Vec<String>,
    pub artifacts_copied: u64,
    pub total_duration_ms: f64,
}

#[derive(Debug, Serialize, Clone)]
pub struct StepRecord {
    pub step: String,
    pub outcome: String,
    pub detail: Option<String>,
    pub duration_ms: f64,
}

/// Shared, thread-safe collector the orchestrator and stages write into.
/// Cloning shares the underlying ledger.
#[derive(Debug, Default, Clone)]
pub struct SummaryCollector {
    inner: Arc<Mutex<RunSummary>>,
}

impl SummaryCollector {
    pub fn global() -> &'static SummaryCollector {
        static INSTANCE: Lazy<SummaryCollector> = Lazy::new(SummaryCollector::new);
        &INSTANCE
    }

    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(RunSummary::default())),
        }
    }

    pub fn record_step(
        &self,
        step: &str,
        outcome: &str,
        detail: Option<String>,
        duration: Duration,
    ) {
        if let Ok(mut guard) = self.inner.lock() {
            guard.steps.push(StepRecord {
                step: step.to_string(),
                outcome: outcome.to_string(),
                detail,
                duration_ms: duration.as_secs_f64() * 1_000.0,
            });
        }
    }

    pub fn record_warning(&self, message: impl Into<String>) {
        let message = message.into();
        warn!("{message}");
        if let Ok(mut guard) = self.inner.lock() {
            guard.warnings.push(message);
        }
    }

    pub fn record_artifacts(&self, count: u64) {
        if let Ok(mut guard) = self.inner.lock() {
            guard.artifacts_copied = count;
        }
    }

    pub fn record_total_duration(&self, duration: Duration) {
        if let Ok(mut guard) = self.inner.lock() {
            guard.total_duration_ms = duration.as_secs_f64() * 1_000.0;
        }
    }

    pub fn snapshot(&self) -> RunSummary {
        self.inner.lock().map(|g| g.clone()).unwrap_or_default()
    }

    pub fn reset(&self) {
        if let Ok(mut guard) = self.inner.lock() {
            *guard = RunSummary::default();
        }
    }
}

/// Emit the human-readable summary: one line per step, then totals.
pub fn log_summary(summary: &RunSummary) {
    for record in &summary.steps {
        info!(
            step = record.step.as_str(),
            outcome = record.outcome.as_str(),
            detail = record.detail.as_deref().unwrap_or(""),
            duration_ms = record.duration_ms,
            "step result"
        );
    }
    info!(
        steps = summary.steps.len(),
        warnings = summary.warnings.len(),
        artifacts_copied = summary.artifacts_copied,
        total_duration_ms = summary.total_duration_ms,
        "run summary"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_recorded_state() {
        let collector = SummaryCollector::new();
        collector.record_step("collect", "success", None, Duration::from_millis(12));
        collector.record_warning("tests failed");
        collector.record_artifacts(3);

        let snapshot = collector.snapshot();
        assert_eq!(snapshot.steps.len(), 1);
        assert_eq!(snapshot.steps[0].step, "collect");
        assert_eq!(snapshot.warnings, vec!["tests failed".to_string()]);
        assert_eq!(snapshot.artifacts_copied, 3);
    }

    #[test]
    fn clones_share_the_ledger() {
        let collector = SummaryCollector::new();
        let clone = collector.clone();
        clone.record_warning("shared");
        assert_eq!(collector.snapshot().warnings.len(), 1);
    }

    #[test]
    fn reset_clears_everything() {
        let collector = SummaryCollector::new();
        collector.record_warning("stale");
        collector.reset();
        assert!(collector.snapshot().warnings.is_empty());
    }
}
