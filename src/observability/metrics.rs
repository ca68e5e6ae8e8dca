use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crate::domain::Verdict;

/// Metrics registry for the application.
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    /// Total validation requests processed
    pub validations_total: AtomicU64,

    /// Validation requests by outcome
    pub validations_allowed: AtomicU64,
    pub validations_denied: AtomicU64,
    /// Denials tagged as faults (misconfigured rule sets)
    pub validation_faults: AtomicU64,

    /// Validation latency buckets (microseconds)
    pub latency_under_1ms: AtomicU64,
    pub latency_1_5ms: AtomicU64,
    pub latency_5_10ms: AtomicU64,
    pub latency_10_50ms: AtomicU64,
    pub latency_50_100ms: AtomicU64,
    pub latency_over_100ms: AtomicU64,

    /// Rule nodes visited
    pub rules_evaluated_total: AtomicU64,

    /// Buffer ingestion
    pub buffer_writes_total: AtomicU64,
    pub buffer_bytes_total: AtomicU64,
    pub buffers_reclaimed_total: AtomicU64,

    /// Commits
    pub commits_total: AtomicU64,
    pub commit_errors: AtomicU64,

    /// Rule-set file reloads
    pub reloads_total: AtomicU64,
    pub reload_errors: AtomicU64,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        MetricsRegistry::default()
    }

    /// Record a validation outcome.
    pub fn record_validation(&self, verdict: &Verdict) {
        self.validations_total.fetch_add(1, Ordering::Relaxed);
        self.rules_evaluated_total
            .fetch_add(verdict.rules_evaluated as u64, Ordering::Relaxed);

        if verdict.allowed {
            self.validations_allowed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.validations_denied.fetch_add(1, Ordering::Relaxed);
            if verdict.is_fault() {
                self.validation_faults.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Record validation latency.
    pub fn record_latency(&self, start: Instant) {
        let micros = start.elapsed().as_micros() as u64;

        if micros < 1000 {
            self.latency_under_1ms.fetch_add(1, Ordering::Relaxed);
        } else if micros < 5000 {
            self.latency_1_5ms.fetch_add(1, Ordering::Relaxed);
        } else if micros < 10000 {
            self.latency_5_10ms.fetch_add(1, Ordering::Relaxed);
        } else if micros < 50000 {
            self.latency_10_50ms.fetch_add(1, Ordering::Relaxed);
        } else if micros < 100000 {
            self.latency_50_100ms.fetch_add(1, Ordering::Relaxed);
        } else {
            self.latency_over_100ms.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record a buffer chunk write.
    pub fn record_buffer_write(&self, bytes: usize) {
        self.buffer_writes_total.fetch_add(1, Ordering::Relaxed);
        self.buffer_bytes_total
            .fetch_add(bytes as u64, Ordering::Relaxed);
    }

    /// Record reclaimed stale buffers.
    pub fn record_reclaimed(&self, count: usize) {
        self.buffers_reclaimed_total
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    /// Record a commit attempt.
    pub fn record_commit(&self, success: bool) {
        self.commits_total.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.commit_errors.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record a rule-set file reload.
    pub fn record_reload(&self, success: bool) {
        self.reloads_total.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.reload_errors.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Export metrics in Prometheus format.
    pub fn to_prometheus(&self) -> String {
        format!(
            r#"# HELP authr_validations_total Total number of validation requests
# TYPE authr_validations_total counter
authr_validations_total {}

# HELP authr_validations Validation requests by outcome
# TYPE authr_validations counter
authr_validations{{outcome="allow"}} {}
authr_validations{{outcome="deny"}} {}
authr_validations{{outcome="fault"}} {}

# HELP authr_validation_latency_bucket Validation latency histogram
# TYPE authr_validation_latency_bucket counter
authr_validation_latency_bucket{{le="0.001"}} {}
authr_validation_latency_bucket{{le="0.005"}} {}
authr_validation_latency_bucket{{le="0.01"}} {}
authr_validation_latency_bucket{{le="0.05"}} {}
authr_validation_latency_bucket{{le="0.1"}} {}
authr_validation_latency_bucket{{le="+Inf"}} {}

# HELP authr_rules_evaluated_total Total rule nodes visited
# TYPE authr_rules_evaluated_total counter
authr_rules_evaluated_total {}

# HELP authr_buffer_writes_total Total buffer chunk writes
# TYPE authr_buffer_writes_total counter
authr_buffer_writes_total {}

# HELP authr_buffer_bytes_total Total bytes staged into buffers
# TYPE authr_buffer_bytes_total counter
authr_buffer_bytes_total {}

# HELP authr_buffers_reclaimed_total Stale buffers reclaimed
# TYPE authr_buffers_reclaimed_total counter
authr_buffers_reclaimed_total {}

# HELP authr_commits_total Rule set commit attempts
# TYPE authr_commits_total counter
authr_commits_total {}

# HELP authr_commit_errors_total Rule set commit errors
# TYPE authr_commit_errors_total counter
authr_commit_errors_total {}

# HELP authr_reloads_total Rule set file reload attempts
# TYPE authr_reloads_total counter
authr_reloads_total {}

# HELP authr_reload_errors_total Rule set file reload errors
# TYPE authr_reload_errors_total counter
authr_reload_errors_total {}
"#,
            self.validations_total.load(Ordering::Relaxed),
            self.validations_allowed.load(Ordering::Relaxed),
            self.validations_denied.load(Ordering::Relaxed),
            self.validation_faults.load(Ordering::Relaxed),
            self.latency_under_1ms.load(Ordering::Relaxed),
            self.latency_1_5ms.load(Ordering::Relaxed),
            self.latency_5_10ms.load(Ordering::Relaxed),
            self.latency_10_50ms.load(Ordering::Relaxed),
            self.latency_50_100ms.load(Ordering::Relaxed),
            self.latency_over_100ms.load(Ordering::Relaxed),
            self.rules_evaluated_total.load(Ordering::Relaxed),
            self.buffer_writes_total.load(Ordering::Relaxed),
            self.buffer_bytes_total.load(Ordering::Relaxed),
            self.buffers_reclaimed_total.load(Ordering::Relaxed),
            self.commits_total.load(Ordering::Relaxed),
            self.commit_errors.load(Ordering::Relaxed),
            self.reloads_total.load(Ordering::Relaxed),
            self.reload_errors.load(Ordering::Relaxed),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Denial;

    #[test]
    fn test_record_validation() {
        let registry = MetricsRegistry::new();

        registry.record_validation(&Verdict::allow(3));
        registry.record_validation(&Verdict::deny(Denial::policy("amount", "too big"), 2));
        registry.record_validation(&Verdict::deny(Denial::cycle("a"), 4));

        assert_eq!(registry.validations_total.load(Ordering::Relaxed), 3);
        assert_eq!(registry.validations_allowed.load(Ordering::Relaxed), 1);
        assert_eq!(registry.validations_denied.load(Ordering::Relaxed), 2);
        assert_eq!(registry.validation_faults.load(Ordering::Relaxed), 1);
        assert_eq!(registry.rules_evaluated_total.load(Ordering::Relaxed), 9);
    }

    #[test]
    fn test_prometheus_export() {
        let registry = MetricsRegistry::new();
        registry.record_buffer_write(128);
        registry.record_commit(true);
        registry.record_commit(false);

        let text = registry.to_prometheus();
        assert!(text.contains("authr_buffer_bytes_total 128"));
        assert!(text.contains("authr_commits_total 2"));
        assert!(text.contains("authr_commit_errors_total 1"));
    }
}
