use log::{info, warn};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// Application-wide backend health signal.
///
/// Counts consecutive network/5xx failures across every store; once the count
/// reaches the threshold the service is reported as degraded (the dashboard's
/// server-status banner) until the next successful response.
#[derive(Debug)]
pub struct ServiceHealth {
    consecutive_failures: AtomicU32,
    degraded: AtomicBool,
    threshold: u32,
}

impl ServiceHealth {
    pub fn new(threshold: u32) -> Self {
        Self {
            consecutive_failures: AtomicU32::new(0),
            degraded: AtomicBool::new(false),
            threshold: threshold.max(1),
        }
    }

    pub fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::SeqCst);
        if self.degraded.swap(false, Ordering::SeqCst) {
            info!("backend recovered");
        }
    }

    /// Returns `true` when this failure flipped the service into degraded mode.
    pub fn record_failure(&self) -> bool {
        let failures = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
        if failures >= self.threshold && !self.degraded.swap(true, Ordering::SeqCst) {
            warn!(
                "backend degraded after {} consecutive failures",
                failures
            );
            return true;
        }
        false
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::SeqCst)
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::SeqCst)
    }
}

impl Default for ServiceHealth {
    fn default() -> Self {
        Self::new(2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn degrades_after_threshold_and_recovers() {
        let health = ServiceHealth::default();
        assert!(!health.record_failure());
        assert!(!health.is_degraded());

        assert!(health.record_failure());
        assert!(health.is_degraded());
        assert!(!health.record_failure());
        assert_eq!(health.consecutive_failures(), 3);

        health.record_success();
        assert!(!health.is_degraded());
        assert_eq!(health.consecutive_failures(), 0);
    }

    #[test]
    fn success_between_failures_resets_count() {
        let health = ServiceHealth::new(2);
        health.record_failure();
        health.record_success();
        health.record_failure();
        assert!(!health.is_degraded());
    }
}
