//! Fetch failure reporting.
//!
//! Collectors report failed volume fetches over a bounded channel. The
//! [`HealthMonitor`] drains it and remembers the latest failure per filer,
//! which the `/health` endpoint turns into a status code.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};
use tokio::sync::mpsc::{self, Receiver, Sender};
use tracing::{debug, info};

/// A failed volume fetch, as reported by a collector.
#[derive(Debug, Clone)]
pub struct FetchFailure {
    pub filer: String,
    pub message: String,
    pub at: Instant,
}

/// Create the channel collectors report failures on.
pub fn channel(capacity: usize) -> (Sender<FetchFailure>, Receiver<FetchFailure>) {
    mpsc::channel(capacity)
}

/// Tracks recent fetch failures per filer.
#[derive(Clone)]
pub struct HealthMonitor {
    window: Duration,
    failures: Arc<RwLock<HashMap<String, FetchFailure>>>,
}

impl HealthMonitor {
    /// Failures older than `window` no longer count as unhealthy.
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            failures: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Drain `rx` until every sender is gone.
    pub async fn run(self, mut rx: Receiver<FetchFailure>) {
        while let Some(failure) = rx.recv().await {
            self.record(failure);
        }
        info!("Fetch failure channel closed");
    }

    pub fn record(&self, failure: FetchFailure) {
        debug!("Recording fetch failure for {}: {}", failure.filer, failure.message);
        self.failures
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(failure.filer.clone(), failure);
    }

    /// Filers with a failure inside the window, with the failure message.
    pub fn failing_filers(&self) -> Vec<(String, String)> {
        let failures = self.failures.read().unwrap_or_else(PoisonError::into_inner);
        let mut failing: Vec<_> = failures
            .values()
            .filter(|f| f.at.elapsed() < self.window)
            .map(|f| (f.filer.clone(), f.message.clone()))
            .collect();
        failing.sort();
        failing
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failure(filer: &str, age: Duration) -> FetchFailure {
        FetchFailure {
            filer: filer.to_string(),
            message: "connection refused".to_string(),
            at: Instant::now() - age,
        }
    }

    #[test]
    fn test_recent_failure_is_unhealthy() {
        let monitor = HealthMonitor::new(Duration::from_secs(60));
        assert!(monitor.failing_filers().is_empty());

        monitor.record(failure("filer-a", Duration::ZERO));
        assert_eq!(monitor.failing_filers().len(), 1);
        assert_eq!(monitor.failing_filers()[0].0, "filer-a");
    }

    #[test]
    fn test_old_failure_is_ignored() {
        let monitor = HealthMonitor::new(Duration::from_secs(60));
        monitor.record(failure("filer-a", Duration::from_secs(120)));
        assert!(monitor.failing_filers().is_empty());
    }

    #[tokio::test]
    async fn test_run_drains_channel() {
        let monitor = HealthMonitor::new(Duration::from_secs(60));
        let (tx, rx) = channel(4);

        tx.send(failure("filer-b", Duration::ZERO)).await.unwrap();
        drop(tx);
        monitor.clone().run(rx).await;

        assert_eq!(monitor.failing_filers().len(), 1);
    }
}
