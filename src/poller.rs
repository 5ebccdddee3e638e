//! Bounded-retry discovery of run reports.
//!
//! Batch execution is fire-and-forget from the triggering caller's
//! perspective; asynchronous callers (bot integrations) poll the last
//! report per test id until something appears or the attempt budget is
//! exhausted. Transient storage failures are retried on the same cadence
//! rather than aborting the wait.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config;
use crate::model::Report;
use crate::store::Storage;

/// Polling cadence and budget
#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Interval between poll attempts
    pub interval: Duration,
    /// Maximum number of attempts before giving up
    pub max_attempts: u32,
}

impl Default for PollerConfig {
    fn default() -> Self {
        let settings = &config::get().poller;
        Self {
            interval: Duration::from_secs(settings.interval_secs),
            max_attempts: settings.max_attempts,
        }
    }
}

impl PollerConfig {
    /// Create a config with an explicit cadence and budget
    pub fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts,
        }
    }
}

/// Outcome of a bounded wait for reports
#[derive(Debug, Clone)]
pub enum PollOutcome {
    /// At least one report exists for the requested tests.
    ///
    /// Partial results are an accepted outcome: the poller does not wait
    /// for every test in the set to finish.
    Ready(Vec<Report>),
    /// The attempt budget was exhausted without any report appearing
    TimedOut,
}

impl PollOutcome {
    /// Whether reports were found
    pub fn is_ready(&self) -> bool {
        matches!(self, PollOutcome::Ready(_))
    }
}

/// Polls for the last report per test id at a fixed interval.
pub struct ReportPoller {
    store: Arc<dyn Storage>,
    config: PollerConfig,
}

impl ReportPoller {
    /// Create a poller with the configured default cadence
    pub fn new(store: Arc<dyn Storage>) -> Self {
        Self {
            store,
            config: PollerConfig::default(),
        }
    }

    /// Create a poller with an explicit config
    pub fn with_config(store: Arc<dyn Storage>, config: PollerConfig) -> Self {
        Self { store, config }
    }

    /// Wait until at least one report exists for the given tests.
    ///
    /// Returns [`PollOutcome::TimedOut`] once the attempt budget is
    /// exhausted; the wait is a plain future, so callers needing
    /// cancellation can select against a shutdown signal or wrap it in
    /// `tokio::time::timeout`.
    pub async fn wait_for_reports(&self, test_ids: &[String]) -> PollOutcome {
        for attempt in 1..=self.config.max_attempts {
            match self.store.last_reports(test_ids).await {
                Ok(reports) if !reports.is_empty() => {
                    info!(
                        attempt,
                        count = reports.len(),
                        "reports ready"
                    );
                    return PollOutcome::Ready(reports);
                }
                Ok(_) => {
                    debug!(
                        attempt,
                        max_attempts = self.config.max_attempts,
                        "no reports yet"
                    );
                }
                Err(e) => {
                    warn!(
                        attempt,
                        max_attempts = self.config.max_attempts,
                        "report poll failed: {}",
                        e
                    );
                }
            }
            if attempt < self.config.max_attempts {
                tokio::time::sleep(self.config.interval).await;
            }
        }
        PollOutcome::TimedOut
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        ActionSpec, PageTarget, Report, ReportStep, Screenshot, Step, Test, WebElement,
    };
    use crate::store::{ClaimOutcome, MemoryStore, StoreError, StoreResult};
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_config(max_attempts: u32) -> PollerConfig {
        PollerConfig::new(Duration::from_millis(5), max_attempts)
    }

    #[tokio::test]
    async fn test_ready_on_first_attempt() {
        let store = MemoryStore::new();
        store.create_report(Report::pending("t1")).await.unwrap();

        let poller =
            ReportPoller::with_config(Arc::new(store), fast_config(3));
        let outcome = poller.wait_for_reports(&["t1".to_string()]).await;
        assert!(outcome.is_ready());
    }

    #[tokio::test]
    async fn test_partial_results_are_accepted() {
        let store = MemoryStore::new();
        store.create_report(Report::pending("t1")).await.unwrap();

        let poller =
            ReportPoller::with_config(Arc::new(store), fast_config(3));
        let ids = vec!["t1".to_string(), "t2".to_string()];
        match poller.wait_for_reports(&ids).await {
            PollOutcome::Ready(reports) => {
                assert_eq!(reports.len(), 1);
                assert_eq!(reports[0].test_id, "t1");
            }
            PollOutcome::TimedOut => panic!("expected partial results"),
        }
    }

    #[tokio::test]
    async fn test_times_out_when_no_report_appears() {
        let store = MemoryStore::new();
        let poller =
            ReportPoller::with_config(Arc::new(store), fast_config(3));
        let outcome = poller.wait_for_reports(&["t1".to_string()]).await;
        assert!(matches!(outcome, PollOutcome::TimedOut));
    }

    /// Storage double whose `last_reports` fails a fixed number of times
    /// before delegating.
    struct FlakyStore {
        inner: MemoryStore,
        failures_left: AtomicU32,
        calls: AtomicU32,
    }

    impl FlakyStore {
        fn new(inner: MemoryStore, failures: u32) -> Self {
            Self {
                inner,
                failures_left: AtomicU32::new(failures),
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl Storage for FlakyStore {
        async fn test(&self, id: &str) -> StoreResult<Option<Test>> {
            self.inner.test(id).await
        }
        async fn steps_for_test(&self, test_id: &str) -> StoreResult<Vec<Step>> {
            self.inner.steps_for_test(test_id).await
        }
        async fn web_element(&self, id: &str) -> StoreResult<Option<WebElement>> {
            self.inner.web_element(id).await
        }
        async fn action(&self, id: &str) -> StoreResult<Option<ActionSpec>> {
            self.inner.action(id).await
        }
        async fn page(&self, id: &str) -> StoreResult<Option<PageTarget>> {
            self.inner.page(id).await
        }
        async fn create_report(&self, report: Report) -> StoreResult<()> {
            self.inner.create_report(report).await
        }
        async fn finalize_report(
            &self,
            report_id: &str,
            status: bool,
            execution_time_ms: u64,
        ) -> StoreResult<()> {
            self.inner
                .finalize_report(report_id, status, execution_time_ms)
                .await
        }
        async fn create_report_step(&self, step: ReportStep) -> StoreResult<()> {
            self.inner.create_report_step(step).await
        }
        async fn create_screenshot(&self, screenshot: Screenshot) -> StoreResult<()> {
            self.inner.create_screenshot(screenshot).await
        }
        async fn running_tests(&self) -> StoreResult<Vec<Test>> {
            self.inner.running_tests().await
        }
        async fn try_claim_running(
            &self,
            test_ids: &[String],
            claimed_at: DateTime<Utc>,
        ) -> StoreResult<ClaimOutcome> {
            self.inner.try_claim_running(test_ids, claimed_at).await
        }
        async fn release_running(&self, test_ids: &[String]) -> StoreResult<()> {
            self.inner.release_running(test_ids).await
        }
        async fn clear_stale_running(&self, cutoff: DateTime<Utc>) -> StoreResult<Vec<String>> {
            self.inner.clear_stale_running(cutoff).await
        }
        async fn last_reports(&self, test_ids: &[String]) -> StoreResult<Vec<Report>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.failures_left.load(Ordering::SeqCst) > 0 {
                self.failures_left.fetch_sub(1, Ordering::SeqCst);
                return Err(StoreError::Backend("connection reset".to_string()));
            }
            self.inner.last_reports(test_ids).await
        }
        async fn report_steps(&self, report_id: &str) -> StoreResult<Vec<ReportStep>> {
            self.inner.report_steps(report_id).await
        }
        async fn screenshots_for_step(
            &self,
            report_step_id: &str,
        ) -> StoreResult<Vec<Screenshot>> {
            self.inner.screenshots_for_step(report_step_id).await
        }
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let inner = MemoryStore::new();
        inner.create_report(Report::pending("t1")).await.unwrap();
        let flaky = Arc::new(FlakyStore::new(inner, 2));

        let store: Arc<dyn Storage> = flaky.clone();
        let poller = ReportPoller::with_config(store, fast_config(5));
        let outcome = poller.wait_for_reports(&["t1".to_string()]).await;

        assert!(outcome.is_ready());
        // Two failing attempts, then the successful one.
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_failures_exhaust_the_attempt_budget() {
        let flaky = Arc::new(FlakyStore::new(MemoryStore::new(), u32::MAX));
        let store: Arc<dyn Storage> = flaky.clone();
        let poller = ReportPoller::with_config(store, fast_config(3));

        let outcome = poller.wait_for_reports(&["t1".to_string()]).await;
        assert!(matches!(outcome, PollOutcome::TimedOut));
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 3);
    }
}
