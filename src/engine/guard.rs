//! Mutual exclusion over test execution.
//!
//! The guard is advisory, persisted state: each test carries an
//! `is_running` flag, and a new batch may only start while *no* test
//! anywhere in the system is running. Claims are timestamped so that
//! flags left behind by a crashed process can be swept after a maximum
//! run duration.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info};

use crate::store::{ClaimOutcome, Storage, StoreError};

/// Error types for claim attempts
#[derive(Debug, Clone)]
pub enum GuardError {
    /// Another run-set is active; the ids currently marked running
    Busy {
        /// Tests currently marked running
        running: Vec<String>,
    },
    /// Storage failure while claiming
    Store(StoreError),
}

impl std::fmt::Display for GuardError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GuardError::Busy { running } => {
                write!(f, "Some tests are running: {}", running.join(", "))
            }
            GuardError::Store(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for GuardError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            GuardError::Store(err) => Some(err),
            GuardError::Busy { .. } => None,
        }
    }
}

/// Per-test run-status flags, claimed and released around each batch.
#[derive(Clone)]
pub struct RunStatusGuard {
    store: Arc<dyn Storage>,
}

impl RunStatusGuard {
    /// Create a guard over the given store
    pub fn new(store: Arc<dyn Storage>) -> Self {
        Self { store }
    }

    /// Claim the given tests for a run.
    ///
    /// Fails busy when any test in the system is already marked running;
    /// the check is global, not per-id — only one run-set may be active.
    pub async fn try_claim(&self, test_ids: &[String]) -> Result<(), GuardError> {
        match self
            .store
            .try_claim_running(test_ids, Utc::now())
            .await
            .map_err(GuardError::Store)?
        {
            ClaimOutcome::Claimed => {
                debug!(count = test_ids.len(), "claimed run-status flags");
                Ok(())
            }
            ClaimOutcome::Busy(running) => Err(GuardError::Busy { running }),
        }
    }

    /// Unconditionally mark the given tests as not running.
    ///
    /// Invoked exactly once per claimed batch, on every exit path.
    pub async fn release(&self, test_ids: &[String]) -> Result<(), StoreError> {
        self.store.release_running(test_ids).await?;
        debug!(count = test_ids.len(), "released run-status flags");
        Ok(())
    }

    /// Whether any test anywhere is currently marked running
    pub async fn is_any_running(&self) -> Result<bool, StoreError> {
        Ok(!self.store.running_tests().await?.is_empty())
    }

    /// Clear flags whose claim is older than `max_age`.
    ///
    /// Recovery for crashed processes: without this sweep a crash
    /// mid-run would leave its tests marked running forever.
    pub async fn clear_stale(&self, max_age: Duration) -> Result<Vec<String>, StoreError> {
        let cutoff = Utc::now() - chrono::Duration::milliseconds(max_age.as_millis() as i64);
        let cleared = self.store.clear_stale_running(cutoff).await?;
        if !cleared.is_empty() {
            info!(count = cleared.len(), "cleared stale run-status flags");
        }
        Ok(cleared)
    }
}
