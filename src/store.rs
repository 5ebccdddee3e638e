//! Persistence boundary for the execution engine.
//!
//! The engine consumes storage through the [`Storage`] trait: catalog
//! lookups, write-once report records, and the run-status flags. The real
//! system keeps these in a relational database behind an API layer;
//! [`MemoryStore`] is the in-crate reference implementation used by the
//! CLI and the test suite.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::model::{
    ActionSpec, PageTarget, Report, ReportStep, Screenshot, Step, Test, WebElement,
};

/// Result type for storage operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Error types for storage operations
#[derive(Debug, Clone)]
pub enum StoreError {
    /// A referenced record does not exist
    NotFound(String),
    /// Backend failure (connectivity, constraint violation, ...)
    Backend(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::NotFound(what) => write!(f, "Not found: {}", what),
            StoreError::Backend(msg) => write!(f, "Storage error: {}", msg),
        }
    }
}

impl std::error::Error for StoreError {}

/// Outcome of an atomic run-status claim attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// All requested tests are now marked running
    Claimed,
    /// At least one test anywhere in the system is already running
    Busy(Vec<String>),
}

/// Storage surface consumed by the execution engine.
///
/// Report, report-step and screenshot records are write-once: they are
/// created during a run and never updated afterwards, except for a
/// report's finalization fields.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Look up a test by id
    async fn test(&self, id: &str) -> StoreResult<Option<Test>>;

    /// The ordered steps of a test (ascending `order`)
    async fn steps_for_test(&self, test_id: &str) -> StoreResult<Vec<Step>>;

    /// Look up a web element by id
    async fn web_element(&self, id: &str) -> StoreResult<Option<WebElement>>;

    /// Look up an action catalog row by id
    async fn action(&self, id: &str) -> StoreResult<Option<ActionSpec>>;

    /// Look up a page target by id
    async fn page(&self, id: &str) -> StoreResult<Option<PageTarget>>;

    /// Persist a freshly created (pending) report
    async fn create_report(&self, report: Report) -> StoreResult<()>;

    /// Finalize a report's status and execution time
    async fn finalize_report(
        &self,
        report_id: &str,
        status: bool,
        execution_time_ms: u64,
    ) -> StoreResult<()>;

    /// Append a report step
    async fn create_report_step(&self, step: ReportStep) -> StoreResult<()>;

    /// Persist a screenshot for a report step
    async fn create_screenshot(&self, screenshot: Screenshot) -> StoreResult<()>;

    /// All tests currently marked running
    async fn running_tests(&self) -> StoreResult<Vec<Test>>;

    /// Atomically claim the given tests for a run.
    ///
    /// Fails busy when *any* test in the system is already running — the
    /// system supports one active run-set at a time.
    async fn try_claim_running(
        &self,
        test_ids: &[String],
        claimed_at: DateTime<Utc>,
    ) -> StoreResult<ClaimOutcome>;

    /// Unconditionally mark the given tests as not running
    async fn release_running(&self, test_ids: &[String]) -> StoreResult<()>;

    /// Clear running flags claimed before `cutoff`; returns the cleared ids
    async fn clear_stale_running(&self, cutoff: DateTime<Utc>) -> StoreResult<Vec<String>>;

    /// The most recent report for each of the given tests, where one exists
    async fn last_reports(&self, test_ids: &[String]) -> StoreResult<Vec<Report>>;

    /// The steps of a report, in creation order
    async fn report_steps(&self, report_id: &str) -> StoreResult<Vec<ReportStep>>;

    /// The screenshots attached to a report step
    async fn screenshots_for_step(&self, report_step_id: &str) -> StoreResult<Vec<Screenshot>>;
}

/// A complete set of fixture rows, loadable from a JSON suite file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Suite {
    /// Page targets
    pub pages: Vec<PageTarget>,
    /// Web element catalog
    pub elements: Vec<WebElement>,
    /// Action catalog
    pub actions: Vec<ActionSpec>,
    /// Tests
    pub tests: Vec<Test>,
    /// Steps, referencing tests/elements/actions by id
    pub steps: Vec<Step>,
}

#[derive(Debug, Default)]
struct Inner {
    tests: HashMap<String, Test>,
    steps: Vec<Step>,
    elements: HashMap<String, WebElement>,
    actions: HashMap<String, ActionSpec>,
    pages: HashMap<String, PageTarget>,
    reports: Vec<Report>,
    report_steps: Vec<ReportStep>,
    screenshots: Vec<Screenshot>,
    claims: HashMap<String, DateTime<Utc>>,
}

/// In-memory [`Storage`] implementation.
///
/// Cheap to clone (shared interior); a clone sees the same data.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated from a suite fixture
    pub async fn from_suite(suite: Suite) -> Self {
        let store = Self::new();
        {
            let mut inner = store.inner.lock().await;
            for page in suite.pages {
                inner.pages.insert(page.id.clone(), page);
            }
            for element in suite.elements {
                inner.elements.insert(element.id.clone(), element);
            }
            for action in suite.actions {
                inner.actions.insert(action.id.clone(), action);
            }
            for test in suite.tests {
                inner.tests.insert(test.id.clone(), test);
            }
            inner.steps = suite.steps;
        }
        store
    }

    /// Insert or replace a page target
    pub async fn insert_page(&self, page: PageTarget) {
        self.inner.lock().await.pages.insert(page.id.clone(), page);
    }

    /// Insert or replace a web element
    pub async fn insert_element(&self, element: WebElement) {
        self.inner
            .lock()
            .await
            .elements
            .insert(element.id.clone(), element);
    }

    /// Insert or replace an action catalog row
    pub async fn insert_action(&self, action: ActionSpec) {
        self.inner
            .lock()
            .await
            .actions
            .insert(action.id.clone(), action);
    }

    /// Insert or replace a test
    pub async fn insert_test(&self, test: Test) {
        self.inner.lock().await.tests.insert(test.id.clone(), test);
    }

    /// Append a step
    pub async fn insert_step(&self, step: Step) {
        self.inner.lock().await.steps.push(step);
    }

    /// Total number of reports ever created (test helper)
    pub async fn report_count(&self) -> usize {
        self.inner.lock().await.reports.len()
    }

    /// All reports for a test, in creation order (test helper)
    pub async fn reports_for_test(&self, test_id: &str) -> Vec<Report> {
        self.inner
            .lock()
            .await
            .reports
            .iter()
            .filter(|r| r.test_id == test_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl Storage for MemoryStore {
    async fn test(&self, id: &str) -> StoreResult<Option<Test>> {
        Ok(self.inner.lock().await.tests.get(id).cloned())
    }

    async fn steps_for_test(&self, test_id: &str) -> StoreResult<Vec<Step>> {
        let inner = self.inner.lock().await;
        let mut steps: Vec<Step> = inner
            .steps
            .iter()
            .filter(|s| s.test_id == test_id)
            .cloned()
            .collect();
        steps.sort_by_key(|s| s.order);
        Ok(steps)
    }

    async fn web_element(&self, id: &str) -> StoreResult<Option<WebElement>> {
        Ok(self.inner.lock().await.elements.get(id).cloned())
    }

    async fn action(&self, id: &str) -> StoreResult<Option<ActionSpec>> {
        Ok(self.inner.lock().await.actions.get(id).cloned())
    }

    async fn page(&self, id: &str) -> StoreResult<Option<PageTarget>> {
        Ok(self.inner.lock().await.pages.get(id).cloned())
    }

    async fn create_report(&self, report: Report) -> StoreResult<()> {
        self.inner.lock().await.reports.push(report);
        Ok(())
    }

    async fn finalize_report(
        &self,
        report_id: &str,
        status: bool,
        execution_time_ms: u64,
    ) -> StoreResult<()> {
        let mut inner = self.inner.lock().await;
        let report = inner
            .reports
            .iter_mut()
            .find(|r| r.id == report_id)
            .ok_or_else(|| StoreError::NotFound(format!("report {}", report_id)))?;
        report.status = status;
        report.execution_time_ms = execution_time_ms;
        Ok(())
    }

    async fn create_report_step(&self, step: ReportStep) -> StoreResult<()> {
        self.inner.lock().await.report_steps.push(step);
        Ok(())
    }

    async fn create_screenshot(&self, screenshot: Screenshot) -> StoreResult<()> {
        self.inner.lock().await.screenshots.push(screenshot);
        Ok(())
    }

    async fn running_tests(&self) -> StoreResult<Vec<Test>> {
        Ok(self
            .inner
            .lock()
            .await
            .tests
            .values()
            .filter(|t| t.is_running)
            .cloned()
            .collect())
    }

    async fn try_claim_running(
        &self,
        test_ids: &[String],
        claimed_at: DateTime<Utc>,
    ) -> StoreResult<ClaimOutcome> {
        let mut inner = self.inner.lock().await;

        let running: Vec<String> = inner
            .tests
            .values()
            .filter(|t| t.is_running)
            .map(|t| t.id.clone())
            .collect();
        if !running.is_empty() {
            return Ok(ClaimOutcome::Busy(running));
        }

        for id in test_ids {
            if !inner.tests.contains_key(id) {
                return Err(StoreError::NotFound(format!("test {}", id)));
            }
        }
        for id in test_ids {
            if let Some(test) = inner.tests.get_mut(id) {
                test.is_running = true;
            }
            inner.claims.insert(id.clone(), claimed_at);
        }
        Ok(ClaimOutcome::Claimed)
    }

    async fn release_running(&self, test_ids: &[String]) -> StoreResult<()> {
        let mut inner = self.inner.lock().await;
        for id in test_ids {
            if let Some(test) = inner.tests.get_mut(id) {
                test.is_running = false;
            }
            inner.claims.remove(id);
        }
        Ok(())
    }

    async fn clear_stale_running(&self, cutoff: DateTime<Utc>) -> StoreResult<Vec<String>> {
        let mut inner = self.inner.lock().await;
        let stale: Vec<String> = inner
            .claims
            .iter()
            .filter(|(_, at)| **at < cutoff)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &stale {
            if let Some(test) = inner.tests.get_mut(id) {
                test.is_running = false;
            }
            inner.claims.remove(id);
        }
        Ok(stale)
    }

    async fn last_reports(&self, test_ids: &[String]) -> StoreResult<Vec<Report>> {
        let inner = self.inner.lock().await;
        let mut result = Vec::new();
        for id in test_ids {
            if let Some(report) = inner.reports.iter().rev().find(|r| &r.test_id == id) {
                result.push(report.clone());
            }
        }
        Ok(result)
    }

    async fn report_steps(&self, report_id: &str) -> StoreResult<Vec<ReportStep>> {
        Ok(self
            .inner
            .lock()
            .await
            .report_steps
            .iter()
            .filter(|s| s.report_id == report_id)
            .cloned()
            .collect())
    }

    async fn screenshots_for_step(&self, report_step_id: &str) -> StoreResult<Vec<Screenshot>> {
        Ok(self
            .inner
            .lock()
            .await
            .screenshots
            .iter()
            .filter(|s| s.report_step_id == report_step_id)
            .cloned()
            .collect())
    }
}
