//! Batch orchestration: claim, compile, materialize, execute, release.
//!
//! One batch runs a set of tests concurrently, each in its own tokio task
//! with its own browser session, so one test's failure or crash can never
//! corrupt a sibling's run. The run-status guard is claimed before any
//! work starts and released on every exit path; workspace artifacts are
//! removed when the batch completes regardless of outcome.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::browser::driver::DriverFactory;
use crate::config;
use crate::engine::compiler::compile_test;
use crate::engine::guard::{GuardError, RunStatusGuard};
use crate::engine::interpreter::execute_plan;
use crate::model::{BrowserKind, Report, Test};
use crate::store::{Storage, StoreError};
use crate::workspace::{RunWorkspace, WorkspaceError};

/// Result type for batch runs
pub type RunnerResult<T> = Result<T, RunnerError>;

/// Error types for batch runs.
///
/// These reject the batch as a whole, before any execution; per-test
/// failures are reported inside [`BatchOutcome`] instead.
#[derive(Debug)]
pub enum RunnerError {
    /// The request was malformed (empty id set, unknown test id)
    Validation(String),
    /// Another run-set is active
    Busy {
        /// Tests currently marked running
        running: Vec<String>,
    },
    /// Storage failure during validation or claiming
    Store(StoreError),
    /// Artifact workspace failure
    Workspace(WorkspaceError),
}

impl std::fmt::Display for RunnerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunnerError::Validation(msg) => write!(f, "Validation error: {}", msg),
            RunnerError::Busy { running } => {
                write!(f, "Some tests are running: {}", running.join(", "))
            }
            RunnerError::Store(err) => write!(f, "{}", err),
            RunnerError::Workspace(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for RunnerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RunnerError::Store(err) => Some(err),
            RunnerError::Workspace(err) => Some(err),
            _ => None,
        }
    }
}

/// The outcome of one test within a batch
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TestOutcome {
    /// The run executed and its report was finalized (either status)
    Completed {
        /// The finalized report
        report: Report,
    },
    /// The test failed compilation; no session was launched and no
    /// report row exists
    CompileFailed {
        /// The compilation error
        error: String,
    },
    /// The run's task crashed or could not start its browser
    Crashed {
        /// The failure description
        error: String,
    },
}

impl TestOutcome {
    /// Whether this outcome is a passing, completed run
    pub fn passed(&self) -> bool {
        matches!(self, TestOutcome::Completed { report } if report.status)
    }
}

/// Aggregated result of one batch, keyed by test id
#[derive(Debug, Clone, Serialize)]
pub struct BatchOutcome {
    /// Browser the batch was requested for
    pub browser: BrowserKind,
    /// Per-test outcomes
    pub results: BTreeMap<String, TestOutcome>,
}

impl BatchOutcome {
    /// Whether every test in the batch completed with a passing report
    pub fn all_passed(&self) -> bool {
        self.results.values().all(TestOutcome::passed)
    }
}

/// Runs batches of tests against isolated browser sessions.
pub struct BatchRunner {
    store: Arc<dyn Storage>,
    factory: Arc<dyn DriverFactory>,
    guard: RunStatusGuard,
    workspace_base: PathBuf,
}

impl BatchRunner {
    /// Create a runner over the given store and driver factory.
    pub fn new(store: Arc<dyn Storage>, factory: Arc<dyn DriverFactory>) -> Self {
        let guard = RunStatusGuard::new(Arc::clone(&store));
        Self {
            store,
            factory,
            guard,
            workspace_base: PathBuf::from(config::workspace_base_dir()),
        }
    }

    /// Override the artifact base directory (useful for testing).
    pub fn with_workspace_base(mut self, base: impl Into<PathBuf>) -> Self {
        self.workspace_base = base.into();
        self
    }

    /// The runner's run-status guard.
    pub fn guard(&self) -> &RunStatusGuard {
        &self.guard
    }

    /// Run a batch of tests.
    ///
    /// Validates the request, claims the run-status guard, and executes
    /// every test concurrently. The guard is released when the batch
    /// finishes, whether it finished successfully or raised.
    pub async fn run_batch(
        &self,
        test_ids: &[String],
        browser: BrowserKind,
    ) -> RunnerResult<BatchOutcome> {
        if test_ids.is_empty() {
            return Err(RunnerError::Validation("no test ids given".to_string()));
        }

        // Reject unknown ids before any claim or execution.
        let mut ids = Vec::new();
        let mut tests = Vec::new();
        for id in test_ids {
            if ids.contains(id) {
                continue;
            }
            match self.store.test(id).await.map_err(RunnerError::Store)? {
                Some(test) => {
                    ids.push(id.clone());
                    tests.push(test);
                }
                None => {
                    return Err(RunnerError::Validation(format!("unknown test id: {}", id)));
                }
            }
        }

        match self.guard.try_claim(&ids).await {
            Ok(()) => {}
            Err(GuardError::Busy { running }) => return Err(RunnerError::Busy { running }),
            Err(GuardError::Store(err)) => return Err(RunnerError::Store(err)),
        }

        let outcome = self.run_claimed(tests, browser).await;

        if let Err(e) = self.guard.release(&ids).await {
            warn!("failed to release run-status flags: {}", e);
        }

        outcome
    }

    /// Execute an already-claimed batch.
    async fn run_claimed(
        &self,
        tests: Vec<Test>,
        browser: BrowserKind,
    ) -> RunnerResult<BatchOutcome> {
        let mut results: BTreeMap<String, TestOutcome> = BTreeMap::new();

        // Compile everything first; a test that fails compilation never
        // launches a session and never creates a report row, and does
        // not affect its siblings.
        let mut plans = Vec::new();
        for test in &tests {
            match compile_test(&self.store, test).await {
                Ok(plan) => plans.push(plan),
                Err(e) => {
                    warn!(test_id = %test.id, "compilation failed: {}", e);
                    results.insert(
                        test.id.clone(),
                        TestOutcome::CompileFailed {
                            error: e.to_string(),
                        },
                    );
                }
            }
        }

        let workspace = RunWorkspace::create(&self.workspace_base)
            .map_err(|e| RunnerError::Workspace(e.into()))?;
        for plan in &plans {
            workspace.write_plan(plan).map_err(RunnerError::Workspace)?;
        }

        info!(
            batch = %workspace.id,
            tests = plans.len(),
            browser = browser.name(),
            "dispatching batch"
        );

        // One task and one browser session per test; no ordering between
        // tests in a batch.
        let mut handles = Vec::new();
        for plan in plans {
            let test_id = plan.test_id.clone();
            let store = Arc::clone(&self.store);
            let factory = Arc::clone(&self.factory);
            let handle = tokio::spawn(async move {
                let driver = factory
                    .create(browser, plan.viewport)
                    .await
                    .map_err(|e| e.to_string())?;
                execute_plan(&plan, driver, store)
                    .await
                    .map_err(|e| e.to_string())
            });
            handles.push((test_id, handle));
        }

        for (test_id, handle) in handles {
            let outcome = match handle.await {
                Ok(Ok(report)) => TestOutcome::Completed { report },
                Ok(Err(error)) => {
                    warn!(test_id = %test_id, "run did not complete: {}", error);
                    TestOutcome::Crashed { error }
                }
                Err(join_error) => {
                    warn!(test_id = %test_id, "run task panicked: {}", join_error);
                    TestOutcome::Crashed {
                        error: format!("task panicked: {}", join_error),
                    }
                }
            };
            results.insert(test_id, outcome);
        }

        if let Err(e) = workspace.cleanup() {
            warn!(batch = %workspace.id, "workspace cleanup failed: {}", e);
        }

        Ok(BatchOutcome { browser, results })
    }
}
