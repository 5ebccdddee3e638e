//! Web Vision - Automated web UI test execution with screenshot audit trails.
//!
//! This crate provides:
//! - A browser action executor driving one headless Chromium session per
//!   test run, recording one report step and one screenshot per action
//! - A compiler lowering stored (element, action, value) steps to a
//!   closed instruction set, rejecting unsupported steps before any
//!   browser session exists
//! - A batch runner executing tests in isolated tasks behind a persisted
//!   run-status guard, with guaranteed artifact cleanup
//! - A bounded-retry poller for discovering run reports asynchronously
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use web_vision::browser::CdpLauncher;
//! use web_vision::engine::BatchRunner;
//! use web_vision::model::BrowserKind;
//! use web_vision::store::{MemoryStore, Suite};
//!
//! #[tokio::main]
//! async fn main() {
//!     let suite = Suite::default(); // normally loaded from a suite file
//!     let store = Arc::new(MemoryStore::from_suite(suite).await);
//!     let runner = BatchRunner::new(store, Arc::new(CdpLauncher));
//!     let outcome = runner
//!         .run_batch(&["t1".to_string()], BrowserKind::Chrome)
//!         .await
//!         .unwrap();
//!     println!("all passed: {}", outcome.all_passed());
//! }
//! ```

pub mod browser;
pub mod config;
pub mod engine;
pub mod model;
pub mod poller;
pub mod store;
pub mod workspace;

// Re-export the data model
pub use model::{
    ActionSpec, BrowserKind, PageTarget, Report, ReportStep, Screenshot, Step, Test, Viewport,
    WebElement,
};

// Re-export the executor and driver seam
pub use browser::{
    BrowserSession, CdpDriver, CdpLauncher, DriverError, DriverFactory, MockBehavior, MockDriver,
    MockDriverFactory, PageDriver, SessionError,
};

// Re-export the engine
pub use engine::{
    BatchOutcome, BatchRunner, CompileError, Instruction, RunPlan, RunStatusGuard, RunnerError,
    TestOutcome, compile_test,
};

// Re-export persistence and polling
pub use poller::{PollOutcome, PollerConfig, ReportPoller};
pub use store::{MemoryStore, Storage, StoreError, Suite};
pub use workspace::{RunWorkspace, cleanup_old_workspaces};
