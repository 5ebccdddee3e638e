//! Executes one compiled run plan inside one report lifecycle.
//!
//! A pending report is created up front, the instructions run strictly in
//! order through one browser session, and the report is finalized with
//! the elapsed time whether the run succeeded or failed. The session is
//! always closed, on every path.

use std::sync::Arc;
use std::time::Instant;

use tracing::{info, warn};

use crate::browser::driver::PageDriver;
use crate::browser::session::{BrowserSession, SessionError, SessionResult};
use crate::engine::compiler::{BrowserAction, ElementAction, Instruction, RunPlan};
use crate::model::Report;
use crate::store::{Storage, StoreError};

/// Result type for plan execution
pub type EngineResult<T> = Result<T, EngineError>;

/// Infrastructure failures during plan execution.
///
/// Ordinary action failures are *not* errors at this level: they finalize
/// the report with `status = false` and the run still returns `Ok`.
#[derive(Debug)]
pub enum EngineError {
    /// The outcome trail could not be persisted
    Store(StoreError),
    /// The session misbehaved outside the normal action contract
    Session(String),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::Store(err) => write!(f, "{}", err),
            EngineError::Session(msg) => write!(f, "Session error: {}", msg),
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EngineError::Store(err) => Some(err),
            EngineError::Session(_) => None,
        }
    }
}

/// Execute a compiled plan through the given driver.
///
/// Returns the finalized report; `status` reflects whether every
/// instruction succeeded. Errors are reserved for infrastructure
/// failures (storage, session misuse) — see [`EngineError`].
pub async fn execute_plan(
    plan: &RunPlan,
    driver: Box<dyn PageDriver>,
    store: Arc<dyn Storage>,
) -> EngineResult<Report> {
    let report = Report::pending(&plan.test_id);
    store
        .create_report(report.clone())
        .await
        .map_err(EngineError::Store)?;

    info!(test_id = %plan.test_id, report_id = %report.id, title = %plan.title, "starting run");

    let mut session = BrowserSession::new(Arc::clone(&store), &report.id);
    session.init(driver);

    let started = Instant::now();
    let run = run_instructions(&session, plan).await;
    let execution_time_ms = started.elapsed().as_millis() as u64;
    let status = run.is_ok();

    let finalized = store
        .finalize_report(&report.id, status, execution_time_ms)
        .await;
    session.close().await;
    finalized.map_err(EngineError::Store)?;

    match run {
        Ok(()) => {
            info!(test_id = %plan.test_id, execution_time_ms, "run passed");
        }
        Err(SessionError::Action(msg)) => {
            warn!(test_id = %plan.test_id, execution_time_ms, "run failed: {}", msg);
        }
        Err(SessionError::NotInitialized) => {
            return Err(EngineError::Session(
                "session was not initialized".to_string(),
            ));
        }
        Err(SessionError::Store(e)) => return Err(EngineError::Store(e)),
    }

    Ok(Report {
        status,
        execution_time_ms,
        ..report
    })
}

/// Run every instruction in order, stopping at the first failure.
async fn run_instructions(session: &BrowserSession, plan: &RunPlan) -> SessionResult<()> {
    for instruction in &plan.instructions {
        match instruction {
            Instruction::Open { url } => session.open_page(url).await?,
            Instruction::Element { action, selector } => {
                session.highlight(selector).await;
                run_element_action(session, action, selector).await?;
                session.unhighlight(selector).await;
            }
            Instruction::Browser { action } => match action {
                BrowserAction::GoBack => session.go_back().await?,
                BrowserAction::GoForward => session.go_forward().await?,
                BrowserAction::TakeScreenshot => session.take_screenshot().await?,
            },
        }
    }
    Ok(())
}

/// Dispatch one element-targeted action to the session.
async fn run_element_action(
    session: &BrowserSession,
    action: &ElementAction,
    selector: &str,
) -> SessionResult<()> {
    match action {
        ElementAction::Click => session.click(selector).await,
        ElementAction::Fill { value } => session.fill(selector, value).await,
        ElementAction::Hover => session.hover(selector).await,
        ElementAction::CheckText { expected } => session.check_text(selector, expected).await,
        ElementAction::WaitForElement { timeout_ms } => {
            session.wait_for_element(selector, *timeout_ms).await
        }
        ElementAction::SelectOption { value } => session.select_option(selector, value).await,
        ElementAction::CheckVisibility => session.check_visibility(selector).await,
        ElementAction::PressKey { key } => session.press_key(selector, key).await,
        ElementAction::ClearInput => session.clear_input(selector).await,
        ElementAction::DoubleClick => session.double_click(selector).await,
        ElementAction::RightClick => session.right_click(selector).await,
        ElementAction::Focus => session.focus(selector).await,
        ElementAction::Blur => session.blur(selector).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::mock::{MockBehavior, MockDriver};
    use crate::model::Viewport;
    use crate::store::MemoryStore;

    fn plan(instructions: Vec<Instruction>) -> RunPlan {
        RunPlan {
            test_id: "t1".to_string(),
            title: "Example".to_string(),
            viewport: Viewport::default(),
            instructions,
        }
    }

    fn open_click_check() -> RunPlan {
        plan(vec![
            Instruction::Open {
                url: "http://app.test".to_string(),
            },
            Instruction::Element {
                action: ElementAction::Click,
                selector: "#submit".to_string(),
            },
            Instruction::Element {
                action: ElementAction::CheckText {
                    expected: "OK".to_string(),
                },
                selector: "#result".to_string(),
            },
        ])
    }

    #[tokio::test]
    async fn test_successful_run_finalizes_passing_report() {
        let store = MemoryStore::new();
        let driver = MockDriver::new(MockBehavior::passing().text("#result", "OK"));
        let shared: Arc<dyn Storage> = Arc::new(store.clone());

        let report = execute_plan(&open_click_check(), Box::new(driver), shared)
            .await
            .unwrap();

        assert!(report.status);
        let persisted = store.last_reports(&["t1".to_string()]).await.unwrap();
        assert!(persisted[0].status);

        // Open + click + checkText, in stored order, each passing.
        let steps = store.report_steps(&report.id).await.unwrap();
        let descriptions: Vec<&str> = steps.iter().map(|s| s.description.as_str()).collect();
        assert_eq!(
            descriptions,
            vec![
                "Opened page with URL: http://app.test",
                "Clicked on element with selector: #submit",
                "Checked text for element with selector: #result, expected: OK",
            ]
        );
        assert!(steps.iter().all(|s| s.status));

        // Exactly one screenshot per step.
        for step in &steps {
            let shots = store.screenshots_for_step(&step.id).await.unwrap();
            assert_eq!(shots.len(), 1);
        }
    }

    #[tokio::test]
    async fn test_failing_step_aborts_and_finalizes_failed_report() {
        let store = MemoryStore::new();
        let driver = MockDriver::new(MockBehavior::passing().failing_selector("#submit"));
        let shared: Arc<dyn Storage> = Arc::new(store.clone());

        let report = execute_plan(&open_click_check(), Box::new(driver), shared)
            .await
            .unwrap();

        assert!(!report.status);
        let steps = store.report_steps(&report.id).await.unwrap();
        // The failing click is recorded; the checkText step never ran.
        assert_eq!(steps.len(), 2);
        assert!(steps[0].status);
        assert!(!steps[1].status);
        assert!(steps[1].description.contains("Error clicking"));

        // The failing step is screenshot-documented too.
        let shots = store.screenshots_for_step(&steps[1].id).await.unwrap();
        assert_eq!(shots.len(), 1);
    }

    #[tokio::test]
    async fn test_element_actions_are_highlight_bracketed() {
        let store = MemoryStore::new();
        let driver = MockDriver::passing();
        let log = driver.call_log();
        let shared: Arc<dyn Storage> = Arc::new(store.clone());

        let single_click = plan(vec![
            Instruction::Open {
                url: "http://app.test".to_string(),
            },
            Instruction::Element {
                action: ElementAction::Click,
                selector: "#go".to_string(),
            },
        ]);
        execute_plan(&single_click, Box::new(driver), shared)
            .await
            .unwrap();

        let calls = log.lock().unwrap().clone();
        assert_eq!(
            calls,
            vec![
                "goto http://app.test",
                "screenshot",
                "evaluate", // highlight
                "wait_for_selector #go",
                "click #go",
                "screenshot",
                "evaluate", // unhighlight
                "close",
            ]
        );
    }

    #[tokio::test]
    async fn test_browser_actions_run_without_highlighting() {
        let store = MemoryStore::new();
        let driver = MockDriver::passing();
        let log = driver.call_log();
        let shared: Arc<dyn Storage> = Arc::new(store.clone());

        let nav_plan = plan(vec![
            Instruction::Open {
                url: "http://app.test".to_string(),
            },
            Instruction::Browser {
                action: BrowserAction::GoBack,
            },
            Instruction::Browser {
                action: BrowserAction::TakeScreenshot,
            },
        ]);
        execute_plan(&nav_plan, Box::new(driver), shared)
            .await
            .unwrap();

        let calls = log.lock().unwrap().clone();
        assert!(!calls.contains(&"evaluate".to_string()));
        assert!(calls.contains(&"go_back".to_string()));
    }

    #[tokio::test]
    async fn test_session_closed_after_failed_run() {
        let store = MemoryStore::new();
        let driver = MockDriver::new(MockBehavior::passing().fail_goto("net::ERR_FAILED"));
        let log = driver.call_log();
        let shared: Arc<dyn Storage> = Arc::new(store.clone());

        let report = execute_plan(&open_click_check(), Box::new(driver), shared)
            .await
            .unwrap();

        assert!(!report.status);
        let calls = log.lock().unwrap().clone();
        assert_eq!(calls.last().map(String::as_str), Some("close"));
    }
}
