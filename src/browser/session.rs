//! The browser action executor.
//!
//! A [`BrowserSession`] owns one driver-backed page for the duration of a
//! test run and exposes the fixed vocabulary of UI actions. Every action
//! follows the same symmetric contract:
//!
//! - attempt the underlying browser operation
//! - append exactly one report step (success or failure, with a
//!   human-readable description)
//! - capture exactly one screenshot tied to that step, on both paths
//! - propagate the failure to the caller, which aborts the run's
//!   remaining steps
//!
//! Screenshot *capture* failures are the one exception: they are logged
//! and swallowed, since losing an audit image must not abort an
//! otherwise-valid run.

use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use tracing::{debug, warn};

use crate::browser::driver::{DriverError, DriverResult, PageDriver, js_string};
use crate::config;
use crate::model::{ReportStep, Screenshot};
use crate::store::{Storage, StoreError};

/// Result type for session operations
pub type SessionResult<T> = Result<T, SessionError>;

/// Error types for session operations
#[derive(Debug)]
pub enum SessionError {
    /// An action was invoked before `init()`
    NotInitialized,
    /// An action failed; already recorded as a failing report step
    Action(String),
    /// The outcome trail could not be persisted
    Store(StoreError),
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionError::NotInitialized => {
                write!(f, "Page is not initialized. Call init() first.")
            }
            SessionError::Action(msg) => write!(f, "{}", msg),
            SessionError::Store(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for SessionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SessionError::Store(err) => Some(err),
            _ => None,
        }
    }
}

impl From<StoreError> for SessionError {
    fn from(err: StoreError) -> Self {
        SessionError::Store(err)
    }
}

/// One browser session executing the steps of one report.
pub struct BrowserSession {
    store: Arc<dyn Storage>,
    report_id: String,
    driver: Option<Box<dyn PageDriver>>,
}

impl BrowserSession {
    /// Create a session writing its outcome trail under the given report.
    pub fn new(store: Arc<dyn Storage>, report_id: impl Into<String>) -> Self {
        Self {
            store,
            report_id: report_id.into(),
            driver: None,
        }
    }

    /// Attach a launched driver. Actions fail with a not-initialized
    /// error until this is called.
    pub fn init(&mut self, driver: Box<dyn PageDriver>) {
        self.driver = Some(driver);
    }

    /// Whether the session has been initialized
    pub fn is_initialized(&self) -> bool {
        self.driver.is_some()
    }

    /// Release the browser session. Safe to call repeatedly, and after a
    /// partial or failed init.
    pub async fn close(&mut self) {
        if let Some(mut driver) = self.driver.take() {
            if let Err(e) = driver.close().await {
                warn!("error closing browser session: {}", e);
            }
        }
    }

    fn driver(&self) -> SessionResult<&dyn PageDriver> {
        self.driver.as_deref().ok_or(SessionError::NotInitialized)
    }

    fn wait_timeout(&self) -> Duration {
        Duration::from_millis(config::get().browser.wait_timeout_ms)
    }

    // ========================================================================
    // Actions
    // ========================================================================

    /// Open the page under test; the first step of every run.
    pub async fn open_page(&self, url: &str) -> SessionResult<()> {
        let driver = self.driver()?;
        let result = driver.goto(url).await;
        self.finish(
            result,
            format!("Opened page with URL: {}", url),
            |e| format!("Error opening page with URL \"{}\": {}", url, e),
        )
        .await
    }

    /// Click an element, waiting for it to become visible first.
    pub async fn click(&self, selector: &str) -> SessionResult<()> {
        let driver = self.driver()?;
        let result = async {
            driver
                .wait_for_selector(selector, self.wait_timeout(), true)
                .await?;
            driver.click(selector).await
        }
        .await;
        self.finish(
            result,
            format!("Clicked on element with selector: {}", selector),
            |e| format!("Error clicking on selector \"{}\": {}", selector, e),
        )
        .await
    }

    /// Fill an input, waiting for it to become visible first.
    pub async fn fill(&self, selector: &str, value: &str) -> SessionResult<()> {
        let driver = self.driver()?;
        let result = async {
            driver
                .wait_for_selector(selector, self.wait_timeout(), true)
                .await?;
            driver.fill(selector, value).await
        }
        .await;
        self.finish(
            result,
            format!(
                "Filled element with selector: {}, value: {}",
                selector, value
            ),
            |e| format!("Error filling selector \"{}\": {}", selector, e),
        )
        .await
    }

    /// Hover over an element.
    pub async fn hover(&self, selector: &str) -> SessionResult<()> {
        let driver = self.driver()?;
        let result = driver.hover(selector).await;
        self.finish(
            result,
            format!("Hovered over element with selector: {}", selector),
            |e| format!("Error hovering over selector \"{}\": {}", selector, e),
        )
        .await
    }

    /// Check an element's text content against an expectation.
    ///
    /// Both sides are trimmed before comparison; a mismatch is treated
    /// identically to a driver-level failure.
    pub async fn check_text(&self, selector: &str, expected: &str) -> SessionResult<()> {
        let driver = self.driver()?;
        let result = async {
            let actual = driver.text_content(selector).await?;
            if actual.trim() != expected.trim() {
                return Err(DriverError::Action(format!(
                    "Text mismatch for selector \"{}\". Expected: \"{}\", Actual: \"{}\"",
                    selector, expected, actual
                )));
            }
            Ok(())
        }
        .await;
        self.finish(
            result,
            format!(
                "Checked text for element with selector: {}, expected: {}",
                selector, expected
            ),
            |e| format!("Error checking text for selector \"{}\": {}", selector, e),
        )
        .await
    }

    /// Wait for an element to appear, with an explicit timeout.
    pub async fn wait_for_element(&self, selector: &str, timeout_ms: u64) -> SessionResult<()> {
        let driver = self.driver()?;
        let result = driver
            .wait_for_selector(selector, Duration::from_millis(timeout_ms), false)
            .await;
        self.finish(
            result,
            format!("Waited for element with selector: {}", selector),
            |e| format!("Error waiting for selector \"{}\": {}", selector, e),
        )
        .await
    }

    /// Check that an element resolves and is visible.
    pub async fn check_visibility(&self, selector: &str) -> SessionResult<()> {
        let driver = self.driver()?;
        let result = async {
            let visible = driver.is_visible(selector).await?;
            if !visible {
                return Err(DriverError::Action(format!(
                    "Element with selector \"{}\" is not visible",
                    selector
                )));
            }
            Ok(())
        }
        .await;
        self.finish(
            result,
            format!("Checked visibility of element with selector: {}", selector),
            |e| {
                format!(
                    "Error checking visibility for selector \"{}\": {}",
                    selector, e
                )
            },
        )
        .await
    }

    /// Press a key (e.g. Enter, Tab) on an element.
    pub async fn press_key(&self, selector: &str, key: &str) -> SessionResult<()> {
        let driver = self.driver()?;
        let result = driver.press_key(selector, key).await;
        self.finish(
            result,
            format!("Pressed key \"{}\" on element with selector: {}", key, selector),
            |e| {
                format!(
                    "Error pressing key \"{}\" on selector \"{}\": {}",
                    key, selector, e
                )
            },
        )
        .await
    }

    /// Clear an input field.
    pub async fn clear_input(&self, selector: &str) -> SessionResult<()> {
        let driver = self.driver()?;
        let result = driver.fill(selector, "").await;
        self.finish(
            result,
            format!("Cleared input field with selector: {}", selector),
            |e| {
                format!(
                    "Error clearing input field with selector \"{}\": {}",
                    selector, e
                )
            },
        )
        .await
    }

    /// Double-click an element.
    pub async fn double_click(&self, selector: &str) -> SessionResult<()> {
        let driver = self.driver()?;
        let result = driver.double_click(selector).await;
        self.finish(
            result,
            format!("Double-clicked on element with selector: {}", selector),
            |e| format!("Error double-clicking on selector \"{}\": {}", selector, e),
        )
        .await
    }

    /// Right-click an element.
    pub async fn right_click(&self, selector: &str) -> SessionResult<()> {
        let driver = self.driver()?;
        let result = driver.right_click(selector).await;
        self.finish(
            result,
            format!("Right-clicked on element with selector: {}", selector),
            |e| format!("Error right-clicking on selector \"{}\": {}", selector, e),
        )
        .await
    }

    /// Give an element keyboard focus.
    pub async fn focus(&self, selector: &str) -> SessionResult<()> {
        let driver = self.driver()?;
        let result = driver.focus(selector).await;
        self.finish(
            result,
            format!("Focused on element with selector: {}", selector),
            |e| format!("Error focusing on selector \"{}\": {}", selector, e),
        )
        .await
    }

    /// Remove keyboard focus from an element.
    pub async fn blur(&self, selector: &str) -> SessionResult<()> {
        let driver = self.driver()?;
        let result = driver.blur(selector).await;
        self.finish(
            result,
            format!("Blurred element with selector: {}", selector),
            |e| format!("Error blurring selector \"{}\": {}", selector, e),
        )
        .await
    }

    /// Select an option of a `<select>` element by value.
    pub async fn select_option(&self, selector: &str, value: &str) -> SessionResult<()> {
        let driver = self.driver()?;
        let result = driver.select_option(selector, value).await;
        self.finish(
            result,
            format!(
                "Selected option \"{}\" in element with selector: {}",
                value, selector
            ),
            |e| format!("Error selecting option in selector \"{}\": {}", selector, e),
        )
        .await
    }

    /// Navigate back in session history.
    pub async fn go_back(&self) -> SessionResult<()> {
        let driver = self.driver()?;
        let result = driver.go_back().await;
        self.finish(result, "Navigated back".to_string(), |e| {
            format!("Error navigating back: {}", e)
        })
        .await
    }

    /// Navigate forward in session history.
    pub async fn go_forward(&self) -> SessionResult<()> {
        let driver = self.driver()?;
        let result = driver.go_forward().await;
        self.finish(result, "Navigated forward".to_string(), |e| {
            format!("Error navigating forward: {}", e)
        })
        .await
    }

    /// Record an explicit screenshot step.
    pub async fn take_screenshot(&self) -> SessionResult<()> {
        self.driver()?;
        self.record_outcome("Took screenshot".to_string(), true)
            .await
    }

    // ========================================================================
    // Highlighting (non-reporting visual aid)
    // ========================================================================

    /// Outline an element so screenshots show what is being acted on.
    ///
    /// Best effort: highlighting never fails a run and is not recorded
    /// as a report step.
    pub async fn highlight(&self, selector: &str) {
        let Some(driver) = self.driver.as_deref() else {
            return;
        };
        let script = format!(
            r#"(() => {{
                const element = document.querySelector({sel});
                if (element) {{
                    element.style.border = '3px solid red';
                    element.style.boxShadow = '0 0 10px rgba(255, 0, 0, 0.5)';
                    element.style.transition = 'all 0.3s ease';
                }}
            }})()"#,
            sel = js_string(selector)
        );
        if let Err(e) = driver.evaluate(&script).await {
            debug!("highlight failed for {}: {}", selector, e);
        }
        tokio::time::sleep(Duration::from_millis(
            config::get().browser.highlight_settle_ms,
        ))
        .await;
    }

    /// Remove the highlight outline again.
    pub async fn unhighlight(&self, selector: &str) {
        let Some(driver) = self.driver.as_deref() else {
            return;
        };
        let script = format!(
            r#"(() => {{
                const element = document.querySelector({sel});
                if (element) {{
                    element.style.border = '';
                    element.style.boxShadow = '';
                }}
            }})()"#,
            sel = js_string(selector)
        );
        if let Err(e) = driver.evaluate(&script).await {
            debug!("unhighlight failed for {}: {}", selector, e);
        }
    }

    // ========================================================================
    // Outcome recording
    // ========================================================================

    /// Map an attempt to the symmetric record-and-propagate contract.
    async fn finish(
        &self,
        result: DriverResult<()>,
        success: String,
        failure: impl FnOnce(&DriverError) -> String,
    ) -> SessionResult<()> {
        match result {
            Ok(()) => {
                self.record_outcome(success, true).await?;
                Ok(())
            }
            Err(e) => {
                self.record_outcome(failure(&e), false).await?;
                Err(SessionError::Action(e.to_string()))
            }
        }
    }

    /// Append one report step and capture its screenshot.
    async fn record_outcome(&self, description: String, status: bool) -> SessionResult<()> {
        let step = ReportStep::new(&self.report_id, description, status);
        let step_id = step.id.clone();
        self.store.create_report_step(step).await?;
        self.capture_screenshot(&step_id).await;
        Ok(())
    }

    /// Capture and persist a screenshot for a report step.
    ///
    /// Capture or persistence failures are logged and swallowed.
    async fn capture_screenshot(&self, report_step_id: &str) {
        let Some(driver) = self.driver.as_deref() else {
            return;
        };
        match driver.screenshot().await {
            Ok(bytes) => {
                let data = base64::engine::general_purpose::STANDARD.encode(&bytes);
                if let Err(e) = self
                    .store
                    .create_screenshot(Screenshot::new(report_step_id, data))
                    .await
                {
                    warn!("error saving screenshot: {}", e);
                }
            }
            Err(e) => {
                warn!("error taking screenshot: {}", e);
            }
        }
    }
}
