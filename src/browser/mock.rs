//! A scriptable driver double for testing the engine without a browser.
//!
//! `MockDriver` implements [`PageDriver`] with canned behavior:
//! per-selector failures, hidden elements, fixed text contents and
//! screenshot failures can all be configured up front, and every
//! operation is recorded in a call log.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::browser::driver::{DriverError, DriverFactory, DriverResult, PageDriver};
use crate::model::{BrowserKind, Viewport};

/// PNG signature bytes used as the mock screenshot payload
pub const MOCK_PNG: &[u8] = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

/// Canned behavior for a [`MockDriver`]
#[derive(Debug, Clone, Default)]
pub struct MockBehavior {
    /// Navigation failure message, if `goto` should fail
    pub fail_goto: Option<String>,
    /// Selectors on which any element action fails
    pub failing_selectors: HashSet<String>,
    /// Selectors that do not match any element
    pub missing_selectors: HashSet<String>,
    /// Selectors that resolve but are not visible
    pub hidden_selectors: HashSet<String>,
    /// Text contents returned by `text_content`, keyed by selector
    pub text_values: HashMap<String, String>,
    /// Whether screenshot capture fails
    pub fail_screenshot: bool,
}

impl MockBehavior {
    /// Behavior where every operation succeeds
    pub fn passing() -> Self {
        Self::default()
    }

    /// Make `goto` fail with the given message
    pub fn fail_goto(mut self, message: impl Into<String>) -> Self {
        self.fail_goto = Some(message.into());
        self
    }

    /// Make any element action on this selector fail
    pub fn failing_selector(mut self, selector: impl Into<String>) -> Self {
        self.failing_selectors.insert(selector.into());
        self
    }

    /// Make this selector match no element
    pub fn missing_selector(mut self, selector: impl Into<String>) -> Self {
        self.missing_selectors.insert(selector.into());
        self
    }

    /// Make this selector resolve to an invisible element
    pub fn hidden_selector(mut self, selector: impl Into<String>) -> Self {
        self.hidden_selectors.insert(selector.into());
        self
    }

    /// Set the text content reported for a selector
    pub fn text(mut self, selector: impl Into<String>, text: impl Into<String>) -> Self {
        self.text_values.insert(selector.into(), text.into());
        self
    }

    /// Make screenshot capture fail
    pub fn fail_screenshot(mut self) -> Self {
        self.fail_screenshot = true;
        self
    }
}

/// Scriptable [`PageDriver`] double
pub struct MockDriver {
    behavior: MockBehavior,
    calls: Arc<Mutex<Vec<String>>>,
}

impl MockDriver {
    /// Create a driver with the given behavior
    pub fn new(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Create an always-succeeding driver
    pub fn passing() -> Self {
        Self::new(MockBehavior::passing())
    }

    /// A handle onto the call log, valid after the driver is consumed
    pub fn call_log(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.calls)
    }

    /// The operations performed so far, in order
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("call log poisoned").clone()
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().expect("call log poisoned").push(call.into());
    }

    fn check_selector(&self, selector: &str) -> DriverResult<()> {
        if self.behavior.missing_selectors.contains(selector) {
            return Err(DriverError::NotFound(selector.to_string()));
        }
        if self.behavior.failing_selectors.contains(selector) {
            return Err(DriverError::Action(format!(
                "mock failure for \"{}\"",
                selector
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl PageDriver for MockDriver {
    async fn goto(&self, url: &str) -> DriverResult<()> {
        self.record(format!("goto {}", url));
        match &self.behavior.fail_goto {
            Some(msg) => Err(DriverError::Navigation(msg.clone())),
            None => Ok(()),
        }
    }

    async fn go_back(&self) -> DriverResult<()> {
        self.record("go_back");
        Ok(())
    }

    async fn go_forward(&self) -> DriverResult<()> {
        self.record("go_forward");
        Ok(())
    }

    async fn wait_for_selector(
        &self,
        selector: &str,
        timeout: Duration,
        require_visible: bool,
    ) -> DriverResult<()> {
        self.record(format!("wait_for_selector {}", selector));
        if self.behavior.missing_selectors.contains(selector)
            || (require_visible && self.behavior.hidden_selectors.contains(selector))
        {
            return Err(DriverError::Timeout {
                selector: selector.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            });
        }
        Ok(())
    }

    async fn click(&self, selector: &str) -> DriverResult<()> {
        self.record(format!("click {}", selector));
        self.check_selector(selector)
    }

    async fn double_click(&self, selector: &str) -> DriverResult<()> {
        self.record(format!("double_click {}", selector));
        self.check_selector(selector)
    }

    async fn right_click(&self, selector: &str) -> DriverResult<()> {
        self.record(format!("right_click {}", selector));
        self.check_selector(selector)
    }

    async fn fill(&self, selector: &str, value: &str) -> DriverResult<()> {
        self.record(format!("fill {} = {}", selector, value));
        self.check_selector(selector)
    }

    async fn press_key(&self, selector: &str, key: &str) -> DriverResult<()> {
        self.record(format!("press_key {} {}", selector, key));
        self.check_selector(selector)
    }

    async fn hover(&self, selector: &str) -> DriverResult<()> {
        self.record(format!("hover {}", selector));
        self.check_selector(selector)
    }

    async fn focus(&self, selector: &str) -> DriverResult<()> {
        self.record(format!("focus {}", selector));
        self.check_selector(selector)
    }

    async fn blur(&self, selector: &str) -> DriverResult<()> {
        self.record(format!("blur {}", selector));
        self.check_selector(selector)
    }

    async fn select_option(&self, selector: &str, value: &str) -> DriverResult<()> {
        self.record(format!("select_option {} = {}", selector, value));
        self.check_selector(selector)
    }

    async fn text_content(&self, selector: &str) -> DriverResult<String> {
        self.record(format!("text_content {}", selector));
        if self.behavior.missing_selectors.contains(selector) {
            return Err(DriverError::NotFound(selector.to_string()));
        }
        Ok(self
            .behavior
            .text_values
            .get(selector)
            .cloned()
            .unwrap_or_default())
    }

    async fn is_visible(&self, selector: &str) -> DriverResult<bool> {
        self.record(format!("is_visible {}", selector));
        Ok(!self.behavior.missing_selectors.contains(selector)
            && !self.behavior.hidden_selectors.contains(selector))
    }

    async fn screenshot(&self) -> DriverResult<Vec<u8>> {
        self.record("screenshot");
        if self.behavior.fail_screenshot {
            return Err(DriverError::Action("mock screenshot failure".to_string()));
        }
        Ok(MOCK_PNG.to_vec())
    }

    async fn evaluate(&self, _script: &str) -> DriverResult<()> {
        // Highlight/unhighlight land here; keep the log readable.
        self.record("evaluate");
        Ok(())
    }

    async fn close(&mut self) -> DriverResult<()> {
        self.record("close");
        Ok(())
    }

    fn kind(&self) -> &str {
        "mock"
    }
}

/// Factory handing out identically-behaved mock drivers.
///
/// Tracks how many drivers were created so tests can assert that no
/// session was ever launched (e.g. for compile-time rejections).
pub struct MockDriverFactory {
    behavior: MockBehavior,
    fail_create: bool,
    created: Arc<AtomicUsize>,
}

impl MockDriverFactory {
    /// Factory producing drivers with the given behavior
    pub fn new(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            fail_create: false,
            created: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Factory producing always-succeeding drivers
    pub fn passing() -> Self {
        Self::new(MockBehavior::passing())
    }

    /// Make `create` itself fail (simulates a browser launch failure)
    pub fn failing_create(mut self) -> Self {
        self.fail_create = true;
        self
    }

    /// Number of drivers created so far
    pub fn created_count(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DriverFactory for MockDriverFactory {
    async fn create(
        &self,
        _browser: BrowserKind,
        _viewport: Viewport,
    ) -> DriverResult<Box<dyn PageDriver>> {
        if self.fail_create {
            return Err(DriverError::Launch("mock launch failure".to_string()));
        }
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockDriver::new(self.behavior.clone())))
    }
}
