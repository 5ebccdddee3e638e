//! Raw browser operations behind a swappable driver seam.
//!
//! [`PageDriver`] is the unified interface the action executor drives:
//! - `CdpDriver` talks to a headless Chromium via the Chrome DevTools
//!   Protocol (chromiumoxide)
//! - `MockDriver` (see [`crate::browser::mock`]) is a scriptable test double

use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::Page;
use chromiumoxide::browser::{Browser, BrowserConfig, HeadlessMode};
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::page::ScreenshotParams;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config;
use crate::model::{BrowserKind, Viewport};

/// Result type for driver operations
pub type DriverResult<T> = Result<T, DriverError>;

/// Error types for driver operations
#[derive(Debug, Clone)]
pub enum DriverError {
    /// Browser process failed to launch
    Launch(String),
    /// Page navigation failed
    Navigation(String),
    /// No element matched the selector
    NotFound(String),
    /// Selector did not satisfy the wait condition in time
    Timeout {
        /// Selector waited for
        selector: String,
        /// Wait budget in milliseconds
        timeout_ms: u64,
    },
    /// In-page script evaluation failed
    Script(String),
    /// An element-level operation failed
    Action(String),
}

impl std::fmt::Display for DriverError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DriverError::Launch(msg) => write!(f, "Browser launch failed: {}", msg),
            DriverError::Navigation(msg) => write!(f, "Navigation failed: {}", msg),
            DriverError::NotFound(selector) => {
                write!(f, "Element with selector \"{}\" not found", selector)
            }
            DriverError::Timeout {
                selector,
                timeout_ms,
            } => write!(
                f,
                "Timeout waiting for selector \"{}\" after {}ms",
                selector, timeout_ms
            ),
            DriverError::Script(msg) => write!(f, "Script evaluation failed: {}", msg),
            DriverError::Action(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for DriverError {}

/// Raw page operations the action executor is built on.
///
/// Every method maps to one browser-level primitive; the
/// record-and-screenshot symmetry lives a layer up in
/// [`crate::browser::session::BrowserSession`].
#[async_trait]
pub trait PageDriver: Send + Sync {
    /// Navigate to a URL and wait for the load to settle
    async fn goto(&self, url: &str) -> DriverResult<()>;

    /// Navigate back in session history
    async fn go_back(&self) -> DriverResult<()>;

    /// Navigate forward in session history
    async fn go_forward(&self) -> DriverResult<()>;

    /// Wait until a selector matches (and, optionally, is visible)
    async fn wait_for_selector(
        &self,
        selector: &str,
        timeout: Duration,
        require_visible: bool,
    ) -> DriverResult<()>;

    /// Click the element matching the selector
    async fn click(&self, selector: &str) -> DriverResult<()>;

    /// Double-click the element matching the selector
    async fn double_click(&self, selector: &str) -> DriverResult<()>;

    /// Right-click (context menu) the element matching the selector
    async fn right_click(&self, selector: &str) -> DriverResult<()>;

    /// Replace the element's value, firing input/change events
    async fn fill(&self, selector: &str, value: &str) -> DriverResult<()>;

    /// Press a key (e.g. "Enter", "Tab") on the element
    async fn press_key(&self, selector: &str, key: &str) -> DriverResult<()>;

    /// Hover the element matching the selector
    async fn hover(&self, selector: &str) -> DriverResult<()>;

    /// Give the element keyboard focus
    async fn focus(&self, selector: &str) -> DriverResult<()>;

    /// Remove keyboard focus from the element
    async fn blur(&self, selector: &str) -> DriverResult<()>;

    /// Select an option of a `<select>` element by value
    async fn select_option(&self, selector: &str, value: &str) -> DriverResult<()>;

    /// The element's text content
    async fn text_content(&self, selector: &str) -> DriverResult<String>;

    /// Whether the element exists and is visible (`false` when missing)
    async fn is_visible(&self, selector: &str) -> DriverResult<bool>;

    /// Capture a full-page PNG screenshot
    async fn screenshot(&self) -> DriverResult<Vec<u8>>;

    /// Evaluate a script on the page, discarding its value
    async fn evaluate(&self, script: &str) -> DriverResult<()>;

    /// Release the underlying browser resources; safe to call twice
    async fn close(&mut self) -> DriverResult<()>;

    /// Driver type identifier (e.g. "cdp", "mock")
    fn kind(&self) -> &str;
}

/// Creates one driver per test run.
///
/// The runner goes through this seam so tests can substitute
/// [`crate::browser::mock::MockDriver`] sessions.
#[async_trait]
pub trait DriverFactory: Send + Sync {
    /// Launch a fresh driver sized to the given viewport
    async fn create(
        &self,
        browser: BrowserKind,
        viewport: Viewport,
    ) -> DriverResult<Box<dyn PageDriver>>;
}

/// Settle time after history navigation (milliseconds)
const HISTORY_SETTLE_MS: u64 = 500;

/// Poll interval while waiting for a selector (milliseconds)
const WAIT_POLL_MS: u64 = 100;

/// CDP-backed driver: one Chromium process, one page.
pub struct CdpDriver {
    browser: Browser,
    page: Page,
    handler_task: JoinHandle<()>,
}

impl CdpDriver {
    /// Launch a headless (per configuration) Chromium sized to the viewport.
    pub async fn launch(viewport: Viewport) -> DriverResult<Self> {
        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .window_size(viewport.width, viewport.height);
        builder = if config::get().browser.headless {
            builder.headless_mode(HeadlessMode::True)
        } else {
            builder.with_head()
        };
        let browser_config = builder.build().map_err(DriverError::Launch)?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| DriverError::Launch(e.to_string()))?;

        // The handler task pumps CDP websocket messages for the whole
        // lifetime of the browser connection.
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    debug!("CDP handler event loop ended");
                    break;
                }
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| DriverError::Launch(format!("failed to create page: {}", e)))?;

        debug!(
            width = viewport.width,
            height = viewport.height,
            "launched Chromium"
        );

        Ok(Self {
            browser,
            page,
            handler_task,
        })
    }

    /// Evaluate a script and deserialize its value.
    async fn eval_value<T: serde::de::DeserializeOwned>(&self, script: String) -> DriverResult<T> {
        let result = self
            .page
            .evaluate(script)
            .await
            .map_err(|e| DriverError::Script(e.to_string()))?;
        result
            .into_value::<T>()
            .map_err(|e| DriverError::Script(e.to_string()))
    }

    /// Whether the selector currently matches an element.
    async fn present_now(&self, selector: &str) -> DriverResult<bool> {
        self.eval_value(format!(
            "document.querySelector({}) !== null",
            js_string(selector)
        ))
        .await
    }

    /// Whether the selector matches an element that is rendered visible.
    async fn visible_now(&self, selector: &str) -> DriverResult<bool> {
        let script = format!(
            r#"(() => {{
                const el = document.querySelector({sel});
                if (!el) return false;
                const style = window.getComputedStyle(el);
                if (style.display === 'none' || style.visibility === 'hidden' || style.opacity === '0') return false;
                const rect = el.getBoundingClientRect();
                return rect.width > 0 && rect.height > 0;
            }})()"#,
            sel = js_string(selector)
        );
        self.eval_value(script).await
    }

    /// Run an element-targeted script returning `true` when the element
    /// was found, mapping `false` to [`DriverError::NotFound`].
    async fn eval_on_element(&self, selector: &str, script: String) -> DriverResult<()> {
        let found: bool = self.eval_value(script).await?;
        if found {
            Ok(())
        } else {
            Err(DriverError::NotFound(selector.to_string()))
        }
    }
}

#[async_trait]
impl PageDriver for CdpDriver {
    async fn goto(&self, url: &str) -> DriverResult<()> {
        self.page
            .goto(url)
            .await
            .map_err(|e| DriverError::Navigation(e.to_string()))?;
        self.page
            .wait_for_navigation()
            .await
            .map_err(|e| DriverError::Navigation(e.to_string()))?;
        Ok(())
    }

    async fn go_back(&self) -> DriverResult<()> {
        self.evaluate("history.back()").await?;
        tokio::time::sleep(Duration::from_millis(HISTORY_SETTLE_MS)).await;
        Ok(())
    }

    async fn go_forward(&self) -> DriverResult<()> {
        self.evaluate("history.forward()").await?;
        tokio::time::sleep(Duration::from_millis(HISTORY_SETTLE_MS)).await;
        Ok(())
    }

    async fn wait_for_selector(
        &self,
        selector: &str,
        timeout: Duration,
        require_visible: bool,
    ) -> DriverResult<()> {
        let start = std::time::Instant::now();
        loop {
            let satisfied = if require_visible {
                self.visible_now(selector).await?
            } else {
                self.present_now(selector).await?
            };
            if satisfied {
                return Ok(());
            }
            if start.elapsed() >= timeout {
                return Err(DriverError::Timeout {
                    selector: selector.to_string(),
                    timeout_ms: timeout.as_millis() as u64,
                });
            }
            tokio::time::sleep(Duration::from_millis(WAIT_POLL_MS)).await;
        }
    }

    async fn click(&self, selector: &str) -> DriverResult<()> {
        let element = self
            .page
            .find_element(selector)
            .await
            .map_err(|_| DriverError::NotFound(selector.to_string()))?;
        element
            .click()
            .await
            .map_err(|e| DriverError::Action(format!("click on \"{}\" failed: {}", selector, e)))?;
        Ok(())
    }

    async fn double_click(&self, selector: &str) -> DriverResult<()> {
        let script = format!(
            r#"(() => {{
                const el = document.querySelector({sel});
                if (!el) return false;
                el.dispatchEvent(new MouseEvent('dblclick', {{ bubbles: true, cancelable: true, view: window }}));
                return true;
            }})()"#,
            sel = js_string(selector)
        );
        self.eval_on_element(selector, script).await
    }

    async fn right_click(&self, selector: &str) -> DriverResult<()> {
        let script = format!(
            r#"(() => {{
                const el = document.querySelector({sel});
                if (!el) return false;
                el.dispatchEvent(new MouseEvent('contextmenu', {{ bubbles: true, cancelable: true, view: window }}));
                return true;
            }})()"#,
            sel = js_string(selector)
        );
        self.eval_on_element(selector, script).await
    }

    async fn fill(&self, selector: &str, value: &str) -> DriverResult<()> {
        let script = format!(
            r#"(() => {{
                const el = document.querySelector({sel});
                if (!el) return false;
                el.focus();
                el.value = {val};
                el.dispatchEvent(new Event('input', {{ bubbles: true }}));
                el.dispatchEvent(new Event('change', {{ bubbles: true }}));
                return true;
            }})()"#,
            sel = js_string(selector),
            val = js_string(value)
        );
        self.eval_on_element(selector, script).await
    }

    async fn press_key(&self, selector: &str, key: &str) -> DriverResult<()> {
        let element = self
            .page
            .find_element(selector)
            .await
            .map_err(|_| DriverError::NotFound(selector.to_string()))?;
        element.press_key(key).await.map_err(|e| {
            DriverError::Action(format!(
                "pressing \"{}\" on \"{}\" failed: {}",
                key, selector, e
            ))
        })?;
        Ok(())
    }

    async fn hover(&self, selector: &str) -> DriverResult<()> {
        let script = format!(
            r#"(() => {{
                const el = document.querySelector({sel});
                if (!el) return false;
                el.dispatchEvent(new MouseEvent('mouseover', {{ bubbles: true, view: window }}));
                el.dispatchEvent(new MouseEvent('mouseenter', {{ view: window }}));
                return true;
            }})()"#,
            sel = js_string(selector)
        );
        self.eval_on_element(selector, script).await
    }

    async fn focus(&self, selector: &str) -> DriverResult<()> {
        let script = format!(
            r#"(() => {{
                const el = document.querySelector({sel});
                if (!el) return false;
                el.focus();
                return true;
            }})()"#,
            sel = js_string(selector)
        );
        self.eval_on_element(selector, script).await
    }

    async fn blur(&self, selector: &str) -> DriverResult<()> {
        let script = format!(
            r#"(() => {{
                const el = document.querySelector({sel});
                if (!el) return false;
                el.blur();
                return true;
            }})()"#,
            sel = js_string(selector)
        );
        self.eval_on_element(selector, script).await
    }

    async fn select_option(&self, selector: &str, value: &str) -> DriverResult<()> {
        let script = format!(
            r#"(() => {{
                const el = document.querySelector({sel});
                if (!el) return false;
                el.value = {val};
                el.dispatchEvent(new Event('input', {{ bubbles: true }}));
                el.dispatchEvent(new Event('change', {{ bubbles: true }}));
                return true;
            }})()"#,
            sel = js_string(selector),
            val = js_string(value)
        );
        self.eval_on_element(selector, script).await
    }

    async fn text_content(&self, selector: &str) -> DriverResult<String> {
        let script = format!(
            r#"(() => {{
                const el = document.querySelector({sel});
                return el ? el.textContent : null;
            }})()"#,
            sel = js_string(selector)
        );
        let text: Option<String> = self.eval_value(script).await?;
        text.ok_or_else(|| DriverError::NotFound(selector.to_string()))
    }

    async fn is_visible(&self, selector: &str) -> DriverResult<bool> {
        self.visible_now(selector).await
    }

    async fn screenshot(&self) -> DriverResult<Vec<u8>> {
        self.page
            .screenshot(
                ScreenshotParams::builder()
                    .format(CaptureScreenshotFormat::Png)
                    .full_page(true)
                    .build(),
            )
            .await
            .map_err(|e| DriverError::Action(format!("screenshot failed: {}", e)))
    }

    async fn evaluate(&self, script: &str) -> DriverResult<()> {
        self.page
            .evaluate(script.to_string())
            .await
            .map_err(|e| DriverError::Script(e.to_string()))?;
        Ok(())
    }

    async fn close(&mut self) -> DriverResult<()> {
        if let Err(e) = self.browser.close().await {
            warn!("error closing browser: {}", e);
        }
        self.handler_task.abort();
        Ok(())
    }

    fn kind(&self) -> &str {
        "cdp"
    }
}

/// Production driver factory: launches one Chromium per test run.
///
/// All batches execute on Chromium; the requested [`BrowserKind`] is
/// validated upstream and recorded with the batch.
pub struct CdpLauncher;

#[async_trait]
impl DriverFactory for CdpLauncher {
    async fn create(
        &self,
        browser: BrowserKind,
        viewport: Viewport,
    ) -> DriverResult<Box<dyn PageDriver>> {
        debug!(browser = browser.name(), "creating CDP driver");
        let driver = CdpDriver::launch(viewport).await?;
        Ok(Box::new(driver))
    }
}

/// Quote a string as a JavaScript string literal.
///
/// Selectors and values are user data; they are embedded into generated
/// scripts only through this escaping.
pub(crate) fn js_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\u{2028}' => out.push_str("\\u2028"),
            '\u{2029}' => out.push_str("\\u2029"),
            c if (c as u32) < 0x20 => {
                out.push_str(&format!("\\u{:04x}", c as u32));
            }
            c => out.push(c),
        }
    }
    out.push('"');
    out
}
