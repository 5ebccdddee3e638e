//! Core data shapes for the test execution engine.
//!
//! Tests, steps, element/action catalogs and page targets are long-lived,
//! CRUD-managed records; reports, report steps and screenshots are created
//! only by a run and never mutated afterwards (except the report's
//! finalization fields).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Browsers a batch may be targeted at.
///
/// The name is validated at the boundary and recorded with the batch;
/// execution itself drives a Chromium instance through the CDP driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BrowserKind {
    Chrome,
    Firefox,
    Safari,
}

impl BrowserKind {
    /// All allowed browser names, in display form.
    pub const ALLOWED: [&'static str; 3] = ["Chrome", "Firefox", "Safari"];

    /// Parse a browser name (case-insensitive). Returns `None` for
    /// anything outside the allow-list.
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "chrome" => Some(Self::Chrome),
            "firefox" => Some(Self::Firefox),
            "safari" => Some(Self::Safari),
            _ => None,
        }
    }

    /// Display name matching the allow-list spelling.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Chrome => "Chrome",
            Self::Firefox => "Firefox",
            Self::Safari => "Safari",
        }
    }
}

/// Viewport dimensions for a page target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
        }
    }
}

/// The page a test runs against
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageTarget {
    /// Unique page id
    pub id: String,
    /// URL opened as the first step of every run
    pub url: String,
    /// Viewport the browser window is sized to
    pub viewport: Viewport,
}

/// A DOM target identified by a selector string
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebElement {
    /// Unique element id (stable even when the selector is edited)
    pub id: String,
    /// CSS selector locating the element
    pub selector: String,
    /// Human-readable element title
    pub title: String,
    /// Element kind (e.g. "button", "input")
    pub kind: String,
}

/// A row of the action catalog
///
/// The executor vocabulary itself is the closed instruction set in
/// [`crate::engine::compiler`]; this is the persisted catalog entry a
/// step references by id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionSpec {
    /// Unique action id
    pub id: String,
    /// Action name (e.g. "click", "fill", "checkText")
    pub name: String,
    /// Whether steps using this action must carry a non-empty value
    pub with_value: bool,
}

/// One ordered instruction in a test
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    /// Unique step id
    pub id: String,
    /// Owning test
    pub test_id: String,
    /// Target element; `None` only for actions that need no element
    /// (goBack, goForward, takeScreenshot)
    #[serde(default)]
    pub web_element_id: Option<String>,
    /// Referenced action catalog row
    pub action_id: String,
    /// Action value (fill text, expected text, key, timeout, ...)
    #[serde(default)]
    pub value: Option<String>,
    /// Position within the test; execution preserves this order
    pub order: u32,
}

/// A stored UI test: an ordered sequence of steps against one page
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Test {
    /// Unique test id
    pub id: String,
    /// Test title
    pub title: String,
    /// Page the test runs against
    pub page_id: String,
    /// Run-status guard flag; mutated only through the guard
    #[serde(default)]
    pub is_running: bool,
}

/// The overall outcome of one execution attempt of a test
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    /// Unique report id
    pub id: String,
    /// Test this run executed
    pub test_id: String,
    /// `false` while pending, final pass/fail once the run ends
    pub status: bool,
    /// Elapsed wall-clock time of the run in milliseconds
    pub execution_time_ms: u64,
    /// When the run started
    pub created_at: DateTime<Utc>,
}

impl Report {
    /// Create a pending report, as written at the start of a run.
    pub fn pending(test_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            test_id: test_id.into(),
            status: false,
            execution_time_ms: 0,
            created_at: Utc::now(),
        }
    }
}

/// One action's outcome within a report; append-only
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportStep {
    /// Unique report step id
    pub id: String,
    /// Owning report
    pub report_id: String,
    /// Human-readable description; embeds the failure message on failure
    pub description: String,
    /// Whether the action succeeded
    pub status: bool,
    /// Creation time; report steps are ordered by it
    pub created_at: DateTime<Utc>,
}

impl ReportStep {
    /// Create a report step for the given report.
    pub fn new(report_id: impl Into<String>, description: impl Into<String>, status: bool) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            report_id: report_id.into(),
            description: description.into(),
            status,
            created_at: Utc::now(),
        }
    }
}

/// A base64-encoded PNG captured right after an action attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Screenshot {
    /// Unique screenshot id
    pub id: String,
    /// Report step this screenshot documents
    pub report_step_id: String,
    /// Base64-encoded PNG data
    pub data: String,
}

impl Screenshot {
    /// Create a screenshot record for the given report step.
    pub fn new(report_step_id: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            report_step_id: report_step_id.into(),
            data: data.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_browser_kind_parse() {
        assert_eq!(BrowserKind::parse("Chrome"), Some(BrowserKind::Chrome));
        assert_eq!(BrowserKind::parse("firefox"), Some(BrowserKind::Firefox));
        assert_eq!(BrowserKind::parse("SAFARI"), Some(BrowserKind::Safari));
    }

    #[test]
    fn test_browser_kind_rejects_unknown() {
        assert_eq!(BrowserKind::parse("edge"), None);
        assert_eq!(BrowserKind::parse(""), None);
        assert_eq!(BrowserKind::parse("chromium"), None);
    }

    #[test]
    fn test_browser_kind_name_roundtrip() {
        for name in BrowserKind::ALLOWED {
            let kind = BrowserKind::parse(name).unwrap();
            assert_eq!(kind.name(), name);
        }
    }

    #[test]
    fn test_report_pending() {
        let report = Report::pending("t1");
        assert_eq!(report.test_id, "t1");
        assert!(!report.status);
        assert_eq!(report.execution_time_ms, 0);
        assert!(!report.id.is_empty());
    }

    #[test]
    fn test_report_step_new() {
        let step = ReportStep::new("r1", "Clicked on element with selector: #go", true);
        assert_eq!(step.report_id, "r1");
        assert!(step.status);
        assert!(step.description.contains("#go"));
    }

    #[test]
    fn test_viewport_default() {
        let vp = Viewport::default();
        assert_eq!(vp.width, 1280);
        assert_eq!(vp.height, 720);
    }
}
