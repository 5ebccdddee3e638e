//! Compiles a stored test into an executable run plan.
//!
//! Each (action, element, value) step is lowered to one case of a closed
//! instruction set, so the interpreter's dispatch is exhaustive and an
//! unsupported or malformed step is rejected here — before any browser
//! session is launched and before any report row exists.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config;
use crate::model::{Test, Viewport};
use crate::store::{Storage, StoreError};

/// The supported action vocabulary, as stored in the action catalog.
pub const SUPPORTED_ACTIONS: [&str; 16] = [
    "click",
    "fill",
    "hover",
    "checkText",
    "waitForElement",
    "goBack",
    "goForward",
    "selectOption",
    "checkVisibility",
    "pressKey",
    "clearInput",
    "doubleClick",
    "rightClick",
    "focus",
    "blur",
    "takeScreenshot",
];

/// An action performed against one element.
///
/// Value-carrying variants hold their payload, so a plan that compiled
/// can always be executed without re-validating step data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ElementAction {
    Click,
    Fill { value: String },
    Hover,
    CheckText { expected: String },
    WaitForElement { timeout_ms: u64 },
    SelectOption { value: String },
    CheckVisibility,
    PressKey { key: String },
    ClearInput,
    DoubleClick,
    RightClick,
    Focus,
    Blur,
}

/// A browser-level action without an element target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BrowserAction {
    GoBack,
    GoForward,
    TakeScreenshot,
}

/// One executable instruction of a run plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Instruction {
    /// Navigate to the test's page; always the first instruction
    Open { url: String },
    /// An element-targeted action, executed with highlight bracketing
    Element {
        action: ElementAction,
        selector: String,
    },
    /// A browser-level action, executed without highlighting
    Browser { action: BrowserAction },
}

/// A compiled test: everything one run needs, resolved and validated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunPlan {
    /// The test this plan was compiled from
    pub test_id: String,
    /// Test title, for logs and artifacts
    pub title: String,
    /// Viewport the browser is sized to
    pub viewport: Viewport,
    /// Instructions in execution order; `Open` first
    pub instructions: Vec<Instruction>,
}

/// Result type for compilation
pub type CompileResult<T> = Result<T, CompileError>;

/// Error types for compilation
#[derive(Debug, Clone)]
pub enum CompileError {
    /// The action name is not part of the executor vocabulary
    UnsupportedAction { action: String },
    /// A value-carrying action has no (or an empty) value
    MissingValue { action: String, order: u32 },
    /// An element-targeted action has no resolved element
    MissingElement { action: String, order: u32 },
    /// A waitForElement value is present but not a number
    InvalidTimeout { value: String, order: u32 },
    /// A step references an action row that does not exist
    UnknownAction { action_id: String },
    /// A step references an element row that does not exist
    UnknownElement { element_id: String },
    /// The test references a page that does not exist
    UnknownPage { page_id: String },
    /// Storage failure while resolving references
    Store(StoreError),
}

impl std::fmt::Display for CompileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompileError::UnsupportedAction { action } => {
                write!(f, "Unsupported action: {}", action)
            }
            CompileError::MissingValue { action, order } => {
                write!(f, "Action \"{}\" at step {} requires a value", action, order)
            }
            CompileError::MissingElement { action, order } => write!(
                f,
                "Action \"{}\" at step {} requires a web element",
                action, order
            ),
            CompileError::InvalidTimeout { value, order } => {
                write!(f, "Invalid timeout value \"{}\" at step {}", value, order)
            }
            CompileError::UnknownAction { action_id } => {
                write!(f, "Unknown action reference: {}", action_id)
            }
            CompileError::UnknownElement { element_id } => {
                write!(f, "Unknown element reference: {}", element_id)
            }
            CompileError::UnknownPage { page_id } => {
                write!(f, "Unknown page reference: {}", page_id)
            }
            CompileError::Store(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for CompileError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CompileError::Store(err) => Some(err),
            _ => None,
        }
    }
}

impl From<StoreError> for CompileError {
    fn from(err: StoreError) -> Self {
        CompileError::Store(err)
    }
}

/// Compile a test into a run plan, resolving every step's element and
/// action reference through the store.
pub async fn compile_test(store: &Arc<dyn Storage>, test: &Test) -> CompileResult<RunPlan> {
    let page = store
        .page(&test.page_id)
        .await?
        .ok_or_else(|| CompileError::UnknownPage {
            page_id: test.page_id.clone(),
        })?;

    let steps = store.steps_for_test(&test.id).await?;

    let mut instructions = Vec::with_capacity(steps.len() + 1);
    instructions.push(Instruction::Open {
        url: page.url.clone(),
    });

    for step in &steps {
        let action =
            store
                .action(&step.action_id)
                .await?
                .ok_or_else(|| CompileError::UnknownAction {
                    action_id: step.action_id.clone(),
                })?;

        let selector = match &step.web_element_id {
            Some(element_id) => Some(
                store
                    .web_element(element_id)
                    .await?
                    .ok_or_else(|| CompileError::UnknownElement {
                        element_id: element_id.clone(),
                    })?
                    .selector,
            ),
            None => None,
        };

        instructions.push(lower_step(
            &action.name,
            selector.as_deref(),
            step.value.as_deref(),
            step.order,
        )?);
    }

    Ok(RunPlan {
        test_id: test.id.clone(),
        title: test.title.clone(),
        viewport: page.viewport,
        instructions,
    })
}

/// Lower one step to an instruction. Pure; all validation happens here.
pub fn lower_step(
    action_name: &str,
    selector: Option<&str>,
    value: Option<&str>,
    order: u32,
) -> CompileResult<Instruction> {
    let element = |action: ElementAction| -> CompileResult<Instruction> {
        let selector = selector.ok_or_else(|| CompileError::MissingElement {
            action: action_name.to_string(),
            order,
        })?;
        Ok(Instruction::Element {
            action,
            selector: selector.to_string(),
        })
    };

    match action_name {
        "click" => element(ElementAction::Click),
        "fill" => element(ElementAction::Fill {
            value: require_value(action_name, value, order)?,
        }),
        "hover" => element(ElementAction::Hover),
        "checkText" => element(ElementAction::CheckText {
            expected: require_value(action_name, value, order)?,
        }),
        "waitForElement" => element(ElementAction::WaitForElement {
            timeout_ms: parse_timeout(value, order)?,
        }),
        "selectOption" => element(ElementAction::SelectOption {
            value: require_value(action_name, value, order)?,
        }),
        "checkVisibility" => element(ElementAction::CheckVisibility),
        "pressKey" => element(ElementAction::PressKey {
            key: require_value(action_name, value, order)?,
        }),
        "clearInput" => element(ElementAction::ClearInput),
        "doubleClick" => element(ElementAction::DoubleClick),
        "rightClick" => element(ElementAction::RightClick),
        "focus" => element(ElementAction::Focus),
        "blur" => element(ElementAction::Blur),
        "goBack" => Ok(Instruction::Browser {
            action: BrowserAction::GoBack,
        }),
        "goForward" => Ok(Instruction::Browser {
            action: BrowserAction::GoForward,
        }),
        "takeScreenshot" => Ok(Instruction::Browser {
            action: BrowserAction::TakeScreenshot,
        }),
        other => Err(CompileError::UnsupportedAction {
            action: other.to_string(),
        }),
    }
}

/// A value-carrying action must have a non-empty value.
fn require_value(action_name: &str, value: Option<&str>, order: u32) -> CompileResult<String> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(CompileError::MissingValue {
            action: action_name.to_string(),
            order,
        }),
    }
}

/// Parse a waitForElement timeout, defaulting when the step has none.
fn parse_timeout(value: Option<&str>, order: u32) -> CompileResult<u64> {
    match value.map(str::trim) {
        None | Some("") => Ok(config::default_wait_timeout_ms()),
        Some(v) => v.parse().map_err(|_| CompileError::InvalidTimeout {
            value: v.to_string(),
            order,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_WAIT_TIMEOUT_MS;
    use crate::model::{ActionSpec, PageTarget, Step, WebElement};
    use crate::store::MemoryStore;

    #[test]
    fn test_lower_click() {
        let instruction = lower_step("click", Some("#go"), None, 1).unwrap();
        assert_eq!(
            instruction,
            Instruction::Element {
                action: ElementAction::Click,
                selector: "#go".to_string(),
            }
        );
    }

    #[test]
    fn test_lower_unsupported_action() {
        let err = lower_step("teleport", Some("#go"), None, 1).unwrap_err();
        assert!(matches!(err, CompileError::UnsupportedAction { .. }));
        assert_eq!(err.to_string(), "Unsupported action: teleport");
    }

    #[test]
    fn test_lower_fill_requires_value() {
        let err = lower_step("fill", Some("#name"), None, 2).unwrap_err();
        assert!(matches!(err, CompileError::MissingValue { .. }));

        let err = lower_step("fill", Some("#name"), Some("   "), 2).unwrap_err();
        assert!(matches!(err, CompileError::MissingValue { .. }));
    }

    #[test]
    fn test_lower_click_requires_element() {
        let err = lower_step("click", None, None, 3).unwrap_err();
        assert!(matches!(err, CompileError::MissingElement { .. }));
    }

    #[test]
    fn test_lower_wait_defaults_timeout() {
        let instruction = lower_step("waitForElement", Some("#late"), None, 1).unwrap();
        assert_eq!(
            instruction,
            Instruction::Element {
                action: ElementAction::WaitForElement {
                    timeout_ms: DEFAULT_WAIT_TIMEOUT_MS
                },
                selector: "#late".to_string(),
            }
        );
    }

    #[test]
    fn test_lower_wait_parses_timeout() {
        let instruction = lower_step("waitForElement", Some("#late"), Some("2500"), 1).unwrap();
        assert_eq!(
            instruction,
            Instruction::Element {
                action: ElementAction::WaitForElement { timeout_ms: 2500 },
                selector: "#late".to_string(),
            }
        );
    }

    #[test]
    fn test_lower_wait_rejects_non_numeric_timeout() {
        let err = lower_step("waitForElement", Some("#late"), Some("soon"), 4).unwrap_err();
        assert!(matches!(err, CompileError::InvalidTimeout { .. }));
    }

    #[test]
    fn test_lower_browser_actions_need_no_element() {
        for name in ["goBack", "goForward", "takeScreenshot"] {
            let instruction = lower_step(name, None, None, 1).unwrap();
            assert!(matches!(instruction, Instruction::Browser { .. }));
        }
    }

    #[test]
    fn test_supported_actions_all_lower() {
        for name in SUPPORTED_ACTIONS {
            let result = lower_step(name, Some("#el"), Some("1000"), 1);
            assert!(result.is_ok(), "{} failed: {:?}", name, result.err());
        }
    }

    async fn seeded_store() -> (Arc<dyn Storage>, Test) {
        let store = MemoryStore::new();
        store
            .insert_page(PageTarget {
                id: "p1".to_string(),
                url: "http://app.test/login".to_string(),
                viewport: Viewport {
                    width: 1024,
                    height: 768,
                },
            })
            .await;
        store
            .insert_element(WebElement {
                id: "e1".to_string(),
                selector: "#submit".to_string(),
                title: "Submit".to_string(),
                kind: "button".to_string(),
            })
            .await;
        store
            .insert_action(ActionSpec {
                id: "a-click".to_string(),
                name: "click".to_string(),
                with_value: false,
            })
            .await;
        let test = Test {
            id: "t1".to_string(),
            title: "Login".to_string(),
            page_id: "p1".to_string(),
            is_running: false,
        };
        store.insert_test(test.clone()).await;
        store
            .insert_step(Step {
                id: "s1".to_string(),
                test_id: "t1".to_string(),
                web_element_id: Some("e1".to_string()),
                action_id: "a-click".to_string(),
                value: None,
                order: 1,
            })
            .await;
        (Arc::new(store), test)
    }

    #[tokio::test]
    async fn test_compile_opens_page_first() {
        let (store, test) = seeded_store().await;
        let plan = compile_test(&store, &test).await.unwrap();

        assert_eq!(plan.test_id, "t1");
        assert_eq!(plan.viewport.width, 1024);
        assert_eq!(plan.instructions.len(), 2);
        assert_eq!(
            plan.instructions[0],
            Instruction::Open {
                url: "http://app.test/login".to_string()
            }
        );
        assert_eq!(
            plan.instructions[1],
            Instruction::Element {
                action: ElementAction::Click,
                selector: "#submit".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_compile_unknown_page() {
        let (store, mut test) = seeded_store().await;
        test.page_id = "missing".to_string();
        let err = compile_test(&store, &test).await.unwrap_err();
        assert!(matches!(err, CompileError::UnknownPage { .. }));
    }

    #[tokio::test]
    async fn test_compile_unknown_action_reference() {
        let store = MemoryStore::new();
        store
            .insert_page(PageTarget {
                id: "p1".to_string(),
                url: "http://app.test".to_string(),
                viewport: Viewport::default(),
            })
            .await;
        let test = Test {
            id: "t1".to_string(),
            title: "Broken".to_string(),
            page_id: "p1".to_string(),
            is_running: false,
        };
        store.insert_test(test.clone()).await;
        // A step pointing at an action row that was never created.
        store
            .insert_step(Step {
                id: "s1".to_string(),
                test_id: "t1".to_string(),
                web_element_id: None,
                action_id: "a-missing".to_string(),
                value: None,
                order: 1,
            })
            .await;
        let store: Arc<dyn Storage> = Arc::new(store);

        let err = compile_test(&store, &test).await.unwrap_err();
        assert!(matches!(err, CompileError::UnknownAction { .. }));
    }
}
