//! Integration tests for the batch execution engine

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;

use web_vision::browser::{MockBehavior, MockDriverFactory};
use web_vision::engine::{BatchRunner, RunnerError, TestOutcome};
use web_vision::model::{ActionSpec, BrowserKind, PageTarget, Step, Test, Viewport, WebElement};
use web_vision::poller::{PollOutcome, PollerConfig, ReportPoller};
use web_vision::store::{MemoryStore, Storage, Suite};

const PAGE_URL: &str = "http://app.test/login";

/// A suite with one page, a small element/action catalog and no tests.
fn base_suite() -> Suite {
    Suite {
        pages: vec![PageTarget {
            id: "p1".to_string(),
            url: PAGE_URL.to_string(),
            viewport: Viewport {
                width: 1024,
                height: 768,
            },
        }],
        elements: vec![
            element("e-submit", "#submit"),
            element("e-result", "#result"),
            element("e-broken", "#broken"),
        ],
        actions: vec![
            ActionSpec {
                id: "a-click".to_string(),
                name: "click".to_string(),
                with_value: false,
            },
            ActionSpec {
                id: "a-check".to_string(),
                name: "checkText".to_string(),
                with_value: true,
            },
            ActionSpec {
                id: "a-warp".to_string(),
                name: "warp".to_string(),
                with_value: false,
            },
        ],
        tests: vec![],
        steps: vec![],
    }
}

fn element(id: &str, selector: &str) -> WebElement {
    WebElement {
        id: id.to_string(),
        selector: selector.to_string(),
        title: selector.trim_start_matches('#').to_string(),
        kind: "button".to_string(),
    }
}

fn test_row(id: &str) -> Test {
    Test {
        id: id.to_string(),
        title: format!("Test {}", id),
        page_id: "p1".to_string(),
        is_running: false,
    }
}

fn step(id: &str, test_id: &str, element_id: &str, action_id: &str, value: Option<&str>, order: u32) -> Step {
    Step {
        id: id.to_string(),
        test_id: test_id.to_string(),
        web_element_id: Some(element_id.to_string()),
        action_id: action_id.to_string(),
        value: value.map(String::from),
        order,
    }
}

/// The example scenario: click `#submit`, then expect `#result` to read OK.
async fn store_with_example_test() -> MemoryStore {
    let mut suite = base_suite();
    suite.tests.push(test_row("t1"));
    suite.steps.push(step("s1", "t1", "e-submit", "a-click", None, 1));
    suite
        .steps
        .push(step("s2", "t1", "e-result", "a-check", Some("OK"), 2));
    MemoryStore::from_suite(suite).await
}

fn runner_with(
    store: &MemoryStore,
    behavior: MockBehavior,
) -> (BatchRunner, Arc<MockDriverFactory>, tempfile::TempDir) {
    let base = tempfile::tempdir().unwrap();
    let factory = Arc::new(MockDriverFactory::new(behavior));
    let runner = BatchRunner::new(Arc::new(store.clone()), factory.clone())
        .with_workspace_base(base.path());
    (runner, factory, base)
}

fn passing_page_behavior() -> MockBehavior {
    MockBehavior::passing().text("#result", "OK")
}

#[tokio::test]
async fn test_example_scenario_passes_with_full_audit_trail() {
    let store = store_with_example_test().await;
    let (runner, _factory, _base) = runner_with(&store, passing_page_behavior());

    let outcome = runner
        .run_batch(&["t1".to_string()], BrowserKind::Chrome)
        .await
        .unwrap();

    let report = match outcome.results.get("t1") {
        Some(TestOutcome::Completed { report }) => report.clone(),
        other => panic!("expected completed run, got {:?}", other),
    };
    assert!(report.status);

    // The open-page step plus the two test steps, in stored order.
    let steps = store.report_steps(&report.id).await.unwrap();
    let descriptions: Vec<&str> = steps.iter().map(|s| s.description.as_str()).collect();
    assert_eq!(
        descriptions,
        vec![
            "Opened page with URL: http://app.test/login",
            "Clicked on element with selector: #submit",
            "Checked text for element with selector: #result, expected: OK",
        ]
    );
    assert!(steps.iter().all(|s| s.status));

    // Exactly one screenshot per report step.
    for report_step in &steps {
        let shots = store.screenshots_for_step(&report_step.id).await.unwrap();
        assert_eq!(shots.len(), 1, "step {:?}", report_step.description);
    }
}

#[tokio::test]
async fn test_failure_path_keeps_one_screenshot_per_step() {
    let store = store_with_example_test().await;
    // The click target never resolves, so the run fails at step two.
    let (runner, _factory, _base) =
        runner_with(&store, MockBehavior::passing().missing_selector("#submit"));

    let outcome = runner
        .run_batch(&["t1".to_string()], BrowserKind::Chrome)
        .await
        .unwrap();

    let report = match outcome.results.get("t1") {
        Some(TestOutcome::Completed { report }) => report.clone(),
        other => panic!("expected completed run, got {:?}", other),
    };
    assert!(!report.status);

    let steps = store.report_steps(&report.id).await.unwrap();
    // Open passes, the click fails, the checkText never runs.
    assert_eq!(steps.len(), 2);
    assert!(steps[0].status);
    assert!(!steps[1].status);

    for report_step in &steps {
        let shots = store.screenshots_for_step(&report_step.id).await.unwrap();
        assert_eq!(shots.len(), 1);
    }
}

#[tokio::test]
async fn test_mutual_exclusion_rejects_overlapping_batches() {
    let store = store_with_example_test().await;
    let (runner, _factory, _base) = runner_with(&store, passing_page_behavior());

    // Simulate a batch claim in progress.
    runner.guard().try_claim(&["t1".to_string()]).await.unwrap();

    let err = runner
        .run_batch(&["t1".to_string()], BrowserKind::Chrome)
        .await
        .unwrap_err();
    assert!(matches!(err, RunnerError::Busy { .. }));

    // The refused batch created no report rows.
    assert_eq!(store.report_count().await, 0);
}

#[tokio::test]
async fn test_guard_released_after_success_and_failure() {
    let store = store_with_example_test().await;

    // Successful batch.
    let (runner, _factory, _base) = runner_with(&store, passing_page_behavior());
    runner
        .run_batch(&["t1".to_string()], BrowserKind::Chrome)
        .await
        .unwrap();
    assert!(!runner.guard().is_any_running().await.unwrap());

    // Failing batch (the page never loads).
    let (runner, _factory, _base) =
        runner_with(&store, MockBehavior::passing().fail_goto("net::ERR_FAILED"));
    let outcome = runner
        .run_batch(&["t1".to_string()], BrowserKind::Chrome)
        .await
        .unwrap();
    assert!(!outcome.all_passed());
    assert!(!runner.guard().is_any_running().await.unwrap());
}

#[tokio::test]
async fn test_partial_failure_isolation_across_siblings() {
    let mut suite = base_suite();
    for id in ["ta", "tb", "tc"] {
        suite.tests.push(test_row(id));
    }
    suite.steps.push(step("sa", "ta", "e-submit", "a-click", None, 1));
    // Test B clicks an element whose driver interaction always fails.
    suite.steps.push(step("sb", "tb", "e-broken", "a-click", None, 1));
    suite.steps.push(step("sc", "tc", "e-submit", "a-click", None, 1));
    let store = MemoryStore::from_suite(suite).await;

    let (runner, _factory, _base) =
        runner_with(&store, MockBehavior::passing().failing_selector("#broken"));

    let ids = vec!["ta".to_string(), "tb".to_string(), "tc".to_string()];
    let outcome = runner.run_batch(&ids, BrowserKind::Chrome).await.unwrap();

    for (id, expected_status) in [("ta", true), ("tb", false), ("tc", true)] {
        match outcome.results.get(id) {
            Some(TestOutcome::Completed { report }) => {
                assert_eq!(report.status, expected_status, "test {}", id);
            }
            other => panic!("expected completed run for {}, got {:?}", id, other),
        }
        // Exactly one execution attempt per test.
        assert_eq!(store.reports_for_test(id).await.len(), 1);
    }
    assert!(!runner.guard().is_any_running().await.unwrap());
}

#[tokio::test]
async fn test_unsupported_action_rejected_before_any_session() {
    let mut suite = base_suite();
    suite.tests.push(test_row("t-bad"));
    suite
        .steps
        .push(step("s-bad", "t-bad", "e-submit", "a-warp", None, 1));
    let store = MemoryStore::from_suite(suite).await;

    let (runner, factory, _base) = runner_with(&store, passing_page_behavior());
    let outcome = runner
        .run_batch(&["t-bad".to_string()], BrowserKind::Chrome)
        .await
        .unwrap();

    match outcome.results.get("t-bad") {
        Some(TestOutcome::CompileFailed { error }) => {
            assert_eq!(error, "Unsupported action: warp");
        }
        other => panic!("expected compile failure, got {:?}", other),
    }
    // No browser session was launched and no report row was created.
    assert_eq!(factory.created_count(), 0);
    assert_eq!(store.report_count().await, 0);
}

#[tokio::test]
async fn test_compile_failure_does_not_affect_siblings() {
    let mut suite = base_suite();
    suite.tests.push(test_row("t-good"));
    suite.tests.push(test_row("t-bad"));
    suite
        .steps
        .push(step("sg", "t-good", "e-submit", "a-click", None, 1));
    suite
        .steps
        .push(step("sb", "t-bad", "e-submit", "a-warp", None, 1));
    let store = MemoryStore::from_suite(suite).await;

    let (runner, _factory, _base) = runner_with(&store, passing_page_behavior());
    let ids = vec!["t-good".to_string(), "t-bad".to_string()];
    let outcome = runner.run_batch(&ids, BrowserKind::Chrome).await.unwrap();

    assert!(matches!(
        outcome.results.get("t-bad"),
        Some(TestOutcome::CompileFailed { .. })
    ));
    match outcome.results.get("t-good") {
        Some(TestOutcome::Completed { report }) => assert!(report.status),
        other => panic!("expected completed run, got {:?}", other),
    }
}

#[tokio::test]
async fn test_fire_and_forget_batch_discovered_by_poller() {
    let store = store_with_example_test().await;
    let (runner, _factory, _base) = runner_with(&store, passing_page_behavior());

    // The triggering caller dispatches the batch and returns immediately;
    // a poller discovers the reports afterwards.
    let ids = vec!["t1".to_string()];
    let batch_ids = ids.clone();
    let handle = tokio::spawn(async move {
        runner
            .run_batch(&batch_ids, BrowserKind::Chrome)
            .await
            .unwrap()
    });

    let poller = ReportPoller::with_config(
        Arc::new(store.clone()),
        PollerConfig::new(Duration::from_millis(20), 100),
    );
    match poller.wait_for_reports(&ids).await {
        PollOutcome::Ready(reports) => {
            assert_eq!(reports.len(), 1);
            assert_eq!(reports[0].test_id, "t1");
        }
        PollOutcome::TimedOut => panic!("poller should have found the report"),
    }

    let outcome = handle.await.unwrap();
    assert!(outcome.all_passed());
}
