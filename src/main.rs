use clap::{Parser, Subcommand};
use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::EnvFilter;

use web_vision::browser::CdpLauncher;
use web_vision::config;
use web_vision::engine::{BatchRunner, TestOutcome};
use web_vision::model::BrowserKind;
use web_vision::store::{MemoryStore, Storage, Suite};
use web_vision::workspace::cleanup_old_workspaces;

/// Web Vision - Automated web UI test execution
#[derive(Parser, Debug)]
#[command(
    name = "web-vision",
    about = "Automated web UI test execution with headless browser orchestration and screenshot audit trails",
    after_help = "ENVIRONMENT VARIABLES:\n\
        WEB_VISION_HEADLESS          Run the browser headless (default: true)\n\
        WEB_VISION_WAIT_TIMEOUT      Default waitForElement timeout in ms\n\
        WEB_VISION_HIGHLIGHT_SETTLE  Settle time after highlighting in ms\n\
        WEB_VISION_WORKSPACE_DIR     Base directory for run artifacts\n\
        WEB_VISION_POLL_INTERVAL     Report poll interval in seconds\n\
        WEB_VISION_POLL_ATTEMPTS     Maximum report poll attempts\n\
        WEB_VISION_STALE_LOCK_SECS   Age after which run locks are stale"
)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a batch of tests from a suite file
    Run {
        /// Path to the JSON suite file (pages, elements, actions, tests, steps)
        #[arg(short, long)]
        suite: PathBuf,

        /// Comma-separated list of test ids to run
        #[arg(short, long, value_delimiter = ',')]
        tests: Vec<String>,

        /// Target browser: Chrome, Firefox or Safari
        #[arg(short, long, default_value = "Chrome")]
        browser: String,

        /// Write the aggregated outcome as JSON to this file
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Print the aggregated outcome as JSON instead of a summary
        #[arg(long)]
        json: bool,
    },

    /// List the supported action vocabulary
    Actions,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    match args.command {
        Commands::Run {
            suite,
            tests,
            browser,
            output,
            json,
        } => run_command(suite, tests, &browser, output, json).await,
        Commands::Actions => {
            print_actions();
            Ok(())
        }
    }
}

async fn run_command(
    suite_path: PathBuf,
    tests: Vec<String>,
    browser: &str,
    output: Option<PathBuf>,
    json: bool,
) -> Result<(), Box<dyn Error>> {
    let browser = BrowserKind::parse(browser).ok_or_else(|| {
        format!(
            "Invalid browser \"{}\". Allowed values are: {}",
            browser,
            BrowserKind::ALLOWED.join(", ")
        )
    })?;

    let raw = std::fs::read_to_string(&suite_path)?;
    let suite: Suite = serde_json::from_str(&raw)?;
    let store = Arc::new(MemoryStore::from_suite(suite).await);

    let runner = BatchRunner::new(store.clone(), Arc::new(CdpLauncher));

    // Recover anything a crashed process left behind before claiming:
    // stale run-status locks and orphaned artifact directories.
    let stale_age = Duration::from_secs(config::get().guard.stale_lock_secs);
    runner.guard().clear_stale(stale_age).await?;
    cleanup_old_workspaces(config::workspace_base_dir(), stale_age)?;

    println!(
        "Running {} test(s) on {}...",
        tests.len(),
        browser.name()
    );
    let outcome = runner.run_batch(&tests, browser).await?;

    if let Some(path) = &output {
        std::fs::write(path, serde_json::to_string_pretty(&outcome)?)?;
        println!("Report saved to: {}", path.display());
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        print_summary(&store, &outcome).await?;
    }

    if !outcome.all_passed() {
        std::process::exit(1);
    }
    Ok(())
}

/// Print a human-readable per-test summary with the recorded step trail.
async fn print_summary(
    store: &Arc<MemoryStore>,
    outcome: &web_vision::engine::BatchOutcome,
) -> Result<(), Box<dyn Error>> {
    for (test_id, result) in &outcome.results {
        match result {
            TestOutcome::Completed { report } => {
                let verdict = if report.status { "passed" } else { "failed" };
                let steps = store.report_steps(&report.id).await?;
                println!(
                    "{}: {} ({} step(s), {}ms)",
                    test_id,
                    verdict,
                    steps.len(),
                    report.execution_time_ms
                );
                for (index, step) in steps.iter().enumerate() {
                    let mark = if step.status { "ok " } else { "ERR" };
                    println!("  [{}] {} {}", index + 1, mark, step.description);
                }
            }
            TestOutcome::CompileFailed { error } => {
                println!("{}: compile error: {}", test_id, error);
            }
            TestOutcome::Crashed { error } => {
                println!("{}: did not complete: {}", test_id, error);
            }
        }
    }
    Ok(())
}

/// Print the action vocabulary with each action's requirements.
fn print_actions() {
    println!("Supported actions:");
    println!("  {:<16} {:<10} value", "name", "element");
    for (name, element, value) in [
        ("click", "required", "-"),
        ("fill", "required", "required"),
        ("hover", "required", "-"),
        ("checkText", "required", "required (expected text)"),
        ("waitForElement", "required", "optional (timeout ms)"),
        ("selectOption", "required", "required (option value)"),
        ("checkVisibility", "required", "-"),
        ("pressKey", "required", "required (key name)"),
        ("clearInput", "required", "-"),
        ("doubleClick", "required", "-"),
        ("rightClick", "required", "-"),
        ("focus", "required", "-"),
        ("blur", "required", "-"),
        ("goBack", "-", "-"),
        ("goForward", "-", "-"),
        ("takeScreenshot", "-", "-"),
    ] {
        println!("  {:<16} {:<10} {}", name, element, value);
    }
}
