//! Configuration management with environment variable support.
//!
//! This module provides centralized configuration for Web Vision, supporting:
//! - Environment variables for all configurable values
//! - Sensible defaults matching the original hardcoded behavior
//! - A cached global for cheap repeated access
//!
//! # Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `WEB_VISION_HEADLESS` | Run the browser headless | `true` |
//! | `WEB_VISION_WAIT_TIMEOUT` | Default waitForElement timeout (ms) | `5000` |
//! | `WEB_VISION_HIGHLIGHT_SETTLE` | Settle time after highlighting (ms) | `300` |
//! | `WEB_VISION_WORKSPACE_DIR` | Base directory for run artifacts | `/tmp/web-vision` |
//! | `WEB_VISION_POLL_INTERVAL` | Report poll interval (seconds) | `10` |
//! | `WEB_VISION_POLL_ATTEMPTS` | Maximum report poll attempts | `30` |
//! | `WEB_VISION_STALE_LOCK_SECS` | Age after which run locks are stale (s) | `600` |
//!
//! # Example
//!
//! ```bash
//! # Watch the browser while debugging a flaky test
//! export WEB_VISION_HEADLESS=false
//!
//! # Keep artifacts somewhere inspectable
//! export WEB_VISION_WORKSPACE_DIR="/var/tmp/web-vision-runs"
//! ```

use std::env;
use std::sync::OnceLock;

// ============================================================================
// Default Values
// ============================================================================

/// Default headless mode
pub const DEFAULT_HEADLESS: bool = true;

/// Default waitForElement timeout (milliseconds)
pub const DEFAULT_WAIT_TIMEOUT_MS: u64 = 5000;

/// Default settle time after highlighting an element (milliseconds)
pub const DEFAULT_HIGHLIGHT_SETTLE_MS: u64 = 300;

/// Default workspace base directory
pub const DEFAULT_WORKSPACE_DIR: &str = "/tmp/web-vision";

/// Default report poll interval (seconds)
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 10;

/// Default maximum report poll attempts (30 x 10s = 5 minute ceiling)
pub const DEFAULT_POLL_MAX_ATTEMPTS: u32 = 30;

/// Default age after which a run lock is considered stale (seconds)
pub const DEFAULT_STALE_LOCK_SECS: u64 = 600;

// ============================================================================
// Environment Variable Names
// ============================================================================

/// Environment variable for headless mode
pub const ENV_HEADLESS: &str = "WEB_VISION_HEADLESS";

/// Environment variable for the default wait timeout
pub const ENV_WAIT_TIMEOUT: &str = "WEB_VISION_WAIT_TIMEOUT";

/// Environment variable for the highlight settle time
pub const ENV_HIGHLIGHT_SETTLE: &str = "WEB_VISION_HIGHLIGHT_SETTLE";

/// Environment variable for the workspace directory
pub const ENV_WORKSPACE_DIR: &str = "WEB_VISION_WORKSPACE_DIR";

/// Environment variable for the poll interval
pub const ENV_POLL_INTERVAL: &str = "WEB_VISION_POLL_INTERVAL";

/// Environment variable for the poll attempt limit
pub const ENV_POLL_ATTEMPTS: &str = "WEB_VISION_POLL_ATTEMPTS";

/// Environment variable for the stale lock age
pub const ENV_STALE_LOCK_SECS: &str = "WEB_VISION_STALE_LOCK_SECS";

// ============================================================================
// Configuration Getters (with caching)
// ============================================================================

static CONFIG: OnceLock<Config> = OnceLock::new();

/// Get the global configuration (initialized from environment on first access)
pub fn get() -> &'static Config {
    CONFIG.get_or_init(Config::from_env)
}

/// Centralized configuration for Web Vision
#[derive(Debug, Clone)]
pub struct Config {
    /// Browser session configuration
    pub browser: BrowserSettings,
    /// Run artifact workspace configuration
    pub workspace: WorkspaceSettings,
    /// Completion poller configuration
    pub poller: PollerSettings,
    /// Run-status guard configuration
    pub guard: GuardSettings,
}

/// Browser-session-related settings
#[derive(Debug, Clone)]
pub struct BrowserSettings {
    /// Whether the browser runs headless
    pub headless: bool,
    /// Default waitForElement timeout (milliseconds)
    pub wait_timeout_ms: u64,
    /// Settle time after highlighting an element (milliseconds)
    pub highlight_settle_ms: u64,
}

/// Workspace-related settings
#[derive(Debug, Clone)]
pub struct WorkspaceSettings {
    /// Base directory for per-batch artifact directories
    pub base_dir: String,
}

/// Completion poller settings
#[derive(Debug, Clone)]
pub struct PollerSettings {
    /// Interval between polls (seconds)
    pub interval_secs: u64,
    /// Maximum number of attempts before timing out
    pub max_attempts: u32,
}

/// Run-status guard settings
#[derive(Debug, Clone)]
pub struct GuardSettings {
    /// Age after which a run lock is considered stale (seconds)
    pub stale_lock_secs: u64,
}

impl Config {
    /// Create configuration from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        Self {
            browser: BrowserSettings::from_env(),
            workspace: WorkspaceSettings::from_env(),
            poller: PollerSettings::from_env(),
            guard: GuardSettings::from_env(),
        }
    }

    /// Create configuration with all defaults (ignoring environment)
    pub fn defaults() -> Self {
        Self {
            browser: BrowserSettings::defaults(),
            workspace: WorkspaceSettings::defaults(),
            poller: PollerSettings::defaults(),
            guard: GuardSettings::defaults(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}

impl BrowserSettings {
    /// Create browser settings from environment variables
    pub fn from_env() -> Self {
        Self {
            headless: env::var(ENV_HEADLESS)
                .ok()
                .and_then(|s| parse_bool(&s))
                .unwrap_or(DEFAULT_HEADLESS),
            wait_timeout_ms: env::var(ENV_WAIT_TIMEOUT)
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_WAIT_TIMEOUT_MS),
            highlight_settle_ms: env::var(ENV_HIGHLIGHT_SETTLE)
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_HIGHLIGHT_SETTLE_MS),
        }
    }

    /// Create browser settings with defaults
    pub fn defaults() -> Self {
        Self {
            headless: DEFAULT_HEADLESS,
            wait_timeout_ms: DEFAULT_WAIT_TIMEOUT_MS,
            highlight_settle_ms: DEFAULT_HIGHLIGHT_SETTLE_MS,
        }
    }
}

impl WorkspaceSettings {
    /// Create workspace settings from environment variables
    pub fn from_env() -> Self {
        Self {
            base_dir: env::var(ENV_WORKSPACE_DIR)
                .unwrap_or_else(|_| DEFAULT_WORKSPACE_DIR.to_string()),
        }
    }

    /// Create workspace settings with defaults
    pub fn defaults() -> Self {
        Self {
            base_dir: DEFAULT_WORKSPACE_DIR.to_string(),
        }
    }
}

impl PollerSettings {
    /// Create poller settings from environment variables
    pub fn from_env() -> Self {
        Self {
            interval_secs: env::var(ENV_POLL_INTERVAL)
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_POLL_INTERVAL_SECS),
            max_attempts: env::var(ENV_POLL_ATTEMPTS)
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_POLL_MAX_ATTEMPTS),
        }
    }

    /// Create poller settings with defaults
    pub fn defaults() -> Self {
        Self {
            interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            max_attempts: DEFAULT_POLL_MAX_ATTEMPTS,
        }
    }
}

impl GuardSettings {
    /// Create guard settings from environment variables
    pub fn from_env() -> Self {
        Self {
            stale_lock_secs: env::var(ENV_STALE_LOCK_SECS)
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_STALE_LOCK_SECS),
        }
    }

    /// Create guard settings with defaults
    pub fn defaults() -> Self {
        Self {
            stale_lock_secs: DEFAULT_STALE_LOCK_SECS,
        }
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Parse a boolean environment value
/// Accepts: "true"/"false", "1"/"0", "yes"/"no" (case-insensitive)
fn parse_bool(value: &str) -> Option<bool> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

/// Get the workspace base directory (convenience function)
pub fn workspace_base_dir() -> String {
    get().workspace.base_dir.clone()
}

/// Get the default wait timeout in milliseconds (convenience function)
pub fn default_wait_timeout_ms() -> u64 {
    get().browser.wait_timeout_ms
}
