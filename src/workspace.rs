//! Per-batch artifact management.
//!
//! Every batch materializes its compiled run plans as JSON artifacts in a
//! unique directory under a global base location. Artifacts are private
//! to their batch and removed when the batch completes, success or
//! failure — cleanup is Drop-backed, not best-effort.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::engine::compiler::RunPlan;

/// Result type for workspace operations
pub type WorkspaceResult<T> = Result<T, WorkspaceError>;

/// Error types for workspace operations
#[derive(Debug)]
pub enum WorkspaceError {
    /// I/O error
    Io(std::io::Error),
    /// Artifact serialization error
    Serialization(serde_json::Error),
}

impl std::fmt::Display for WorkspaceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkspaceError::Io(err) => write!(f, "I/O error: {}", err),
            WorkspaceError::Serialization(err) => write!(f, "Serialization error: {}", err),
        }
    }
}

impl std::error::Error for WorkspaceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            WorkspaceError::Io(err) => Some(err),
            WorkspaceError::Serialization(err) => Some(err),
        }
    }
}

impl From<std::io::Error> for WorkspaceError {
    fn from(err: std::io::Error) -> Self {
        WorkspaceError::Io(err)
    }
}

impl From<serde_json::Error> for WorkspaceError {
    fn from(err: serde_json::Error) -> Self {
        WorkspaceError::Serialization(err)
    }
}

/// A batch's artifact directory
#[derive(Debug)]
pub struct RunWorkspace {
    /// Unique workspace ID
    pub id: String,
    /// Root directory for this workspace
    pub dir: PathBuf,
    /// Whether to keep artifacts after the batch ends
    pub keep: bool,
}

impl RunWorkspace {
    /// Create a workspace with a unique ID under the given base directory
    pub fn create(base: impl AsRef<Path>) -> std::io::Result<Self> {
        let id = generate_workspace_id();
        let dir = base.as_ref().join(&id);
        fs::create_dir_all(&dir)?;

        // Write workspace metadata
        let metadata = serde_json::json!({
            "id": id,
            "created": chrono::Utc::now().to_rfc3339(),
        });
        fs::write(
            dir.join(".workspace.json"),
            serde_json::to_string_pretty(&metadata)?,
        )?;

        Ok(Self {
            id,
            dir,
            keep: false,
        })
    }

    /// Set whether to keep artifacts after the batch ends
    pub fn keep(mut self, keep: bool) -> Self {
        self.keep = keep;
        self
    }

    /// Get the artifact path for a test's compiled plan
    pub fn plan_path(&self, test_id: &str) -> PathBuf {
        self.dir.join(format!("plan_{}.json", sanitize_name(test_id)))
    }

    /// Materialize a compiled plan as a JSON artifact
    pub fn write_plan(&self, plan: &RunPlan) -> WorkspaceResult<PathBuf> {
        let path = self.plan_path(&plan.test_id);
        fs::write(&path, serde_json::to_string_pretty(plan)?)?;
        Ok(path)
    }

    /// List all plan artifacts in the workspace
    pub fn list_plans(&self) -> std::io::Result<Vec<PathBuf>> {
        let mut plans = Vec::new();
        if self.dir.exists() {
            for entry in fs::read_dir(&self.dir)? {
                let entry = entry?;
                let path = entry.path();
                let is_plan = path
                    .file_name()
                    .map(|n| n.to_string_lossy().starts_with("plan_"))
                    .unwrap_or(false);
                if is_plan && path.extension().map(|e| e == "json").unwrap_or(false) {
                    plans.push(path);
                }
            }
        }
        plans.sort();
        Ok(plans)
    }

    /// Remove the workspace directory
    pub fn cleanup(&self) -> std::io::Result<()> {
        if self.dir.exists() && !self.keep {
            fs::remove_dir_all(&self.dir)?;
        }
        Ok(())
    }
}

impl Drop for RunWorkspace {
    fn drop(&mut self) {
        if !self.keep {
            let _ = fs::remove_dir_all(&self.dir);
        }
    }
}

/// Generate a unique workspace ID
fn generate_workspace_id() -> String {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    let pid = std::process::id();
    format!("batch_{}_{}", timestamp, pid)
}

/// Sanitize a name for use in filenames
fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' => c,
            _ => '_',
        })
        .collect()
}

/// Clean up workspaces older than the specified duration
pub fn cleanup_old_workspaces(
    base: impl AsRef<Path>,
    max_age: Duration,
) -> std::io::Result<usize> {
    let base = base.as_ref();
    if !base.exists() {
        return Ok(0);
    }

    let now = SystemTime::now();
    let mut cleaned = 0;

    for entry in fs::read_dir(base)? {
        let entry = entry?;
        let path = entry.path();

        if path.is_dir() {
            if let Ok(metadata) = entry.metadata() {
                if let Ok(modified) = metadata.modified() {
                    if let Ok(age) = now.duration_since(modified) {
                        if age > max_age && fs::remove_dir_all(&path).is_ok() {
                            cleaned += 1;
                        }
                    }
                }
            }
        }
    }

    Ok(cleaned)
}
