use serde::{Deserialize, Serialize};
use std::io;
use std::path::Path;
use tracing::warn;

pub const FOLDER_SOLUTION: &str = "Run the program with correct AIME folder path as argument";

/// Runtime status written by the daemon to %APPDATA%\OhMyAime\status.toml and
/// returned for every status request.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct StatusReport {
    /// Daemon binary version (set from Cargo.toml at compile time).
    pub version: String,
    /// Whether the target game executable is in the process list.
    pub target_running: bool,
    /// The device folder chosen at startup.
    pub folder_path: String,
    /// Result of rechecking the folder now.
    pub folder_exists: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub folder_error: Option<String>,
    /// What the user can do about `folder_error`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub solution: Option<String>,
    /// RFC 3339 timestamp of the last identifier written, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_identifier_at: Option<String>,
}

/// Outcome of an existence recheck on the device folder.
#[derive(Debug, PartialEq, Eq)]
pub enum FolderCheck {
    Exists,
    Missing,
    Inaccessible(String),
}

impl FolderCheck {
    pub fn of(path: &Path) -> Self {
        match std::fs::metadata(path) {
            Ok(_) => FolderCheck::Exists,
            Err(e) if e.kind() == io::ErrorKind::NotFound => FolderCheck::Missing,
            Err(e) => FolderCheck::Inaccessible(e.to_string()),
        }
    }
}

impl StatusReport {
    pub fn new(folder: &Path, target_running: bool) -> Self {
        let mut report = Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            target_running,
            folder_path: folder.display().to_string(),
            folder_exists: false,
            folder_error: None,
            solution: None,
            last_identifier_at: None,
        };
        match FolderCheck::of(folder) {
            FolderCheck::Exists => report.folder_exists = true,
            FolderCheck::Missing => {
                report.folder_error = Some(format!("AIME folder not found: {}", folder.display()));
                report.solution = Some(FOLDER_SOLUTION.to_string());
            }
            FolderCheck::Inaccessible(e) => {
                report.folder_error = Some(format!("Error checking AIME folder: {e}"));
            }
        }
        report
    }
}

/// Serializes `status` to TOML and writes it to `path`.
/// Creates the parent directory if it does not exist.
/// Logs errors rather than panicking; a status write failure should
/// never crash the daemon.
pub fn write_status(path: &Path, status: &StatusReport) {
    if let Some(parent) = path.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            warn!("Failed to create status directory {}: {e}", parent.display());
            return;
        }
    }
    match toml::to_string_pretty(status) {
        Ok(content) => {
            if let Err(e) = std::fs::write(path, content) {
                warn!("Failed to write status file: {e}");
            }
        }
        Err(e) => warn!("Failed to serialize status: {e}"),
    }
}
