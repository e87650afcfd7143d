/// Locates the device-configuration directory the target application reads
/// identifier files from.
///
/// Resolution order, first success wins:
///   1. An explicit override path (command-line argument) that exists on disk.
///   2. An upward search starting at the directory of the running target
///      executable, testing `<ancestor>/<relative_suffix>` at each level.
///
/// Every failure mode ends in [`Strategy::NotFound`]; the caller decides whether
/// that is fatal.
use std::collections::HashSet;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::TargetConfig;
use crate::process;
use crate::status::FolderCheck;

/// How a [`DiscoveryResult`] was (or was not) obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    CommandLineArgument,
    RelativeToRunningProcess,
    NotFound,
}

/// Outcome of one resolution run.
#[derive(Debug, Clone)]
pub struct DiscoveryResult {
    pub resolved_path: Option<PathBuf>,
    pub strategy: Strategy,
    /// Upward-search candidates in the order they were examined. No entry repeats.
    pub tried_paths: Vec<PathBuf>,
    /// Override that was supplied but did not exist.
    pub rejected_override: Option<PathBuf>,
    /// Executable name the search anchored on.
    pub target_process: String,
    /// Directory of the located executable, if the process was found.
    pub anchor: Option<PathBuf>,
    pub relative_suffix: PathBuf,
}

/// The resolved target directory. Built once at startup and shared read-only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetDirectory {
    path: PathBuf,
    strategy: Strategy,
}

impl TargetDirectory {
    pub fn new(path: PathBuf, strategy: Strategy) -> Self {
        Self { path, strategy }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    /// Rechecks the directory on disk; it may vanish after startup.
    pub fn check(&self) -> FolderCheck {
        FolderCheck::of(&self.path)
    }
}

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("{}", process_not_found_message(.0))]
    ProcessNotFound(Box<DiscoveryResult>),
    #[error("{}", directory_not_found_message(.0))]
    DirectoryNotFound(Box<DiscoveryResult>),
    #[error("override folder does not exist: {}", .0.display())]
    InvalidOverridePath(PathBuf),
}

impl DiscoveryResult {
    fn new(target_process: &str, relative_suffix: &Path) -> Self {
        Self {
            resolved_path: None,
            strategy: Strategy::NotFound,
            tried_paths: Vec::new(),
            rejected_override: None,
            target_process: target_process.to_string(),
            anchor: None,
            relative_suffix: relative_suffix.to_path_buf(),
        }
    }

    /// The resolved path, else the nearest search candidate, else the rejected
    /// override. `None` only when there was neither an override nor a process.
    pub fn best_effort_path(&self) -> Option<PathBuf> {
        self.resolved_path
            .clone()
            .or_else(|| self.tried_paths.first().cloned())
            .or_else(|| self.rejected_override.clone())
    }

    /// The rejected override as an error, for reporting alongside a result that
    /// may still have resolved through the process search.
    pub fn override_error(&self) -> Option<DiscoveryError> {
        self.rejected_override
            .clone()
            .map(DiscoveryError::InvalidOverridePath)
    }

    /// Converts the result into the startup value, or the error describing
    /// every strategy that was attempted.
    pub fn into_target(self) -> Result<TargetDirectory, DiscoveryError> {
        if let Some(path) = self.resolved_path.clone() {
            return Ok(TargetDirectory::new(path, self.strategy));
        }
        if self.anchor.is_none() {
            Err(DiscoveryError::ProcessNotFound(Box::new(self)))
        } else {
            Err(DiscoveryError::DirectoryNotFound(Box::new(self)))
        }
    }
}

/// The upward-search engine. The process query is injected so callers (and
/// tests) decide where executable paths come from.
#[derive(Debug, Clone)]
pub struct Discovery {
    target_process: String,
    relative_suffix: PathBuf,
}

impl Discovery {
    pub fn new(target_process: impl Into<String>, relative_suffix: impl AsRef<Path>) -> Self {
        Self {
            target_process: target_process.into(),
            relative_suffix: relative_suffix.as_ref().to_path_buf(),
        }
    }

    pub fn from_config(config: &TargetConfig) -> Self {
        Self::new(&config.process_name, split_suffix(&config.relative_suffix))
    }

    pub fn resolve<F>(&self, arg_override: Option<&Path>, find_process: F) -> DiscoveryResult
    where
        F: FnOnce(&str) -> Option<PathBuf>,
    {
        let mut result = DiscoveryResult::new(&self.target_process, &self.relative_suffix);

        if let Some(path) = arg_override {
            if path_exists(path) {
                info!("Using folder from command line: {}", path.display());
                result.resolved_path = Some(path.to_path_buf());
                result.strategy = Strategy::CommandLineArgument;
                return result;
            }
            warn!("Command-line folder does not exist: {}", path.display());
            result.rejected_override = Some(path.to_path_buf());
        }

        let Some(exe) = find_process(&self.target_process) else {
            warn!("{} is not running; cannot locate the folder automatically", self.target_process);
            return result;
        };
        info!("Found {} at {}", self.target_process, exe.display());

        let Some(anchor) = exe.parent().filter(|p| !p.as_os_str().is_empty()) else {
            warn!("Executable path has no parent directory: {}", exe.display());
            return result;
        };
        result.anchor = Some(anchor.to_path_buf());

        // Keyed on the resolved directory so symlinked ancestors that lead back
        // to an already checked level end the walk.
        let mut visited: HashSet<PathBuf> = HashSet::new();
        let mut current = anchor.to_path_buf();
        loop {
            let candidate = current.join(&self.relative_suffix);
            if !visited.insert(normalized(&current).join(&self.relative_suffix)) {
                debug!("Already checked {}, stopping", candidate.display());
                break;
            }
            debug!("Checking {}", candidate.display());
            result.tried_paths.push(candidate.clone());

            if path_exists(&candidate) {
                info!("Found folder: {}", candidate.display());
                result.resolved_path = Some(candidate);
                result.strategy = Strategy::RelativeToRunningProcess;
                return result;
            }

            match current.parent() {
                Some(parent) if parent != current && !parent.as_os_str().is_empty() => {
                    current = parent.to_path_buf();
                }
                _ => break,
            }
        }

        result
    }
}

/// Runs discovery against the live process table.
pub fn discover_target_directory(arg_override: Option<&Path>, config: &TargetConfig) -> DiscoveryResult {
    Discovery::from_config(config).resolve(arg_override, process::find_running_process)
}

/// Absolute, symlink-free form of `dir`, or `dir` itself when it cannot be
/// resolved (missing or unreadable directories).
fn normalized(dir: &Path) -> PathBuf {
    std::fs::canonicalize(dir).unwrap_or_else(|_| dir.to_path_buf())
}

/// Turns `AMDaemon/DEVICE` or `AMDaemon\DEVICE` into path components.
pub fn split_suffix(suffix: &str) -> PathBuf {
    suffix
        .split(['/', '\\'])
        .filter(|part| !part.is_empty())
        .collect()
}

/// Any metadata error, not only "not found", counts as absent.
fn path_exists(path: &Path) -> bool {
    std::fs::metadata(path).is_ok()
}

fn process_not_found_message(result: &DiscoveryResult) -> String {
    let mut msg = String::from("Could not locate the device folder.\n");
    if let Some(path) = &result.rejected_override {
        let _ = writeln!(msg, "Command-line folder does not exist: {}", path.display());
    }
    let _ = writeln!(
        msg,
        "{} is not running, so the folder cannot be found relative to it.",
        result.target_process
    );
    msg.push_str("\nPossible fixes:\n");
    let _ = writeln!(msg, "1. Start {} and run this program again", result.target_process);
    let _ = write!(
        msg,
        "2. Pass the full folder path as an argument, e.g. ohmyaime D:\\SDGA\\{}",
        result.relative_suffix.display()
    );
    msg
}

fn directory_not_found_message(result: &DiscoveryResult) -> String {
    let mut msg = String::from("Could not locate the device folder.\n");
    if let Some(path) = &result.rejected_override {
        let _ = writeln!(msg, "Command-line folder does not exist: {}", path.display());
    }
    let _ = writeln!(
        msg,
        "Searched upward from the {} directory and checked:",
        result.target_process
    );
    for path in &result.tried_paths {
        let _ = writeln!(msg, "  - {}", path.display());
    }
    msg.push_str("\nPossible fixes:\n");
    let _ = writeln!(msg, "1. Make sure {} is running from its install directory", result.target_process);
    msg.push_str("2. Pass the full folder path as an argument: ohmyaime <path>\n");
    if let Some(first) = result.tried_paths.first() {
        let _ = write!(msg, "3. Create the folder manually: {}", first.display());
    }
    msg
}
