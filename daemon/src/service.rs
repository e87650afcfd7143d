/// The two externally triggered operations: write an identifier then press the
/// confirm key, and report status.
///
/// Both take the startup [`TargetDirectory`] as given and recheck it on every
/// call, so a folder that disappears later is reported rather than fatal.
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::discovery::TargetDirectory;
use crate::identifier::{self, IdentifierError};
use crate::input::{InputBackend, Injector};
use crate::process;
use crate::status::{FolderCheck, StatusReport, FOLDER_SOLUTION};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Identifier(#[from] IdentifierError),
    #[error("AIME folder not found: {}", .0.display())]
    DirectoryMissing(PathBuf),
    #[error("Error checking AIME folder: {0}")]
    DirectoryInaccessible(String),
    #[error("Error writing aime file {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ServiceError {
    /// Whether the caller sent a bad request, as opposed to a server-side failure.
    pub fn is_client_error(&self) -> bool {
        matches!(self, ServiceError::Identifier(_))
    }

    pub fn solution(&self) -> Option<&'static str> {
        match self {
            ServiceError::DirectoryMissing(_) => Some(FOLDER_SOLUTION),
            _ => None,
        }
    }

    pub fn to_body(&self) -> ErrorBody {
        ErrorBody {
            error: self.to_string(),
            solution: self.solution().map(str::to_string),
        }
    }
}

#[derive(Debug, Serialize, PartialEq)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub solution: Option<String>,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct SetIdentifierResponse {
    pub message: String,
    #[serde(rename = "aimeId")]
    pub aime_id: String,
    /// Set when the identifier was written but the key press was not accepted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

pub struct Service<B> {
    target: Arc<TargetDirectory>,
    injector: Arc<Injector<B>>,
    config: Arc<Config>,
    process_query: fn(&str) -> bool,
    last_identifier_at: Mutex<Option<String>>,
}

impl<B: InputBackend + 'static> Service<B> {
    pub fn new(target: Arc<TargetDirectory>, injector: Arc<Injector<B>>, config: Arc<Config>) -> Self {
        Self {
            target,
            injector,
            config,
            process_query: process::is_process_running,
            last_identifier_at: Mutex::new(None),
        }
    }

    /// Replaces the live process-table lookup used by [`Service::status`].
    pub fn with_process_query(mut self, query: fn(&str) -> bool) -> Self {
        self.process_query = query;
        self
    }

    /// Validates `id`, writes it into the device folder, then presses the
    /// configured key. A rejected key press is logged and returned as a
    /// warning; the identifier stays written.
    pub async fn set_identifier(&self, id: &str) -> Result<SetIdentifierResponse, ServiceError> {
        identifier::validate(id)?;

        let dir = self.target.path();
        match self.target.check() {
            FolderCheck::Exists => {}
            FolderCheck::Missing => {
                warn!("AIME folder not found: {}", dir.display());
                return Err(ServiceError::DirectoryMissing(dir.to_path_buf()));
            }
            FolderCheck::Inaccessible(reason) => {
                warn!("Error checking AIME folder {}: {reason}", dir.display());
                return Err(ServiceError::DirectoryInaccessible(reason));
            }
        }

        let file_name = &self.config.target.identifier_file;
        let path = identifier::write(dir, file_name, id).map_err(|source| {
            error!("Error writing aime file: {source}");
            ServiceError::Write { path: dir.join(file_name), source }
        })?;
        info!("Wrote identifier to {}", path.display());
        *self.last_identifier_at.lock().unwrap_or_else(PoisonError::into_inner) =
            Some(chrono::Local::now().to_rfc3339());

        let warning = self.press_confirm_key().await;

        Ok(SetIdentifierResponse {
            message: "Aime ID set successfully".to_string(),
            aime_id: id.to_string(),
            warning,
        })
    }

    /// Returns a warning message when the press did not go through cleanly.
    async fn press_confirm_key(&self) -> Option<String> {
        let injector = Arc::clone(&self.injector);
        let key = self.config.input.key.clone();
        let hold = self.config.input.hold();

        match tokio::task::spawn_blocking(move || injector.press(&key, hold)).await {
            Ok(Ok(())) => None,
            Ok(Err(e)) => {
                warn!("Key press failed: {e}");
                Some(e.to_string())
            }
            Err(e) => {
                error!("Key press task failed: {e}");
                Some(format!("key press task failed: {e}"))
            }
        }
    }

    pub async fn status(&self) -> StatusReport {
        let query = self.process_query;
        let name = self.config.target.process_name.clone();
        let running = tokio::task::spawn_blocking(move || query(&name))
            .await
            .unwrap_or_else(|e| {
                error!("Process query task failed: {e}");
                false
            });

        let mut report = StatusReport::new(self.target.path(), running);
        report.last_identifier_at = self
            .last_identifier_at
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::Strategy;
    use crate::input::{InjectError, KeyEvent, Transition};

    const ID: &str = "12345678901234567890";

    struct Fixed {
        accepted: u32,
        log: Arc<Mutex<Vec<KeyEvent>>>,
    }

    impl InputBackend for Fixed {
        fn submit(&mut self, event: &KeyEvent) -> u32 {
            self.log.lock().unwrap().push(*event);
            self.accepted
        }
    }

    fn service(dir: &std::path::Path, accepted: u32) -> (Service<Fixed>, Arc<Mutex<Vec<KeyEvent>>>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let backend = Fixed { accepted, log: Arc::clone(&log) };
        let mut config = Config::default();
        config.input.hold_ms = 10;
        let svc = Service::new(
            Arc::new(TargetDirectory::new(dir.to_path_buf(), Strategy::CommandLineArgument)),
            Arc::new(Injector::new(backend)),
            Arc::new(config),
        )
        .with_process_query(|name| name == "Sinmai.exe");
        (svc, log)
    }

    // ── set_identifier ────────────────────────────────────────────────────────

    #[tokio::test]
    async fn set_identifier_writes_file_then_presses_enter() {
        let dir = tempfile::tempdir().unwrap();
        let (svc, log) = service(dir.path(), 1);

        let resp = svc.set_identifier(ID).await.unwrap();

        assert_eq!(resp.aime_id, ID);
        assert!(resp.warning.is_none());
        assert_eq!(identifier::read(dir.path(), "aime.txt").unwrap(), ID);
        assert_eq!(*log.lock().unwrap(), vec![KeyEvent::down(0x0D), KeyEvent::up(0x0D)]);
    }

    #[tokio::test]
    async fn rejected_key_press_is_a_warning_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let (svc, log) = service(dir.path(), 0);

        let resp = svc.set_identifier(ID).await.unwrap();

        let expected = InjectError::SubmissionMismatch { transition: Transition::Down, accepted: 0 };
        assert_eq!(resp.warning, Some(expected.to_string()));
        assert_eq!(log.lock().unwrap().len(), 2);
        assert_eq!(identifier::read(dir.path(), "aime.txt").unwrap(), ID);
    }

    #[tokio::test]
    async fn invalid_identifier_touches_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let (svc, log) = service(dir.path(), 1);

        let err = svc.set_identifier("short").await.unwrap_err();

        assert!(err.is_client_error());
        assert!(!dir.path().join("aime.txt").exists());
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn vanished_folder_is_reported_with_solution() {
        let dir = tempfile::tempdir().unwrap();
        let device = dir.path().join("DEVICE");
        std::fs::create_dir(&device).unwrap();
        let (svc, log) = service(&device, 1);
        std::fs::remove_dir(&device).unwrap();

        let err = svc.set_identifier(ID).await.unwrap_err();

        assert!(matches!(err, ServiceError::DirectoryMissing(_)));
        assert!(!err.is_client_error());
        let body = err.to_body();
        assert!(body.error.contains("AIME folder not found"));
        assert_eq!(body.solution.as_deref(), Some(FOLDER_SOLUTION));
        assert!(log.lock().unwrap().is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn unreadable_folder_is_not_reported_as_missing() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("not-a-dir");
        std::fs::write(&file, b"").unwrap();
        let (svc, log) = service(&file.join("DEVICE"), 1);

        let err = svc.set_identifier(ID).await.unwrap_err();

        assert!(matches!(err, ServiceError::DirectoryInaccessible(_)));
        let body = err.to_body();
        assert!(body.error.starts_with("Error checking AIME folder"));
        assert!(body.solution.is_none());
        assert_eq!(
            svc.status().await.folder_error.as_deref(),
            Some(body.error.as_str())
        );
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn response_uses_camel_case_aime_id() {
        let dir = tempfile::tempdir().unwrap();
        let (svc, _) = service(dir.path(), 1);
        let resp = svc.set_identifier(ID).await.unwrap();
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["aimeId"], ID);
        assert_eq!(json["message"], "Aime ID set successfully");
        assert!(json.get("warning").is_none());
    }

    // ── status ────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn status_reports_process_and_folder() {
        let dir = tempfile::tempdir().unwrap();
        let (svc, _) = service(dir.path(), 1);

        let report = svc.status().await;

        assert!(report.target_running);
        assert!(report.folder_exists);
        assert!(report.last_identifier_at.is_none());
    }

    #[tokio::test]
    async fn status_tracks_last_identifier_write() {
        let dir = tempfile::tempdir().unwrap();
        let (svc, _) = service(dir.path(), 1);
        svc.set_identifier(ID).await.unwrap();
        assert!(svc.status().await.last_identifier_at.is_some());
    }

    #[tokio::test]
    async fn status_with_other_process_name_is_not_running() {
        let dir = tempfile::tempdir().unwrap();
        let (svc, _) = service(dir.path(), 1);
        let svc = svc.with_process_query(|_| false);
        assert!(!svc.status().await.target_running);
    }
}
