mod config;
mod console;
mod discovery;
mod event;
mod identifier;
mod input;
mod paths;
mod process;
mod process_monitor;
mod service;
mod status;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::console::Command;
use crate::discovery::{DiscoveryResult, Strategy, TargetDirectory};
use crate::event::DaemonEvent;
use crate::input::SystemInjector;
use crate::service::{ErrorBody, Service};

#[derive(Debug, Parser)]
#[command(name = "ohmyaime", version, about = "Writes card IDs for a running Sinmai.exe and presses the confirm key")]
struct Args {
    /// Device folder to use instead of searching near the running game,
    /// e.g. D:\SDGA\AMDaemon\DEVICE
    folder: Option<PathBuf>,
    /// Config file (default: %APPDATA%\OhMyAime\config.toml).
    #[arg(long)]
    config: Option<PathBuf>,
    /// Do not read commands from stdin.
    #[arg(long)]
    no_console: bool,
}

#[tokio::main]
async fn main() {
    init_logging();
    let args = Args::parse();
    if let Err(e) = run(args).await {
        error!("{e:#}");
        std::process::exit(1);
    }
}

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("OHMYAIME_LOG")
                .or_else(|_| std::env::var("RUST_LOG"))
                .unwrap_or_else(|_| "info".to_string()),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

async fn run(args: Args) -> Result<()> {
    // ── Configuration ─────────────────────────────────────────────────────────
    let config_path = args.config.unwrap_or_else(paths::config_file_path);
    let config = config::load_or_default(&config_path).unwrap_or_else(|e| {
        warn!("Config error (using defaults): {e:#}");
        config::Config::default()
    });
    if input::virtual_key_for(&config.input.key).is_none() {
        warn!("Configured key {:?} is not recognized; key presses will fail", config.input.key);
    }
    let config = Arc::new(config);

    // ── Device folder ─────────────────────────────────────────────────────────
    // Runs before any request can arrive; the result is immutable afterwards.
    let result = discovery::discover_target_directory(args.folder.as_deref(), &config.target);
    if let Some(e) = result.override_error() {
        warn!("{e}");
    }
    let target = Arc::new(resolve_target(result, config.target.strict)?);
    info!("AIME folder found: {} (via {:?})", target.path().display(), target.strategy());

    // ── Service + initial status ──────────────────────────────────────────────
    let service = Service::new(
        Arc::clone(&target),
        Arc::new(SystemInjector::system()),
        Arc::clone(&config),
    );
    let status_path = paths::status_file_path();
    let initial = service.status().await;
    status::write_status(&status_path, &initial);

    let (event_tx, mut event_rx) = mpsc::channel::<DaemonEvent>(32);

    // ── Background tasks ──────────────────────────────────────────────────────
    tokio::spawn(process_monitor::run(
        config.target.process_name.clone(),
        initial.target_running,
        event_tx.clone(),
    ));
    if !args.no_console {
        tokio::spawn(console::run(event_tx.clone()));
    }

    // Graceful shutdown on Ctrl+C.
    {
        let tx = event_tx.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                let _ = tx.send(DaemonEvent::Shutdown).await;
            }
        });
    }

    info!("ohmyaime v{} started", env!("CARGO_PKG_VERSION"));

    // ── Event loop ────────────────────────────────────────────────────────────
    while let Some(evt) = event_rx.recv().await {
        match evt {
            DaemonEvent::TargetStarted => {
                info!("{} started", config.target.process_name);
                status::write_status(&status_path, &service.status().await);
            }

            DaemonEvent::TargetStopped => {
                warn!("{} exited", config.target.process_name);
                status::write_status(&status_path, &service.status().await);
            }

            DaemonEvent::Command(Command::SetIdentifier(id)) => {
                match service.set_identifier(&id).await {
                    Ok(resp) => console::respond(&resp),
                    Err(e) => {
                        if e.is_client_error() {
                            warn!("Rejected identifier: {e}");
                        } else {
                            error!("{e}");
                        }
                        console::respond(&e.to_body());
                    }
                }
                status::write_status(&status_path, &service.status().await);
            }

            DaemonEvent::Command(Command::Status) => {
                let report = service.status().await;
                status::write_status(&status_path, &report);
                console::respond(&report);
            }

            DaemonEvent::Command(Command::Unknown(line)) => {
                console::respond(&ErrorBody {
                    error: format!("unknown command: {line}"),
                    solution: Some("use: set <aimeId> | status | quit".to_string()),
                });
            }

            DaemonEvent::Command(Command::Quit) | DaemonEvent::Shutdown => {
                info!("Shutting down");
                break;
            }
        }
    }

    Ok(())
}

/// Turns the startup discovery result into the folder the daemon will use.
///
/// In strict mode a failed discovery is fatal. Otherwise the daemon keeps going
/// with the best-effort path so status requests can keep reporting the problem.
fn resolve_target(result: DiscoveryResult, strict: bool) -> Result<TargetDirectory> {
    let fallback = result.best_effort_path();
    match result.into_target() {
        Ok(target) => Ok(target),
        Err(e) if strict => Err(e.into()),
        Err(e) => {
            warn!("===== WARNING: AIME FOLDER NOT FOUND =====\n{e}");
            let path = fallback.context("no folder path to fall back to")?;
            warn!(
                "The program will continue with {}, but some features may not work correctly",
                path.display()
            );
            Ok(TargetDirectory::new(path, Strategy::NotFound))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::Discovery;
    use std::path::Path;

    fn engine() -> Discovery {
        Discovery::new("Sinmai.exe", Path::new("AMDaemon").join("DEVICE"))
    }

    #[test]
    fn args_accept_positional_folder() {
        let args = Args::try_parse_from(["ohmyaime", r"D:\SDGA\AMDaemon\DEVICE", "--no-console"]).unwrap();
        assert_eq!(args.folder, Some(PathBuf::from(r"D:\SDGA\AMDaemon\DEVICE")));
        assert!(args.no_console);
        assert!(args.config.is_none());
    }

    #[test]
    fn args_folder_is_optional() {
        let args = Args::try_parse_from(["ohmyaime", "--config", "c.toml"]).unwrap();
        assert!(args.folder.is_none());
        assert_eq!(args.config, Some(PathBuf::from("c.toml")));
    }

    #[test]
    fn strict_failure_is_fatal_and_lists_candidates() {
        let root = tempfile::tempdir().unwrap();
        let bin = root.path().join("Package");
        std::fs::create_dir(&bin).unwrap();
        let result = engine().resolve(None, |_| Some(bin.join("Sinmai.exe")));
        let err = resolve_target(result, true).unwrap_err().to_string();
        assert!(err.contains(&bin.join("AMDaemon").join("DEVICE").display().to_string()));
    }

    #[test]
    fn lenient_failure_keeps_best_effort_path() {
        let root = tempfile::tempdir().unwrap();
        let bin = root.path().join("Package");
        std::fs::create_dir(&bin).unwrap();
        let result = engine().resolve(None, |_| Some(bin.join("Sinmai.exe")));
        let target = resolve_target(result, false).unwrap();
        assert_eq!(target.path(), bin.join("AMDaemon").join("DEVICE"));
        assert_eq!(target.strategy(), Strategy::NotFound);
        assert_eq!(target.check(), crate::status::FolderCheck::Missing);
    }

    #[test]
    fn lenient_failure_without_any_path_is_still_fatal() {
        let result = engine().resolve(None, |_| None);
        assert!(resolve_target(result, false).is_err());
    }

    #[test]
    fn success_passes_through() {
        let dir = tempfile::tempdir().unwrap();
        let result = engine().resolve(Some(dir.path()), |_| None);
        let target = resolve_target(result, true).unwrap();
        assert_eq!(target.path(), dir.path());
    }
}
