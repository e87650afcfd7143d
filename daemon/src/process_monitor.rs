use tokio::sync::mpsc;
use tokio::time::{interval, Duration};
use tracing::{debug, warn};

use crate::event::DaemonEvent;
use crate::process;

const POLL_INTERVAL_SECS: u64 = 2;

/// Polls the OS process list every [`POLL_INTERVAL_SECS`] seconds and emits
/// [`DaemonEvent::TargetStarted`] / [`DaemonEvent::TargetStopped`] events
/// whenever `process_name` appears or disappears.
///
/// `initially_running` is the state the daemon already knows about, so the
/// first tick only reports a change.
pub async fn run(process_name: String, initially_running: bool, tx: mpsc::Sender<DaemonEvent>) {
    let mut running = initially_running;
    let mut ticker = interval(Duration::from_secs(POLL_INTERVAL_SECS));

    loop {
        ticker.tick().await;

        let name = process_name.clone();
        let now_running = match tokio::task::spawn_blocking(move || process::is_process_running(&name)).await {
            Ok(r) => r,
            Err(e) => {
                warn!("Process poll failed: {e}");
                continue;
            }
        };

        if let Some(event) = transition(running, now_running) {
            debug!("{process_name} running: {now_running}");
            running = now_running;
            if tx.send(event).await.is_err() {
                break;
            }
        }
    }
}

/// The event to emit when the running state goes from `was` to `now`.
fn transition(was: bool, now: bool) -> Option<DaemonEvent> {
    match (was, now) {
        (false, true) => Some(DaemonEvent::TargetStarted),
        (true, false) => Some(DaemonEvent::TargetStopped),
        _ => None, // No change.
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transition_reports_only_changes() {
        assert!(matches!(transition(false, true), Some(DaemonEvent::TargetStarted)));
        assert!(matches!(transition(true, false), Some(DaemonEvent::TargetStopped)));
        assert!(transition(true, true).is_none());
        assert!(transition(false, false).is_none());
    }

    #[tokio::test]
    async fn stops_when_receiver_is_dropped() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        // Claims the process was running; the first poll sees it gone and the
        // failed send ends the loop.
        tokio::time::timeout(
            Duration::from_secs(10),
            run("definitely-not-running-ohmyaime.exe".to_string(), true, tx),
        )
        .await
        .unwrap();
    }
}
