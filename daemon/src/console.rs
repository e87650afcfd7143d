/// Line-oriented trigger source on stdin.
///
/// Each line is one command; each response is one JSON object on stdout
/// (logs go to stderr):
///   set <aimeId>   write the identifier and press the confirm key
///   status         report process and folder state
///   quit           shut the daemon down
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::event::DaemonEvent;

#[derive(Debug, PartialEq, Eq)]
pub enum Command {
    SetIdentifier(String),
    Status,
    Quit,
    Unknown(String),
}

/// Parses one input line. Blank lines yield `None`.
pub fn parse(line: &str) -> Option<Command> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let (verb, arg) = match line.split_once(char::is_whitespace) {
        Some((verb, arg)) => (verb, arg.trim()),
        None => (line, ""),
    };
    let cmd = match verb.to_ascii_lowercase().as_str() {
        "set" | "set-aime" => Command::SetIdentifier(arg.to_string()),
        "status" => Command::Status,
        "quit" | "exit" => Command::Quit,
        _ => Command::Unknown(line.to_string()),
    };
    Some(cmd)
}

/// Reads stdin until EOF, forwarding every command to the event loop.
///
/// EOF ends the reader only; the daemon keeps running until Ctrl+C.
pub async fn run(tx: mpsc::Sender<DaemonEvent>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => {
                debug!("Console input closed");
                return;
            }
            Err(e) => {
                warn!("Failed to read console input: {e}");
                return;
            }
        };
        let event = match parse(&line) {
            Some(Command::Quit) => DaemonEvent::Shutdown,
            Some(cmd) => DaemonEvent::Command(cmd),
            None => continue,
        };
        if tx.send(event).await.is_err() {
            return;
        }
    }
}

/// Prints `value` as a single JSON line on stdout.
pub fn respond<T: Serialize>(value: &T) {
    match serde_json::to_string(value) {
        Ok(json) => println!("{json}"),
        Err(e) => warn!("Failed to serialize response: {e}"),
    }
}
