/// Synthetic keyboard input through the OS global input stream (`SendInput`).
///
/// A press is a Down event, a blocking hold, then an Up event. All presses go
/// through one [`Injector`], whose mutex is held for the whole sequence so two
/// callers can never interleave their Down/Up events.
///
/// On non-Windows platforms the public API compiles but nothing is injected;
/// every submission reports zero accepted events.
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Down,
    Up,
}

/// One half of a key press, mirroring the fields of a Win32 `KEYBDINPUT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub virtual_key: u16,
    pub scan_code: u16,
    pub transition: Transition,
    /// Event time in ms; 0 lets the OS stamp it.
    pub timestamp: u32,
    pub extra_info: u64,
}

impl KeyEvent {
    pub fn down(virtual_key: u16) -> Self {
        Self::new(virtual_key, Transition::Down)
    }

    pub fn up(virtual_key: u16) -> Self {
        Self::new(virtual_key, Transition::Up)
    }

    fn new(virtual_key: u16, transition: Transition) -> Self {
        Self {
            virtual_key,
            scan_code: 0,
            transition,
            timestamp: 0,
            extra_info: 0,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InjectError {
    #[error("unrecognized key name: {0:?}")]
    UnrecognizedKey(String),
    #[error("key {transition:?} submission accepted {accepted} events, expected 1")]
    SubmissionMismatch { transition: Transition, accepted: u32 },
}

/// Converts a key name (e.g. `"enter"`, `"F8"`, `"A"`) to a Windows virtual-key code.
///
/// Supported keys, all case-insensitive:
/// - `enter`, `space`, `tab`, `backspace`, `escape` / `esc`.
/// - Function keys `F1`–`F12`.
/// - ASCII letters `A`–`Z` (`0x41`–`0x5A`) and digits `0`–`9` (`0x30`–`0x39`).
///
/// Returns `None` for any unrecognised name.
pub fn virtual_key_for(name: &str) -> Option<u16> {
    match name.to_uppercase().as_str() {
        "ENTER" | "RETURN" => Some(0x0D),
        "SPACE" => Some(0x20),
        "TAB" => Some(0x09),
        "BACKSPACE" => Some(0x08),
        "ESCAPE" | "ESC" => Some(0x1B),
        "F1"  => Some(0x70),
        "F2"  => Some(0x71),
        "F3"  => Some(0x72),
        "F4"  => Some(0x73),
        "F5"  => Some(0x74),
        "F6"  => Some(0x75),
        "F7"  => Some(0x76),
        "F8"  => Some(0x77),
        "F9"  => Some(0x78),
        "F10" => Some(0x79),
        "F11" => Some(0x7A),
        "F12" => Some(0x7B),
        s => {
            let mut chars = s.chars();
            match (chars.next(), chars.next()) {
                // 'A'=0x41…'Z'=0x5A; '0'=0x30…'9'=0x39, same as the VK codes.
                (Some(c), None) if c.is_ascii_alphanumeric() => Some(c as u16),
                _ => None,
            }
        }
    }
}

/// Submits one event to the OS and returns how many events it accepted.
pub trait InputBackend: Send {
    fn submit(&mut self, event: &KeyEvent) -> u32;
}

/// The platform input primitive.
#[derive(Debug, Default)]
pub struct SendInputBackend;

impl InputBackend for SendInputBackend {
    #[cfg(windows)]
    fn submit(&mut self, event: &KeyEvent) -> u32 {
        imp::send(event)
    }

    #[cfg(not(windows))]
    fn submit(&mut self, event: &KeyEvent) -> u32 {
        debug!("Synthetic input unsupported on this platform, dropping {event:?}");
        0
    }
}

/// Serializes key presses onto a single input bus.
pub struct Injector<B> {
    bus: Mutex<B>,
}

pub type SystemInjector = Injector<SendInputBackend>;

impl SystemInjector {
    pub fn system() -> Self {
        Self::new(SendInputBackend)
    }
}

impl<B: InputBackend> Injector<B> {
    pub fn new(backend: B) -> Self {
        Self { bus: Mutex::new(backend) }
    }

    /// Presses `key` for `hold`, blocking the calling thread.
    ///
    /// Up is submitted even when Down was not accepted. Each rejected
    /// submission is logged; the first one is returned.
    pub fn press(&self, key: &str, hold: Duration) -> Result<(), InjectError> {
        let vk = virtual_key_for(key).ok_or_else(|| InjectError::UnrecognizedKey(key.to_string()))?;

        // A panic mid-press leaves no state worth discarding; keep the bus usable.
        let mut bus = self.bus.lock().unwrap_or_else(PoisonError::into_inner);

        let down = submit(&mut *bus, KeyEvent::down(vk));
        std::thread::sleep(hold);
        let up = submit(&mut *bus, KeyEvent::up(vk));

        debug!("Pressed {key} (vk {vk:#04x}) for {} ms", hold.as_millis());
        down.and(up)
    }
}

fn submit<B: InputBackend>(bus: &mut B, event: KeyEvent) -> Result<(), InjectError> {
    let accepted = bus.submit(&event);
    if accepted == 1 {
        return Ok(());
    }
    warn!(
        "SendInput failed: key {:#04x} {:?} accepted {accepted} events",
        event.virtual_key, event.transition
    );
    Err(InjectError::SubmissionMismatch { transition: event.transition, accepted })
}

// ── Windows implementation ────────────────────────────────────────────────────

#[cfg(windows)]
mod imp {
    use windows::Win32::UI::Input::KeyboardAndMouse::{
        SendInput, INPUT, INPUT_0, INPUT_KEYBOARD, KEYBDINPUT, KEYBD_EVENT_FLAGS,
        KEYEVENTF_KEYUP, VIRTUAL_KEY,
    };

    use super::{KeyEvent, Transition};

    pub fn send(event: &KeyEvent) -> u32 {
        let flags = match event.transition {
            Transition::Down => KEYBD_EVENT_FLAGS(0),
            Transition::Up => KEYEVENTF_KEYUP,
        };
        let input = [INPUT {
            r#type: INPUT_KEYBOARD,
            Anonymous: INPUT_0 {
                ki: KEYBDINPUT {
                    wVk: VIRTUAL_KEY(event.virtual_key),
                    wScan: event.scan_code,
                    dwFlags: flags,
                    time: event.timestamp,
                    dwExtraInfo: event.extra_info as usize,
                },
            },
        }];
        unsafe { SendInput(&input, std::mem::size_of::<INPUT>() as i32) }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
