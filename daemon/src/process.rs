/// Point-in-time queries against the host process table.
///
/// A [`Snapshot`] is a lazy, finite iterator over [`ProcessRecord`]s. On Windows
/// it wraps a Toolhelp32 snapshot handle that is closed when the iterator is
/// dropped, whether it ran to exhaustion, stopped early on a match, or hit an
/// enumeration error. Elsewhere it is backed by a one-shot `sysinfo` refresh.
///
/// Processes started after [`Snapshot::take`] returns are not visible to it.
use std::path::PathBuf;

use tracing::warn;

/// One entry of a process snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessRecord {
    /// Executable file name only, e.g. `Sinmai.exe`.
    pub name: String,
    pub pid: u32,
    /// Full image path, when the snapshot already carries it. Toolhelp entries
    /// never do; [`resolve_path`] queries the OS for a single matched record.
    pub executable_path: Option<PathBuf>,
}

/// Returns the first record whose executable name equals `name` exactly.
///
/// Matching is case-sensitive and compares the file name only, never the path.
pub fn find_in<I>(records: I, name: &str) -> Option<ProcessRecord>
where
    I: IntoIterator<Item = ProcessRecord>,
{
    records.into_iter().find(|record| record.name == name)
}

/// Returns the executable path of the first running process named `name`.
///
/// A snapshot that cannot be created is reported as "not found".
pub fn find_running_process(name: &str) -> Option<PathBuf> {
    let snapshot = match Snapshot::take() {
        Ok(s) => s,
        Err(e) => {
            warn!("Process snapshot failed, treating {name} as not running: {e}");
            return None;
        }
    };
    let record = find_in(snapshot, name)?;
    let pid = record.pid;
    let path = resolve_path(record);
    if path.is_none() {
        warn!("{name} (pid {pid}) is running but its path could not be read");
    }
    path
}

/// The record's image path, asking the OS only when the snapshot lacks it.
/// `None` when the OS refuses the query (protected or other-user processes).
pub fn resolve_path(record: ProcessRecord) -> Option<PathBuf> {
    #[cfg(windows)]
    {
        record.executable_path.or_else(|| imp::image_path(record.pid))
    }
    #[cfg(not(windows))]
    {
        record.executable_path
    }
}

/// Answers whether any process named `name` is in a fresh snapshot.
pub fn is_process_running(name: &str) -> bool {
    match Snapshot::take() {
        Ok(snapshot) => find_in(snapshot, name).is_some(),
        Err(e) => {
            warn!("Process snapshot failed: {e}");
            false
        }
    }
}

// ── Windows: Toolhelp32 ───────────────────────────────────────────────────────

#[cfg(windows)]
pub use imp::Snapshot;

#[cfg(windows)]
mod imp {
    use std::io;
    use std::path::PathBuf;

    use windows::core::PWSTR;
    use windows::Win32::Foundation::{CloseHandle, HANDLE};
    use windows::Win32::System::Diagnostics::ToolHelp::{
        CreateToolhelp32Snapshot, Process32FirstW, Process32NextW, PROCESSENTRY32W,
        TH32CS_SNAPPROCESS,
    };
    use windows::Win32::System::Threading::{
        OpenProcess, QueryFullProcessImageNameW, PROCESS_NAME_WIN32,
        PROCESS_QUERY_LIMITED_INFORMATION,
    };

    use super::ProcessRecord;

    /// Owns a `TH32CS_SNAPPROCESS` handle for the lifetime of the iteration.
    pub struct Snapshot {
        handle: HANDLE,
        entry: PROCESSENTRY32W,
        started: bool,
        exhausted: bool,
    }

    impl Snapshot {
        pub fn take() -> io::Result<Self> {
            let handle = unsafe { CreateToolhelp32Snapshot(TH32CS_SNAPPROCESS, 0) }
                .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
            let entry = PROCESSENTRY32W {
                dwSize: std::mem::size_of::<PROCESSENTRY32W>() as u32,
                ..Default::default()
            };
            Ok(Self { handle, entry, started: false, exhausted: false })
        }
    }

    impl Iterator for Snapshot {
        type Item = ProcessRecord;

        fn next(&mut self) -> Option<ProcessRecord> {
            if self.exhausted {
                return None;
            }
            // Process32*W fail with ERROR_NO_MORE_FILES at the end; any other
            // failure also ends the sequence.
            let advanced = unsafe {
                if self.started {
                    Process32NextW(self.handle, &mut self.entry)
                } else {
                    Process32FirstW(self.handle, &mut self.entry)
                }
            };
            self.started = true;
            if advanced.is_err() {
                self.exhausted = true;
                return None;
            }

            let len = self
                .entry
                .szExeFile
                .iter()
                .position(|&c| c == 0)
                .unwrap_or(self.entry.szExeFile.len());
            Some(ProcessRecord {
                name: String::from_utf16_lossy(&self.entry.szExeFile[..len]),
                pid: self.entry.th32ProcessID,
                executable_path: None,
            })
        }
    }

    impl Drop for Snapshot {
        fn drop(&mut self) {
            unsafe {
                let _ = CloseHandle(self.handle);
            }
        }
    }

    /// Full Win32 image path of `pid`, or `None` if the process cannot be opened.
    pub fn image_path(pid: u32) -> Option<PathBuf> {
        if pid == 0 {
            return None;
        }
        unsafe {
            let process = OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, false, pid).ok()?;
            let mut buf = [0u16; 1024];
            let mut len = buf.len() as u32;
            let queried = QueryFullProcessImageNameW(
                process,
                PROCESS_NAME_WIN32,
                PWSTR(buf.as_mut_ptr()),
                &mut len,
            );
            let _ = CloseHandle(process);
            queried.ok()?;
            Some(PathBuf::from(String::from_utf16_lossy(&buf[..len as usize])))
        }
    }
}

// ── Other platforms: sysinfo ──────────────────────────────────────────────────

#[cfg(not(windows))]
pub struct Snapshot {
    records: std::vec::IntoIter<ProcessRecord>,
}

#[cfg(not(windows))]
impl Snapshot {
    pub fn take() -> std::io::Result<Self> {
        use sysinfo::{ProcessRefreshKind, ProcessesToUpdate, System, UpdateKind};

        let mut sys = System::new();
        sys.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::new().with_exe(UpdateKind::OnlyIfNotSet),
        );
        let records: Vec<ProcessRecord> = sys
            .processes()
            .values()
            .map(|p| ProcessRecord {
                name: p.name().to_string_lossy().into_owned(),
                pid: p.pid().as_u32(),
                executable_path: p.exe().map(PathBuf::from),
            })
            .collect();
        tracing::debug!("Process snapshot holds {} entries", records.len());
        Ok(Self { records: records.into_iter() })
    }
}

#[cfg(not(windows))]
impl Iterator for Snapshot {
    type Item = ProcessRecord;

    fn next(&mut self) -> Option<ProcessRecord> {
        self.records.next()
    }
}
