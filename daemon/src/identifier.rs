/// Card identifier validation and the identifier file inside the device folder.
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Card identifiers are exactly this many bytes, as written to the file.
pub const IDENTIFIER_LEN: usize = 20;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdentifierError {
    #[error("aimeId is required")]
    Missing,
    #[error("aimeId must be {IDENTIFIER_LEN} characters, got {len} bytes")]
    WrongLength { len: usize },
}

pub fn validate(id: &str) -> Result<(), IdentifierError> {
    // The game reads raw bytes, so multibyte characters count per byte.
    let len = id.len();
    if len == 0 {
        return Err(IdentifierError::Missing);
    }
    if len != IDENTIFIER_LEN {
        return Err(IdentifierError::WrongLength { len });
    }
    Ok(())
}

/// Replaces `dir/file_name` with the raw bytes of `id`, no trailing newline.
pub fn write(dir: &Path, file_name: &str, id: &str) -> io::Result<PathBuf> {
    let path = dir.join(file_name);
    std::fs::write(&path, id.as_bytes())?;
    Ok(path)
}

#[cfg(test)]
pub fn read(dir: &Path, file_name: &str) -> io::Result<String> {
    std::fs::read_to_string(dir.join(file_name))
}
