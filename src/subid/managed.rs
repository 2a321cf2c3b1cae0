//! Detection of files owned by this tool

use crate::error::{Error, Result};
use std::io::ErrorKind;
use std::path::Path;
use tracing::debug;

/// Ownership state of a target file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Management {
    /// File does not exist yet
    Missing,
    /// First line carries our header
    Managed,
    /// File exists with foreign content
    Unmanaged,
}

impl Management {
    /// Whether the file should be merged rather than replaced
    ///
    /// A missing file counts as managed: nothing would be lost by merging.
    pub fn is_managed(self) -> bool {
        matches!(self, Management::Missing | Management::Managed)
    }
}

/// Inspect `path` for the management `header`
///
/// The first line must start with `#` and contain `header` as a substring.
pub fn detect(path: &Path, header: &str) -> Result<Management> {
    let content = match std::fs::read(path) {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Management::Missing),
        Err(e) => return Err(Error::io(path, e)),
    };

    let first = content.split('\n').next().unwrap_or_default();
    debug!(line = first, header, "Check if line is managed");

    if first.starts_with('#') && first.contains(header) {
        Ok(Management::Managed)
    } else {
        Ok(Management::Unmanaged)
    }
}
