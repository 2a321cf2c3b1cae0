//! Line format of the subuid/subgid files
//!
//! ```text
//! # Managed by subid-sync: start=65537 range=65536
//! 1000:65537:65536
//! 1001:131074:65536
//! ```
//!
//! Reading is lenient: rows that do not have exactly three `:`-separated
//! fields, or whose id/count are not integers, are skipped and reported.
//! Writing replaces the whole file and only records occupied slots.

use super::slot::{Allocation, Slot};
use crate::error::{Error, Result};
use std::fmt;
use std::io::ErrorKind;
use std::path::Path;
use tracing::{debug, warn};

/// Why a line was left out of a loaded allocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Not exactly three `:`-separated fields
    FieldCount,
    /// Second field is not an integer
    InvalidId,
    /// Third field is not an integer
    InvalidCount,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::FieldCount => write!(f, "line does not contain 3 fields"),
            SkipReason::InvalidId => write!(f, "unable to parse id"),
            SkipReason::InvalidCount => write!(f, "unable to parse count"),
        }
    }
}

/// A line dropped while loading
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedLine {
    /// 1-based line number
    pub line_no: usize,
    pub line: String,
    pub reason: SkipReason,
}

/// Result of loading a file
#[derive(Debug, Default)]
pub struct Loaded {
    pub allocation: Allocation,
    pub skipped: Vec<SkippedLine>,
}

/// Parse file content into an allocation
///
/// Comment lines (`#...`) and blank lines are ignored without being
/// reported as skipped.
pub fn parse(content: &str) -> Loaded {
    let mut loaded = Loaded::default();

    for (index, line) in content.lines().enumerate() {
        if line.trim().is_empty() || line.starts_with('#') {
            continue;
        }

        match parse_line(line) {
            Ok(slot) => {
                loaded.allocation.insert(slot);
            }
            Err(reason) => {
                match reason {
                    SkipReason::FieldCount => {
                        debug!(line, "Skipping line that does not contain 3 fields")
                    }
                    _ => warn!(line, reason = %reason, "Skipping unparsable line"),
                }
                loaded.skipped.push(SkippedLine {
                    line_no: index + 1,
                    line: line.to_string(),
                    reason,
                });
            }
        }
    }

    loaded
}

fn parse_line(line: &str) -> std::result::Result<Slot, SkipReason> {
    let fields: Vec<&str> = line.split(':').collect();
    let [owner, id, count] = fields.as_slice() else {
        return Err(SkipReason::FieldCount);
    };
    let id = id.parse::<u64>().map_err(|_| SkipReason::InvalidId)?;
    let count = count.parse::<u64>().map_err(|_| SkipReason::InvalidCount)?;
    Ok(Slot::bound(*owner, id, count))
}

/// Load an allocation from `path`
///
/// A missing file loads as an empty allocation.
pub fn load(path: &Path) -> Result<Loaded> {
    debug!(path = %path.display(), "Read subid file");
    let content = match std::fs::read(path) {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!(path = %path.display(), "subid file does not exist, starting empty");
            return Ok(Loaded::default());
        }
        Err(e) => return Err(Error::io(path, e)),
    };
    Ok(parse(&content))
}

/// Render the header followed by every occupied slot, ascending by id
pub fn render(allocation: &Allocation, header: &str) -> String {
    let mut lines = vec![header.to_string()];
    lines.extend(allocation.occupied().map(Slot::to_string));
    lines.join("\n")
}

/// Replace the content of `path` with the rendered allocation
pub fn save(path: &Path, allocation: &Allocation, header: &str) -> Result<()> {
    debug!(path = %path.display(), "Update subid file");
    std::fs::write(path, render(allocation, header)).map_err(|e| Error::io(path, e))
}

/// Copy `source` byte-for-byte to `dest`
pub fn mirror(source: &Path, dest: &Path) -> Result<()> {
    let content = std::fs::read(source).map_err(|e| Error::io(source, e))?;
    std::fs::write(dest, content).map_err(|e| Error::io(dest, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    const HEADER: &str = "# Managed by subid-sync: start=65537 range=65536";

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("subid_codec_{}_{}", name, std::process::id()))
    }

    fn triples(allocation: &Allocation) -> Vec<(String, u64, u64)> {
        allocation
            .occupied()
            .map(|s| (s.owner.clone(), s.id, s.count))
            .collect()
    }

    #[test]
    fn test_parse_managed_file() {
        let content = format!(
            "{}\n1000:65537:65536\n1001:131074:65536\n1002:196611:65536",
            HEADER
        );
        let loaded = parse(&content);

        assert_eq!(loaded.allocation.len(), 3);
        assert!(loaded.skipped.is_empty());
        assert_eq!(loaded.allocation.owner_at(65537), Some("1000"));
        assert_eq!(loaded.allocation.get(196611).map(|s| s.count), Some(65536));
    }

    #[test]
    fn test_parse_skips_bad_lines() {
        let content = "foo\n1000:abc:65536\n1001:131074:xyz\n1003:196611:65536\na:b\n";
        let loaded = parse(content);

        assert_eq!(loaded.allocation.len(), 1);
        assert_eq!(loaded.allocation.owner_at(196611), Some("1003"));

        let reasons: Vec<SkipReason> = loaded.skipped.iter().map(|s| s.reason).collect();
        assert_eq!(
            reasons,
            vec![
                SkipReason::FieldCount,
                SkipReason::InvalidId,
                SkipReason::InvalidCount,
                SkipReason::FieldCount,
            ]
        );
        assert_eq!(loaded.skipped[1].line_no, 2);
    }

    #[test]
    fn test_parse_ignores_header_with_colons() {
        let content = "# Managed by a:b:c\n1000:65537:65536";
        let loaded = parse(content);

        assert_eq!(loaded.allocation.len(), 1);
        assert!(loaded.skipped.is_empty());
    }

    #[test]
    fn test_render_skips_free_slots() {
        let allocation: Allocation = vec![
            Slot::bound("1001", 131074, 65536),
            Slot::free(196611, 65536),
            Slot::bound("1000", 65537, 65536),
        ]
        .into_iter()
        .collect();

        assert_eq!(
            render(&allocation, HEADER),
            format!("{}\n1000:65537:65536\n1001:131074:65536", HEADER)
        );
    }

    #[test]
    fn test_load_missing_file_is_empty() -> Result<()> {
        let loaded = load(&temp_path("missing"))?;
        assert!(loaded.allocation.is_empty());
        Ok(())
    }

    #[test]
    fn test_save_then_load() -> Result<()> {
        let path = temp_path("roundtrip");
        let allocation: Allocation = vec![
            Slot::bound("1000", 65537, 65536),
            Slot::bound("1002", 196611, 65536),
            Slot::free(131074, 65536),
        ]
        .into_iter()
        .collect();

        save(&path, &allocation, HEADER)?;
        let first = load(&path)?;
        save(&path, &first.allocation, HEADER)?;
        let second = load(&path)?;

        assert_eq!(triples(&first.allocation), triples(&allocation));
        assert_eq!(triples(&second.allocation), triples(&allocation));

        std::fs::remove_file(path).ok();
        Ok(())
    }

    #[test]
    fn test_save_into_missing_directory_fails() {
        let path = temp_path("no_such_dir").join("subuid");
        let err = save(&path, &Allocation::new(), HEADER).unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
    }

    #[test]
    fn test_mirror() -> Result<()> {
        let source = temp_path("mirror_src");
        let dest = temp_path("mirror_dst");
        std::fs::write(&source, "abc\n1:2:3").map_err(|e| Error::io(&source, e))?;

        mirror(&source, &dest)?;
        assert_eq!(
            std::fs::read(&dest).map_err(|e| Error::io(&dest, e))?,
            b"abc\n1:2:3"
        );

        assert!(mirror(&temp_path("mirror_missing"), &dest).is_err());
        assert!(mirror(&source, &temp_path("no_dir").join("subgid")).is_err());

        std::fs::remove_file(source).ok();
        std::fs::remove_file(dest).ok();
        Ok(())
    }
}
