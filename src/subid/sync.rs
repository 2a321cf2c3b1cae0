//! One reconciliation pass over the subuid/subgid files

use super::codec;
use super::managed::{self, Management};
use super::reconcile::{allocate_fresh, reconcile, ReconcileReport};
use crate::config::SubIdConfig;
use crate::error::Result;
use tracing::{debug, info, instrument, warn};

/// What a pass did
#[derive(Debug, Clone)]
pub struct SyncOutcome {
    /// State of the subuid file before the pass
    pub mode: Management,
    pub report: ReconcileReport,
    /// Lines of the previous file that could not be parsed
    pub skipped_lines: usize,
}

/// Bring the subuid file in line with `desired`, then mirror it to subgid
///
/// A managed (or missing) subuid file is merged so existing bindings keep
/// their ids. Any other file is overwritten with a fresh allocation in the
/// order of `desired`.
#[instrument(skip(desired, config), fields(subuid = %config.subuid.display()))]
pub fn sync(desired: &[String], config: &SubIdConfig) -> Result<SyncOutcome> {
    let header = config.header();
    let mode = managed::detect(&config.subuid, &header)?;
    debug!(?mode, "Detected management state");

    let (report, skipped_lines) = if mode.is_managed() {
        let mut candidate = config.layout().generate();
        let existing = codec::load(&config.subuid)?;
        debug!(
            count = existing.allocation.len(),
            skipped = existing.skipped.len(),
            "Existing subuids loaded"
        );

        let report = reconcile(desired, existing.allocation, &mut candidate);
        codec::save(&config.subuid, &candidate, &header)?;
        info!(
            added = report.added,
            removed = report.removed,
            "Successfully updated subids"
        );
        (report, existing.skipped.len())
    } else {
        warn!("subuid file is not managed, replacing its content");
        let (allocation, report) = allocate_fresh(desired, &config.layout());
        codec::save(&config.subuid, &allocation, &header)?;
        info!(added = report.added, "Successfully created subids");
        (report, 0)
    };

    codec::mirror(&config.subuid, &config.subgid)?;
    debug!(subgid = %config.subgid.display(), "Copied subuid to subgid");

    Ok(SyncOutcome {
        mode,
        report,
        skipped_lines,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::path::Path;

    fn test_config(name: &str) -> SubIdConfig {
        let dir = std::env::temp_dir().join(format!("subid_sync_{}_{}", name, std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        SubIdConfig {
            subuid: dir.join("subuid"),
            subgid: dir.join("subgid"),
            start: 65537,
            range: 65536,
        }
    }

    fn cleanup(config: &SubIdConfig) {
        if let Some(dir) = config.subuid.parent() {
            std::fs::remove_dir_all(dir).ok();
        }
    }

    fn users(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    fn read(path: &Path) -> String {
        std::fs::read_to_string(path).unwrap()
    }

    #[test]
    fn test_missing_file_is_created() -> Result<()> {
        let config = test_config("missing");
        let outcome = sync(&users(&["1000", "1001"]), &config)?;

        assert_eq!(outcome.mode, Management::Missing);
        assert_eq!(outcome.report.added, 2);
        assert_eq!(
            read(&config.subuid),
            format!("{}\n1000:65537:65536\n1001:131074:65536", config.header())
        );
        assert_eq!(read(&config.subuid), read(&config.subgid));

        cleanup(&config);
        Ok(())
    }

    #[test]
    fn test_unmanaged_file_is_replaced() -> Result<()> {
        let config = test_config("unmanaged");
        std::fs::write(&config.subuid, "alice:100000:65536\n1000:165536:65536\n").unwrap();

        let outcome = sync(&users(&["1000", "1001", "1002", "1003"]), &config)?;

        assert_eq!(outcome.mode, Management::Unmanaged);
        assert_eq!(outcome.report.added, 4);
        assert_eq!(outcome.report.removed, 0);
        let expected = format!(
            "{}\n1000:65537:65536\n1001:131074:65536\n1002:196611:65536\n1003:262148:65536",
            config.header()
        );
        assert_eq!(read(&config.subuid), expected);
        assert_eq!(read(&config.subgid), expected);

        cleanup(&config);
        Ok(())
    }

    #[test]
    fn test_managed_file_is_merged() -> Result<()> {
        let config = test_config("managed");
        std::fs::write(
            &config.subuid,
            format!(
                "{}\n1000:65537:65536\n1001:131074:65536\n1003:196611:65536\n1002:262148:65536",
                config.header()
            ),
        )
        .unwrap();

        let outcome = sync(&users(&["1000", "1001", "1002"]), &config)?;

        assert_eq!(outcome.mode, Management::Managed);
        assert_eq!(outcome.report.added, 0);
        assert_eq!(outcome.report.removed, 1);
        assert_eq!(
            read(&config.subuid),
            format!(
                "{}\n1000:65537:65536\n1001:131074:65536\n1002:262148:65536",
                config.header()
            )
        );

        // Second pass changes nothing
        let again = sync(&users(&["1000", "1001", "1002"]), &config)?;
        assert_eq!(again.report.added, 0);
        assert_eq!(again.report.removed, 0);

        cleanup(&config);
        Ok(())
    }

    #[test]
    fn test_managed_file_with_bad_lines() -> Result<()> {
        let config = test_config("bad_lines");
        std::fs::write(
            &config.subuid,
            format!("{}\ngarbage\n1000:x:65536\n1000:65537:65536\n", config.header()),
        )
        .unwrap();

        let outcome = sync(&users(&["1000", "1001"]), &config)?;
        assert_eq!(outcome.skipped_lines, 2);
        assert_eq!(outcome.report.added, 1);

        cleanup(&config);
        Ok(())
    }

    #[test]
    fn test_unwritable_subgid_fails() {
        let mut config = test_config("bad_subgid");
        config.subgid = config.subuid.with_file_name("missing").join("subgid");

        let err = sync(&users(&["1000"]), &config).unwrap_err();
        assert!(matches!(err, Error::Io { .. }));

        cleanup(&config);
    }

    #[test]
    fn test_unreadable_subuid_writes_nothing() {
        let config = test_config("unreadable");
        std::fs::create_dir_all(&config.subuid).unwrap();

        let err = sync(&users(&["1000"]), &config).unwrap_err();
        assert!(matches!(err, Error::Io { ref path, .. } if path == &config.subuid));
        assert!(config.subuid.is_dir());
        assert!(!config.subgid.exists());

        cleanup(&config);
    }
}
