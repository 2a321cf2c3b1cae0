//! Run scheduling
//!
//! A run queries the directory, reconciles the files and records metrics.
//! Runs share nothing but the files they read and write.

use crate::config::Settings;
use crate::directory::{sort_numeric, Directory};
use crate::error::Result;
use crate::metrics;
use crate::subid::{sync, SyncOutcome};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

/// Drives reconciliation runs against one directory
pub struct Runner {
    directory: Arc<dyn Directory>,
    settings: Settings,
}

impl std::fmt::Debug for Runner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runner")
            .field("directory", &self.directory.name())
            .field("settings", &self.settings)
            .finish()
    }
}

impl Runner {
    pub fn new(directory: Arc<dyn Directory>, settings: Settings) -> Self {
        Self {
            directory,
            settings,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// One full run with metrics bookkeeping
    ///
    /// Directory and I/O errors are returned after being recorded; a
    /// directory error leaves the files untouched.
    #[instrument(skip(self), fields(directory = self.directory.name()))]
    pub async fn run_once(&self) -> Result<SyncOutcome> {
        metrics::reset();
        let _timer = metrics::RunTimer::start();

        let result = self.reconcile().await;
        match &result {
            Ok(outcome) => {
                metrics::record_outcome(outcome);
                if outcome.report.capacity_exhausted() {
                    warn!(
                        unassigned = outcome.report.unassigned.len(),
                        "Some users did not get a subid range"
                    );
                }
            }
            Err(e) => {
                error!(error = %e, "Run failed");
                metrics::record_failure();
            }
        }
        result
    }

    async fn reconcile(&self) -> Result<SyncOutcome> {
        let query = self.settings.directory.query();
        let mut users = self.directory.users(&query).await?;
        sort_numeric(&mut users);
        debug!(count = users.len(), "Directory returned users");

        sync(&users, &self.settings.subid)
    }

    /// A single run, followed by the metrics textfile when configured
    pub async fn run_oneshot(&self) -> Result<SyncOutcome> {
        let result = self.run_once().await;

        if let Some(path) = &self.settings.metrics.path {
            if let Err(e) = metrics::write_textfile(path) {
                error!(error = %e, "Failed to write metrics file");
            }
        }
        result
    }

    /// Run now and then every update interval until `shutdown` resolves
    ///
    /// Failed runs are logged and retried on the next tick only.
    pub async fn run_daemon<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let interval = self.settings.daemon.interval();
        info!(interval_secs = interval.as_secs(), "Starting daemon loop");
        tokio::pin!(shutdown);

        loop {
            if let Ok(outcome) = self.run_once().await {
                info!(
                    added = outcome.report.added,
                    removed = outcome.report.removed,
                    total = outcome.report.total,
                    "Run complete"
                );
            }

            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = &mut shutdown => {
                    info!("Shutdown requested, leaving daemon loop");
                    break;
                }
            }
        }
    }
}
