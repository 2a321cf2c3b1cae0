// subid-sync - Rust Implementation
// Keeps subordinate uid/gid ranges in step with a user directory

#![warn(rust_2018_idioms)]

pub mod config;
pub mod directory;
pub mod metrics;
pub mod runner;
pub mod server;
pub mod subid;

// Re-exports for convenience
pub use config::{Settings, SubIdConfig};
pub use directory::{Directory, UserQuery};
pub use subid::{Allocation, ReconcileReport, Slot, SlotLayout, SyncOutcome};

/// subid-sync error types
pub mod error {
    use std::path::PathBuf;
    use thiserror::Error;

    #[derive(Error, Debug)]
    pub enum Error {
        #[error("I/O error on {}: {source}", path.display())]
        Io {
            path: PathBuf,
            #[source]
            source: std::io::Error,
        },

        #[error("Directory error: {0}")]
        Directory(String),

        #[error("Configuration error: {0}")]
        Config(String),

        #[error("Metrics error: {0}")]
        Metrics(String),
    }

    impl Error {
        /// Wrap an I/O failure together with the path it happened on
        pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
            Error::Io {
                path: path.into(),
                source,
            }
        }
    }

    pub type Result<T> = std::result::Result<T, Error>;
}

/// Application name, embedded in the managed-file header
pub const APP_NAME: &str = "subid-sync";

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_mentions_path() {
        let err = error::Error::io(
            "/etc/subuid",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        let msg = err.to_string();
        assert!(msg.contains("/etc/subuid"));
        assert!(msg.contains("denied"));
    }

    #[test]
    fn test_app_name() {
        assert_eq!(APP_NAME, "subid-sync");
        assert!(!VERSION.is_empty());
    }
}
