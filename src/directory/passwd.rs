//! passwd(5) backed directory
//!
//! Reads `name:password:uid:gid:gecos:home:shell` rows, e.g. `/etc/passwd`
//! or the output of `getent passwd` saved to a file, and returns the uids
//! of accounts matching the query.

use super::{Directory, UserQuery};
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{debug, instrument};

const PASSWD_FIELDS: usize = 7;

/// Directory reading a passwd formatted file
#[derive(Debug, Clone)]
pub struct PasswdDirectory {
    path: PathBuf,
}

impl PasswdDirectory {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Uids of the rows in `content` matching `query`, in file order
pub fn parse_passwd(content: &str, query: &UserQuery) -> Vec<String> {
    content
        .lines()
        .filter(|line| !line.trim().is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            let fields: Vec<&str> = line.split(':').collect();
            if fields.len() != PASSWD_FIELDS {
                debug!(line, "Skipping passwd row without 7 fields");
                return None;
            }
            let Ok(uid) = fields[2].parse::<u32>() else {
                debug!(line, "Skipping passwd row with invalid uid");
                return None;
            };
            (query.accepts_uid(uid) && query.in_scope(fields[5])).then(|| uid.to_string())
        })
        .collect()
}

#[async_trait]
impl Directory for PasswdDirectory {
    fn name(&self) -> &str {
        "passwd"
    }

    #[instrument(skip(self), fields(path = %self.path.display()))]
    async fn users(&self, query: &UserQuery) -> Result<Vec<String>> {
        let content = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            Error::Directory(format!("unable to read {}: {}", self.path.display(), e))
        })?;

        let users = parse_passwd(&content, query);
        debug!(count = users.len(), "passwd returned users");
        Ok(users)
    }
}
