//! Fixed user list
//!
//! Serves the `--users` flag and tests. Can be switched into a failing
//! state to exercise directory errors.

use super::{Directory, UserQuery};
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

/// In-memory directory returning a fixed list
#[derive(Clone, Default)]
pub struct StaticDirectory {
    users: Arc<Mutex<Vec<String>>>,
    failure: Arc<Mutex<Option<String>>>,
}

impl StaticDirectory {
    pub fn new<I, S>(users: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            users: Arc::new(Mutex::new(users.into_iter().map(Into::into).collect())),
            failure: Arc::new(Mutex::new(None)),
        }
    }

    /// Replace the served list
    pub fn set_users<I, S>(&self, users: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        *self.users.lock().unwrap() = users.into_iter().map(Into::into).collect();
    }

    /// Make every lookup fail with `message`, or succeed again with `None`
    pub fn set_failure(&self, message: Option<&str>) {
        *self.failure.lock().unwrap() = message.map(str::to_string);
    }
}

#[async_trait]
impl Directory for StaticDirectory {
    fn name(&self) -> &str {
        "static"
    }

    /// Ignores the query; the list is already the answer
    async fn users(&self, _query: &UserQuery) -> Result<Vec<String>> {
        if let Some(message) = self.failure.lock().unwrap().clone() {
            return Err(Error::Directory(message));
        }
        Ok(self.users.lock().unwrap().clone())
    }
}
