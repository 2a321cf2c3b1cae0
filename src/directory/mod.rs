//! User directory sources
//!
//! A directory answers one question: which users should hold a
//! subordinate id range right now. Implementations return user
//! identifiers (numeric uids in practice) for a base scope and filter.

pub mod ldap;
pub mod mock;
pub mod passwd;

use crate::error::Result;
use async_trait::async_trait;

pub use ldap::LdapDirectory;
pub use mock::StaticDirectory;
pub use passwd::PasswdDirectory;

/// Scope and filter of a user lookup
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserQuery {
    /// Search base: home directory prefix for passwd, base DN for LDAP.
    /// An empty prefix matches everyone.
    pub base: String,
    /// LDAP search filter, unused by the passwd source
    pub filter: String,
    /// Lowest uid accepted
    pub min_uid: u32,
    /// Highest uid accepted
    pub max_uid: Option<u32>,
}

impl UserQuery {
    /// Whether `uid` passes the uid filter
    pub fn accepts_uid(&self, uid: u32) -> bool {
        uid >= self.min_uid && self.max_uid.map_or(true, |max| uid <= max)
    }

    /// Whether `home` is inside the base scope
    pub fn in_scope(&self, home: &str) -> bool {
        self.base.is_empty() || home.starts_with(&self.base)
    }
}

/// Source of desired users
///
/// Failures surface as `Error::Directory` and abort the run before any
/// file is touched.
#[async_trait]
pub trait Directory: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &str;

    /// Users matching `query`
    async fn users(&self, query: &UserQuery) -> Result<Vec<String>>;
}

/// Sort user ids numerically
///
/// Non-numeric ids sort as 0; the sort is stable so their relative order
/// is kept.
pub fn sort_numeric(users: &mut [String]) {
    users.sort_by_key(|user| user.parse::<i64>().unwrap_or(0));
}
