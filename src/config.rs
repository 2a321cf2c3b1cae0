//! Runtime settings
//!
//! Settings are layered: built-in defaults, then an optional settings file
//! (format picked from its extension, usually TOML), then command-line
//! flags and environment variables applied by the binary.
//!
//! ```toml
//! [subid]
//! subuid = "/etc/subuid"
//! subgid = "/etc/subgid"
//! start = 65537
//! range = 65536
//!
//! [directory]
//! passwd = "/etc/passwd"
//! base = "/home"
//! min_uid = 1000
//!
//! # Search LDAP instead of the passwd file; `base` is then the user base DN
//! # [directory.ldap]
//! # url = "ldap://ldap.example.com"
//! # bind_dn = "cn=reader,dc=example,dc=com"
//! # bind_password = "secret"
//! # paged_search = true
//!
//! [daemon]
//! enabled = true
//! update_interval_secs = 300
//! ```

use crate::directory::UserQuery;
use crate::error::{Error, Result};
use crate::subid::{SlotLayout, MAX_ID};
use crate::APP_NAME;
use ::config::{Config as Layered, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

/// Slot count above which a layout is reported as unusually large
const LARGE_LAYOUT: u64 = 1 << 20;

/// Subordinate id files and their layout
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SubIdConfig {
    /// Primary file
    pub subuid: PathBuf,
    /// Mirror of the primary file
    pub subgid: PathBuf,
    /// First id handed out
    pub start: u64,
    /// Ids per user
    pub range: u64,
}

impl Default for SubIdConfig {
    fn default() -> Self {
        Self {
            subuid: PathBuf::from("/etc/subuid"),
            subgid: PathBuf::from("/etc/subgid"),
            start: 65537,
            range: 65536,
        }
    }
}

impl SubIdConfig {
    /// Header written on the first line of managed files
    pub fn header(&self) -> String {
        format!(
            "# Managed by {}: start={} range={}",
            APP_NAME, self.start, self.range
        )
    }

    pub fn layout(&self) -> SlotLayout {
        SlotLayout::new(self.start, self.range)
    }
}

/// LDAP server and search settings
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LdapConfig {
    /// Server URL; the LDAP source is used when set
    pub url: Option<String>,
    pub bind_dn: Option<String>,
    pub bind_password: Option<String>,
    /// Attribute holding the user id
    pub uid_attr: String,
    pub paged_search: bool,
    pub paged_search_size: i32,
}

impl Default for LdapConfig {
    fn default() -> Self {
        Self {
            url: None,
            bind_dn: None,
            bind_password: None,
            uid_attr: "uidNumber".to_string(),
            paged_search: false,
            paged_search_size: 1000,
        }
    }
}

impl std::fmt::Debug for LdapConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LdapConfig")
            .field("url", &self.url)
            .field("bind_dn", &self.bind_dn)
            .field("bind_password", &self.bind_password.as_ref().map(|_| "***"))
            .field("uid_attr", &self.uid_attr)
            .field("paged_search", &self.paged_search)
            .field("paged_search_size", &self.paged_search_size)
            .finish()
    }
}

/// Where users come from
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DirectoryConfig {
    /// passwd(5) formatted user database
    pub passwd: PathBuf,
    /// Home directory prefix for passwd, user base DN for LDAP
    pub base: String,
    /// LDAP search filter
    pub filter: String,
    pub min_uid: u32,
    pub max_uid: Option<u32>,
    /// Fixed user list, replaces every other source when set
    pub users: Option<Vec<String>>,
    pub ldap: LdapConfig,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            passwd: PathBuf::from("/etc/passwd"),
            base: String::new(),
            filter: "(objectClass=posixAccount)".to_string(),
            min_uid: 1000,
            max_uid: None,
            users: None,
            ldap: LdapConfig::default(),
        }
    }
}

impl DirectoryConfig {
    pub fn query(&self) -> UserQuery {
        UserQuery {
            base: self.base.clone(),
            filter: self.filter.clone(),
            min_uid: self.min_uid,
            max_uid: self.max_uid,
        }
    }

    /// Which source the settings select
    pub fn source(&self) -> Source {
        if self.users.is_some() {
            Source::Static
        } else if self.ldap.url.is_some() {
            Source::Ldap
        } else {
            Source::Passwd
        }
    }
}

/// User source picked by [`DirectoryConfig::source`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Static,
    Ldap,
    Passwd,
}

/// Daemon mode
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub enabled: bool,
    pub update_interval_secs: u64,
    /// Metrics listen address
    pub listen_address: String,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            update_interval_secs: 300,
            listen_address: "0.0.0.0:8085".to_string(),
        }
    }
}

impl DaemonConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.update_interval_secs)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Textfile written after a one-shot run
    pub path: Option<PathBuf>,
}

/// All settings
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub subid: SubIdConfig,
    pub directory: DirectoryConfig,
    pub daemon: DaemonConfig,
    pub metrics: MetricsConfig,
}

impl Settings {
    /// Load defaults, overlaid with `path` when given
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Layered::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }

        builder
            .build()
            .and_then(|layered| layered.try_deserialize::<Settings>())
            .map_err(|e| Error::Config(e.to_string()))
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();

        if self.subid.range == 0 {
            errors.push("subid.range must be greater than 0".to_string());
        }
        if self.daemon.enabled && self.daemon.update_interval_secs == 0 {
            errors.push("daemon.update_interval_secs must be greater than 0".to_string());
        }
        if let Some(max) = self.directory.max_uid {
            if max < self.directory.min_uid {
                errors.push(format!(
                    "directory.max_uid ({}) is below directory.min_uid ({})",
                    max, self.directory.min_uid
                ));
            }
        }
        let ldap = &self.directory.ldap;
        if ldap.bind_dn.is_some() != ldap.bind_password.is_some() {
            errors.push(
                "directory.ldap: must provide both bind_dn and bind_password if either is provided"
                    .to_string(),
            );
        }
        if self.directory.source() == Source::Ldap {
            if self.directory.base.is_empty() {
                errors.push("directory.base must be set to the LDAP user base DN".to_string());
            }
            if ldap.paged_search && ldap.paged_search_size <= 0 {
                errors.push("directory.ldap.paged_search_size must be greater than 0".to_string());
            }
        }
        if self.subid.subuid == self.subid.subgid {
            errors.push("subid.subuid and subid.subgid must differ".to_string());
        }

        if !errors.is_empty() {
            return Err(Error::Config(errors.join(", ")));
        }

        if self.subid.start >= MAX_ID {
            warn!(
                start = self.subid.start,
                max = MAX_ID,
                "subid.start is past the id space, no slots can be assigned"
            );
        }
        let capacity = self.subid.layout().capacity();
        if capacity > LARGE_LAYOUT {
            warn!(
                range = self.subid.range,
                slots = capacity,
                "subid.range is small, every slot is held in memory during a run"
            );
        }
        Ok(())
    }
}
