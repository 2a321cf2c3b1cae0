//! LDAP user search
//!
//! Connects, optionally binds, and runs a subtree search under the query
//! base DN, collecting one attribute (`uidNumber` by default) per entry.
//! Large directories can be read with the paged results control.
//! The query filter selects users; its uid window is not applied.

use super::{Directory, UserQuery};
use crate::config::LdapConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use ldap3::adapters::{Adapter, EntriesOnly, PagedResults};
use ldap3::{Ldap, LdapConnAsync, LdapError, Scope, SearchEntry};
use tracing::{debug, error, warn};

const MATCH_ALL: &str = "(objectClass=*)";

/// Directory backed by an LDAP server
#[derive(Debug, Clone)]
pub struct LdapDirectory {
    config: LdapConfig,
}

impl LdapDirectory {
    pub fn new(config: LdapConfig) -> Self {
        Self { config }
    }

    async fn connect(&self, url: &str) -> Result<Ldap> {
        debug!(url, "Connecting to LDAP");
        let (conn, mut ldap) = LdapConnAsync::new(url).await.map_err(|e| {
            error!(url, error = %e, "Error connecting to LDAP URL");
            directory_error("connect", e)
        })?;
        tokio::spawn(async move {
            if let Err(e) = conn.drive().await {
                warn!(error = %e, "LDAP connection error");
            }
        });

        if let (Some(dn), Some(password)) = (&self.config.bind_dn, &self.config.bind_password) {
            debug!(url, binddn = %dn, "Binding to LDAP");
            ldap.simple_bind(dn, password)
                .await
                .and_then(|res| res.success())
                .map_err(|e| {
                    error!(binddn = %dn, error = %e, "Error binding to LDAP");
                    directory_error("bind", e)
                })?;
        }
        Ok(ldap)
    }

    async fn search(&self, ldap: &mut Ldap, query: &UserQuery) -> Result<Vec<SearchEntry>> {
        let filter = if query.filter.is_empty() {
            MATCH_ALL
        } else {
            query.filter.as_str()
        };
        let attrs = vec![self.config.uid_attr.as_str()];
        debug!(
            basedn = %query.base,
            filter,
            attr = %self.config.uid_attr,
            paged = self.config.paged_search,
            "Running user search"
        );

        if !self.config.paged_search {
            let (entries, _) = ldap
                .search(&query.base, Scope::Subtree, filter, attrs)
                .await
                .and_then(|res| res.success())
                .map_err(|e| directory_error("search", e))?;
            return Ok(entries.into_iter().map(SearchEntry::construct).collect());
        }

        let adapters: Vec<Box<dyn Adapter<_, _>>> = vec![
            Box::new(EntriesOnly::new()),
            Box::new(PagedResults::new(self.config.paged_search_size)),
        ];
        let mut stream = ldap
            .streaming_search_with(adapters, &query.base, Scope::Subtree, filter, attrs)
            .await
            .map_err(|e| directory_error("search", e))?;

        let mut entries = Vec::new();
        while let Some(entry) = stream
            .next()
            .await
            .map_err(|e| directory_error("search", e))?
        {
            entries.push(SearchEntry::construct(entry));
        }
        stream
            .finish()
            .await
            .success()
            .map_err(|e| directory_error("search", e))?;
        Ok(entries)
    }
}

fn directory_error(stage: &str, e: LdapError) -> Error {
    Error::Directory(format!("ldap {}: {}", stage, e))
}

/// First value of `attr` per entry; entries without it are dropped
pub fn entry_uids(entries: &[SearchEntry], attr: &str) -> Vec<String> {
    entries
        .iter()
        .filter_map(|entry| {
            let uid = entry
                .attrs
                .get(attr)
                .and_then(|values| values.first())
                .filter(|value| !value.is_empty());
            if uid.is_none() {
                warn!(dn = %entry.dn, attr, "Entry has no uid attribute, skipping");
            }
            uid.cloned()
        })
        .collect()
}

#[async_trait]
impl Directory for LdapDirectory {
    fn name(&self) -> &str {
        "ldap"
    }

    async fn users(&self, query: &UserQuery) -> Result<Vec<String>> {
        let url = self
            .config
            .url
            .as_deref()
            .ok_or_else(|| Error::Directory("ldap url is not set".to_string()))?;

        let mut ldap = self.connect(url).await?;
        let result = self.search(&mut ldap, query).await;
        if let Err(e) = ldap.unbind().await {
            debug!(error = %e, "LDAP unbind failed");
        }

        let entries = result.map_err(|e| {
            error!(error = %e, "Error getting results");
            e
        })?;
        debug!(count = entries.len(), "LDAP search results");
        Ok(entry_uids(&entries, &self.config.uid_attr))
    }
}
