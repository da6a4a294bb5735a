//! Group membership: the closed vocabulary of group names and the single
//! configured source of truth for who belongs to what.
//!
//! Exactly one [`GroupStore`] implementation is selected at startup
//! (`--group-backend`); the directory-backed store and the in-process table
//! never run side by side, so membership answers cannot silently diverge.

use async_trait::async_trait;
use regex::Regex;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::directory::{bounded, CredentialDirectory, DirectoryError};

/// Closed vocabulary of group names usable in authorization decisions,
/// validated once at configuration time.
#[derive(Debug, Clone)]
pub struct GroupCatalog {
    names: BTreeSet<String>,
}

impl GroupCatalog {
    /// Build the catalog from the configured vocabulary.
    ///
    /// # Errors
    ///
    /// Returns an error if the vocabulary is empty or a name is not a
    /// non-empty run of `[A-Za-z0-9_-]`.
    pub fn new<I, S>(names: I) -> anyhow::Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let shape = Regex::new(r"^[A-Za-z0-9_-]+$")?;
        let mut validated = BTreeSet::new();
        for name in names {
            let name = name.into();
            if !shape.is_match(&name) {
                anyhow::bail!("invalid group name in vocabulary: {name:?}");
            }
            validated.insert(name);
        }
        if validated.is_empty() {
            anyhow::bail!("group vocabulary must not be empty");
        }
        Ok(Self { names: validated })
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }
}

/// Which membership source a deployment trusts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupBackend {
    Directory,
    Memory,
}

impl fmt::Display for GroupBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Directory => write!(f, "directory"),
            Self::Memory => write!(f, "memory"),
        }
    }
}

impl FromStr for GroupBackend {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "directory" => Ok(Self::Directory),
            "memory" => Ok(Self::Memory),
            other => Err(format!("unknown group backend: {other}")),
        }
    }
}

/// The authoritative membership source consulted on every authorization
/// decision and at every token-issuing point.
#[async_trait]
pub trait GroupStore: Send + Sync {
    async fn groups_for(&self, username: &str) -> Result<Vec<String>, DirectoryError>;

    /// Idempotent: adding a held group is a no-op success.
    async fn add_to_group(&self, username: &str, group: &str) -> Result<(), DirectoryError>;

    /// Idempotent: removing a group not held is a no-op success.
    async fn remove_from_group(&self, username: &str, group: &str)
        -> Result<(), DirectoryError>;
}

/// Delegates every membership question to the external directory.
pub struct DirectoryGroupStore {
    directory: Arc<dyn CredentialDirectory>,
    call_timeout: Duration,
}

impl DirectoryGroupStore {
    #[must_use]
    pub fn new(directory: Arc<dyn CredentialDirectory>, call_timeout: Duration) -> Self {
        Self {
            directory,
            call_timeout,
        }
    }
}

#[async_trait]
impl GroupStore for DirectoryGroupStore {
    async fn groups_for(&self, username: &str) -> Result<Vec<String>, DirectoryError> {
        bounded(self.call_timeout, self.directory.groups_for_user(username)).await
    }

    async fn add_to_group(&self, username: &str, group: &str) -> Result<(), DirectoryError> {
        bounded(
            self.call_timeout,
            self.directory.add_user_to_group(username, group),
        )
        .await
    }

    async fn remove_from_group(
        &self,
        username: &str,
        group: &str,
    ) -> Result<(), DirectoryError> {
        bounded(
            self.call_timeout,
            self.directory.remove_user_from_group(username, group),
        )
        .await
    }
}

/// In-process fallback table for deployments without a directory-backed
/// membership source. The single mutex serializes writes so concurrent
/// add/remove calls for the same principal cannot lose updates.
#[derive(Default)]
pub struct InMemoryGroupStore {
    members: Mutex<HashMap<String, BTreeSet<String>>>,
}

impl InMemoryGroupStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl GroupStore for InMemoryGroupStore {
    async fn groups_for(&self, username: &str) -> Result<Vec<String>, DirectoryError> {
        let members = self.members.lock().await;
        Ok(members
            .get(username)
            .map(|groups| groups.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn add_to_group(&self, username: &str, group: &str) -> Result<(), DirectoryError> {
        let mut members = self.members.lock().await;
        members
            .entry(username.to_string())
            .or_default()
            .insert(group.to_string());
        Ok(())
    }

    async fn remove_from_group(
        &self,
        username: &str,
        group: &str,
    ) -> Result<(), DirectoryError> {
        let mut members = self.members.lock().await;
        if let Some(groups) = members.get_mut(username) {
            groups.remove(group);
            if groups.is_empty() {
                members.remove(username);
            }
        }
        Ok(())
    }
}
