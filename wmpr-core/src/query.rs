//! Contracts for the host services the feed depends on
//!
//! The search engine and the project directory belong to the host platform.
//! They are modelled as traits so the feed pipeline can be exercised against
//! substitutes (see [`crate::mock_engine`]).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::error::WmprResult;
use crate::feed::RawEntry;

/// Identifier of an authenticated user
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(String);

impl UserId {
    pub fn new<S: Into<String>>(id: S) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A query the engine has accepted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedQuery {
    text: String,
}

impl ValidatedQuery {
    /// Only engines construct validated queries, after parsing succeeded
    pub fn new<S: Into<String>>(text: S) -> Self {
        Self { text: text.into() }
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

/// The host's search engine.
///
/// `parse` reports an invalid query as `WmprError::InvalidQuery`; any other
/// error kind means the engine itself failed.
#[async_trait]
pub trait QueryEngine: Send + Sync {
    /// Parse and validate a query on behalf of `user`
    async fn parse(&self, user: &UserId, text: &str) -> WmprResult<ValidatedQuery>;

    /// Execute a validated query, returning at most `limit` entries from `offset`
    async fn execute(
        &self,
        user: &UserId,
        query: &ValidatedQuery,
        offset: usize,
        limit: usize,
    ) -> WmprResult<Vec<RawEntry>>;
}

/// Lookup of projects known to the host
#[async_trait]
pub trait ProjectDirectory: Send + Sync {
    /// Display name of the project, `None` if no such project exists
    async fn project_name(&self, project_key: &str) -> WmprResult<Option<String>>;
}

/// Project directory backed by a fixed key → name map
#[derive(Debug, Clone, Default)]
pub struct StaticProjectDirectory {
    projects: HashMap<String, String>,
}

impl StaticProjectDirectory {
    pub fn new(projects: HashMap<String, String>) -> Self {
        Self { projects }
    }

    pub fn with_project<K: Into<String>, N: Into<String>>(mut self, key: K, name: N) -> Self {
        self.projects.insert(key.into(), name.into());
        self
    }
}

#[async_trait]
impl ProjectDirectory for StaticProjectDirectory {
    async fn project_name(&self, project_key: &str) -> WmprResult<Option<String>> {
        Ok(self.projects.get(project_key).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_directory_lookup() {
        let directory = StaticProjectDirectory::default().with_project("WMPR", "Web Portal Requests");
        assert_eq!(
            directory.project_name("WMPR").await.unwrap().as_deref(),
            Some("Web Portal Requests")
        );
        assert_eq!(directory.project_name("NOPE").await.unwrap(), None);
    }
}
