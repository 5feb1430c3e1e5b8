//! Mock search engine for unit testing and local runs
//!
//! This engine keeps a fixed list of entries in memory and accepts every
//! query except the ones it has been told to reject. It records the calls it
//! receives so tests can assert on how the feed pipeline drove it.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{WmprError, WmprResult};
use crate::feed::RawEntry;
use crate::query::{QueryEngine, UserId, ValidatedQuery};

/// Mock search engine for unit testing
#[derive(Default)]
pub struct MockQueryEngine {
    entries: Vec<RawEntry>,
    invalid_queries: HashSet<String>,
    reject_all: bool,
    execute_error: Option<String>,
    execute_delay: Option<Duration>,
    panic_on_execute: AtomicBool,
    stats: MockEngineStats,
    parsed: Mutex<Vec<String>>,
    last_window: Mutex<Option<(usize, usize)>>,
}

#[derive(Default)]
struct MockEngineStats {
    parse_calls: AtomicU64,
    execute_calls: AtomicU64,
}

impl MockQueryEngine {
    /// Create an engine with no entries that accepts every query
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an engine seeded with a handful of sample issues
    pub fn with_sample_data() -> Self {
        info!("Creating a mock search engine with sample issues");

        let entries = [
            ("WMPR-3", "VPN drops every hour", "Grace Hopper", "In Progress", "indeterminate"),
            ("WMPR-2", "Request access to billing portal", "Alan Turing", "Waiting for support", "new"),
            ("WMPR-1", "Replace laptop battery", "Ada Lovelace", "Done", "done"),
        ]
        .iter()
        .enumerate()
        .map(|(i, (key, summary, reporter, status, category))| {
            RawEntry::new(json!({
                "key": key,
                "fields": {
                    "summary": summary,
                    "reporter": {"displayName": reporter},
                    "created": format!("2024-05-0{}T09:00:00.000+0000", 3 - i),
                    "status": {"name": status, "statusCategory": {"key": category}}
                }
            }))
        })
        .collect();

        Self::new().with_entries(entries)
    }

    pub fn with_entries(mut self, entries: Vec<RawEntry>) -> Self {
        self.entries = entries;
        self
    }

    /// Reject `text` as an invalid query
    pub fn with_invalid_query<S: Into<String>>(mut self, text: S) -> Self {
        self.invalid_queries.insert(text.into());
        self
    }

    /// Reject every query
    pub fn rejecting_all(mut self) -> Self {
        self.reject_all = true;
        self
    }

    /// Fail every execution with a search engine error
    pub fn with_execute_error<S: Into<String>>(mut self, message: S) -> Self {
        self.execute_error = Some(message.into());
        self
    }

    /// Sleep before returning results
    pub fn with_execute_delay(mut self, delay: Duration) -> Self {
        self.execute_delay = Some(delay);
        self
    }

    /// Panic inside `execute`
    pub fn panicking(self) -> Self {
        self.panic_on_execute.store(true, Ordering::SeqCst);
        self
    }

    pub fn parse_calls(&self) -> u64 {
        self.stats.parse_calls.load(Ordering::SeqCst)
    }

    pub fn execute_calls(&self) -> u64 {
        self.stats.execute_calls.load(Ordering::SeqCst)
    }

    /// Query texts passed to `parse`, in call order
    pub fn parsed_queries(&self) -> Vec<String> {
        self.parsed.lock().clone()
    }

    /// `(offset, limit)` of the most recent execution
    pub fn last_window(&self) -> Option<(usize, usize)> {
        *self.last_window.lock()
    }
}

#[async_trait]
impl QueryEngine for MockQueryEngine {
    async fn parse(&self, user: &UserId, text: &str) -> WmprResult<ValidatedQuery> {
        self.stats.parse_calls.fetch_add(1, Ordering::SeqCst);
        self.parsed.lock().push(text.to_string());
        debug!("Mock parse for {}: {}", user, text);

        if self.reject_all || text.trim().is_empty() || self.invalid_queries.contains(text) {
            return Err(WmprError::invalid_query(text, "rejected by mock engine"));
        }
        Ok(ValidatedQuery::new(text))
    }

    async fn execute(
        &self,
        user: &UserId,
        query: &ValidatedQuery,
        offset: usize,
        limit: usize,
    ) -> WmprResult<Vec<RawEntry>> {
        self.stats.execute_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_window.lock() = Some((offset, limit));
        debug!("Mock execute for {}: {} [{}..+{}]", user, query.text(), offset, limit);

        if let Some(delay) = self.execute_delay {
            tokio::time::sleep(delay).await;
        }
        if self.panic_on_execute.load(Ordering::SeqCst) {
            panic!("mock engine panicked while executing {}", query.text());
        }
        if let Some(ref message) = self.execute_error {
            return Err(WmprError::search_engine(message.clone()));
        }

        Ok(self
            .entries
            .iter()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }
}
