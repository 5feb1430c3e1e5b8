//! Request correlation ids and the diagnostics block attached to feed responses

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::resolver::QuerySource;

/// Generates request ids of the form `WMPR-<epoch millis>-<random hex>`.
///
/// The timestamp keeps ids sortable in logs; the random suffix keeps two
/// requests started in the same millisecond apart.
#[derive(Debug, Clone)]
pub struct RequestIdGenerator {
    prefix: String,
}

impl RequestIdGenerator {
    pub fn new<S: Into<String>>(prefix: S) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn next_id(&self, started_at: DateTime<Utc>) -> String {
        let suffix = Uuid::new_v4().simple().to_string();
        format!(
            "{}-{}-{}",
            self.prefix,
            started_at.timestamp_millis(),
            &suffix[..12]
        )
    }
}

impl Default for RequestIdGenerator {
    fn default() -> Self {
        Self::new("WMPR")
    }
}

/// Metadata describing how a feed response was produced
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostics {
    pub request_id: String,
    /// UTC completion time, RFC 3339
    pub timestamp: String,
    /// Wall-clock duration in milliseconds
    pub duration: u64,
    pub user: String,
    /// Query text actually executed
    pub jql: String,
    pub jql_source: QuerySource,
    /// Number of records in the response (skipped entries excluded)
    pub result_count: usize,
    pub version: String,
}
