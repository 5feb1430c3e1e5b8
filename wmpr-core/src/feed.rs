//! Feed display model and the mapping from raw search results

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::diagnostics::Diagnostics;
use crate::error::{WmprError, WmprResult};

/// Reporter shown when an issue has none
pub const UNKNOWN_REPORTER: &str = "Unknown";

/// Status shown when an issue has none
pub const UNKNOWN_STATUS: &str = "Unknown";

/// Status category key used when the status has no category
pub const UNKNOWN_STATUS_CATEGORY: &str = "unknown";

/// One search result entry as returned by the engine.
///
/// Entries follow the host's issue document layout (`key` plus a `fields`
/// object) and are only interpreted when mapped, so that one malformed entry
/// cannot poison the whole result set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawEntry(Value);

impl RawEntry {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// Issue key if present, for log messages about entries that fail to map
    pub fn key_hint(&self) -> &str {
        self.0
            .get("key")
            .and_then(Value::as_str)
            .unwrap_or("<no key>")
    }
}

impl From<Value> for RawEntry {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

#[derive(Deserialize)]
struct IssueView {
    key: Option<String>,
    #[serde(default)]
    fields: Option<FieldsView>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct FieldsView {
    summary: Option<String>,
    reporter: Option<UserView>,
    created: Option<String>,
    status: Option<StatusView>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserView {
    display_name: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatusView {
    name: Option<String>,
    status_category: Option<StatusCategoryView>,
}

#[derive(Deserialize)]
struct StatusCategoryView {
    key: Option<String>,
}

/// An issue as shown in the feed widget
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedRecord {
    pub key: String,
    pub summary: String,
    pub reporter: String,
    pub created: String,
    pub status: String,
    pub status_category: String,
}

impl FeedRecord {
    /// Build a record from a raw entry, substituting placeholders for
    /// missing optional fields.
    ///
    /// Fails when the entry has no key or a field has an unexpected shape.
    pub fn from_raw(entry: &RawEntry) -> WmprResult<Self> {
        let issue: IssueView = serde_json::from_value(entry.0.clone())
            .map_err(|e| WmprError::mapping(format!("{}: {}", entry.key_hint(), e)))?;

        let key = issue
            .key
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| WmprError::mapping("entry has no issue key"))?;

        let fields = issue.fields.unwrap_or_default();

        let reporter = fields
            .reporter
            .and_then(|user| user.display_name)
            .unwrap_or_else(|| UNKNOWN_REPORTER.to_string());

        let (status, status_category) = match fields.status {
            Some(status) => (
                status.name.unwrap_or_else(|| UNKNOWN_STATUS.to_string()),
                status
                    .status_category
                    .and_then(|category| category.key)
                    .unwrap_or_else(|| UNKNOWN_STATUS_CATEGORY.to_string()),
            ),
            None => (
                UNKNOWN_STATUS.to_string(),
                UNKNOWN_STATUS_CATEGORY.to_string(),
            ),
        };

        Ok(Self {
            key,
            summary: fields.summary.unwrap_or_default(),
            reporter,
            created: fields.created.unwrap_or_default(),
            status,
            status_category,
        })
    }
}

/// Successful feed payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedResponse {
    pub data: Vec<FeedRecord>,
    pub diagnostics: Diagnostics,
}
