//! Error types for WMPR operations

use thiserror::Error;

/// Result type for WMPR operations
pub type WmprResult<T> = Result<T, WmprError>;

/// Error taxonomy shared by the feed pipeline and the settings page
#[derive(Error, Debug)]
pub enum WmprError {
    #[error("Authentication required")]
    Unauthorized,

    #[error("Invalid JQL query '{query}': {message}")]
    InvalidQuery { query: String, message: String },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Failed to map search result: {0}")]
    Mapping(String),

    #[error("Settings store error: {0}")]
    SettingsStore(String),

    #[error("Search engine error: {0}")]
    SearchEngine(String),

    #[error("Timeout error: operation timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Template error: {0}")]
    Template(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl WmprError {
    /// Create a new invalid query error
    pub fn invalid_query<Q: Into<String>, M: Into<String>>(query: Q, message: M) -> Self {
        Self::InvalidQuery {
            query: query.into(),
            message: message.into(),
        }
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation(message.into())
    }

    /// Create a new not found error
    pub fn not_found<S: Into<String>>(message: S) -> Self {
        Self::NotFound(message.into())
    }

    /// Create a new mapping error
    pub fn mapping<S: Into<String>>(message: S) -> Self {
        Self::Mapping(message.into())
    }

    /// Create a new settings store error
    pub fn settings_store<S: Into<String>>(message: S) -> Self {
        Self::SettingsStore(message.into())
    }

    /// Create a new search engine error
    pub fn search_engine<S: Into<String>>(message: S) -> Self {
        Self::SearchEngine(message.into())
    }

    /// Create a new template error
    pub fn template<S: Into<String>>(message: S) -> Self {
        Self::Template(message.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal(message.into())
    }

    /// Get the error category for monitoring and error responses
    pub fn category(&self) -> &'static str {
        match self {
            WmprError::Unauthorized => "unauthorized",
            WmprError::InvalidQuery { .. } => "invalid_query",
            WmprError::Validation(_) => "validation",
            WmprError::NotFound(_) => "not_found",
            WmprError::Mapping(_) => "mapping",
            WmprError::SettingsStore(_) => "settings_store",
            WmprError::SearchEngine(_) => "search_engine",
            WmprError::Timeout { .. } => "timeout",
            WmprError::Template(_) => "template",
            WmprError::Configuration(_) => "configuration",
            WmprError::Internal(_) => "internal",
            WmprError::Io(_) => "io",
            WmprError::Json(_) => "json",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categories_are_stable() {
        assert_eq!(WmprError::Unauthorized.category(), "unauthorized");
        assert_eq!(
            WmprError::invalid_query("bad", "syntax").category(),
            "invalid_query"
        );
        assert_eq!(WmprError::Timeout { timeout_ms: 10 }.category(), "timeout");
        assert_eq!(WmprError::internal("boom").category(), "internal");
    }

    #[test]
    fn test_invalid_query_message_names_query() {
        let err = WmprError::invalid_query("project = ", "unexpected end");
        assert!(err.to_string().contains("project = "));
        assert!(err.to_string().contains("unexpected end"));
    }
}
