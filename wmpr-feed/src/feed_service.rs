//! Feed pipeline: resolve the project query, validate it with a single
//! fallback to the default, execute it and shape the results.

use chrono::Utc;
use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use wmpr_core::{
    diagnostics::{Diagnostics, RequestIdGenerator},
    error::{WmprError, WmprResult},
    feed::{FeedRecord, FeedResponse, RawEntry},
    query::{QueryEngine, UserId, ValidatedQuery},
    resolver::{QueryResolver, QuerySource, ResolvedQuery},
    FEED_PAGE_SIZE, VERSION,
};

use crate::metrics::FeedMetricsCollector;

/// A feed request that did not produce records
#[derive(Debug)]
pub struct FeedFailure {
    pub request_id: String,
    pub duration_ms: u64,
    pub error: WmprError,
}

/// Produces the recent-issues feed for a project
pub struct FeedService {
    resolver: QueryResolver,
    engine: Arc<dyn QueryEngine>,
    query_timeout: Duration,
    request_ids: RequestIdGenerator,
    metrics: Arc<FeedMetricsCollector>,
}

impl FeedService {
    pub fn new(
        resolver: QueryResolver,
        engine: Arc<dyn QueryEngine>,
        query_timeout: Duration,
        metrics: Arc<FeedMetricsCollector>,
    ) -> Self {
        Self {
            resolver,
            engine,
            query_timeout,
            request_ids: RequestIdGenerator::default(),
            metrics,
        }
    }

    /// Build the feed for `project_key` on behalf of `user`.
    ///
    /// Every failure, including a panic inside the search engine, comes back
    /// as a [`FeedFailure`] carrying the request id.
    pub async fn get_feed(
        &self,
        project_key: Option<&str>,
        user: Option<&UserId>,
    ) -> Result<FeedResponse, FeedFailure> {
        let start = Instant::now();
        let request_id = self.request_ids.next_id(Utc::now());
        self.metrics.record_request();

        info!(request_id = %request_id, project_key = ?project_key, "Feed requested");

        let user = match user {
            Some(user) => user,
            None => {
                warn!(request_id = %request_id, "Authentication failed - no user");
                return Err(self.fail(request_id, start, WmprError::Unauthorized));
            }
        };

        let pipeline = self.run_pipeline(&request_id, project_key, user);
        let outcome = match AssertUnwindSafe(pipeline).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(panic) => Err(WmprError::internal(format!(
                "feed pipeline panicked: {}",
                panic_message(panic.as_ref())
            ))),
        };

        let (records, resolved) = match outcome {
            Ok(result) => result,
            Err(e) => return Err(self.fail(request_id, start, e)),
        };

        let duration = start.elapsed();
        let diagnostics = Diagnostics {
            request_id,
            timestamp: Utc::now().to_rfc3339(),
            duration: duration.as_millis() as u64,
            user: user.to_string(),
            jql: resolved.text,
            jql_source: resolved.source,
            result_count: records.len(),
            version: VERSION.to_string(),
        };

        self.metrics.record_success(duration, records.len());
        info!(
            request_id = %diagnostics.request_id,
            "Request completed in {}ms with {} records",
            diagnostics.duration,
            diagnostics.result_count
        );

        Ok(FeedResponse {
            data: records,
            diagnostics,
        })
    }

    /// Account for a feed request that was malformed before reaching the
    /// pipeline. A missing user still takes precedence over `error`.
    pub fn reject(&self, user: Option<&UserId>, error: WmprError) -> FeedFailure {
        let start = Instant::now();
        let request_id = self.request_ids.next_id(Utc::now());
        self.metrics.record_request();

        let error = if user.is_some() {
            warn!(request_id = %request_id, "Rejected feed request: {}", error);
            error
        } else {
            warn!(request_id = %request_id, "Authentication failed - no user");
            WmprError::Unauthorized
        };
        self.fail(request_id, start, error)
    }

    async fn run_pipeline(
        &self,
        request_id: &str,
        project_key: Option<&str>,
        user: &UserId,
    ) -> WmprResult<(Vec<FeedRecord>, ResolvedQuery)> {
        let deadline = tokio::time::Instant::now() + self.query_timeout;

        let resolved = self.resolver.resolve(project_key).await;
        info!(
            request_id = %request_id,
            source = %resolved.source,
            "Using JQL: {}",
            resolved.text
        );

        let (query, resolved) = self
            .validate_with_fallback(request_id, user, resolved, deadline)
            .await?;

        debug!(request_id = %request_id, "Executing search with limit {}", FEED_PAGE_SIZE);
        let entries = self
            .bounded(deadline, self.engine.execute(user, &query, 0, FEED_PAGE_SIZE))
            .await?;
        info!(request_id = %request_id, "Found {} issues", entries.len());

        let records = self.map_entries(request_id, &entries);
        Ok((records, resolved))
    }

    /// Parse the resolved query; if the engine rejects it, retry exactly once
    /// with the default query.
    async fn validate_with_fallback(
        &self,
        request_id: &str,
        user: &UserId,
        resolved: ResolvedQuery,
        deadline: tokio::time::Instant,
    ) -> WmprResult<(ValidatedQuery, ResolvedQuery)> {
        match self
            .bounded(deadline, self.engine.parse(user, &resolved.text))
            .await
        {
            Ok(query) => return Ok((query, resolved)),
            Err(WmprError::InvalidQuery { message, .. }) => {
                warn!(
                    request_id = %request_id,
                    "Configured JQL invalid ({}), trying fallback",
                    message
                );
            }
            Err(e) => return Err(e),
        }

        let fallback = self.resolver.default_query(QuerySource::FallbackDefault);
        self.metrics.record_fallback();
        info!(request_id = %request_id, "Fallback JQL: {}", fallback.text);

        match self
            .bounded(deadline, self.engine.parse(user, &fallback.text))
            .await
        {
            Ok(query) => Ok((query, fallback)),
            Err(WmprError::InvalidQuery { message, .. }) => {
                warn!(request_id = %request_id, "Both JQL queries invalid");
                Err(WmprError::invalid_query(fallback.text, message))
            }
            Err(e) => Err(e),
        }
    }

    /// Map raw entries to records, dropping the ones that fail
    fn map_entries(&self, request_id: &str, entries: &[RawEntry]) -> Vec<FeedRecord> {
        let mut records = Vec::with_capacity(entries.len());
        for entry in entries {
            match FeedRecord::from_raw(entry) {
                Ok(record) => records.push(record),
                Err(e) => {
                    warn!(
                        request_id = %request_id,
                        "Error processing issue {}: {}",
                        entry.key_hint(),
                        e
                    );
                    self.metrics.record_skipped_record();
                }
            }
        }
        records
    }

    async fn bounded<T, F>(&self, deadline: tokio::time::Instant, operation: F) -> WmprResult<T>
    where
        F: Future<Output = WmprResult<T>>,
    {
        tokio::time::timeout_at(deadline, operation)
            .await
            .map_err(|_| WmprError::Timeout {
                timeout_ms: self.query_timeout.as_millis() as u64,
            })?
    }

    fn fail(&self, request_id: String, start: Instant, error: WmprError) -> FeedFailure {
        let duration = start.elapsed();
        self.metrics.record_failure(error.category(), duration);

        match error {
            WmprError::Unauthorized
            | WmprError::InvalidQuery { .. }
            | WmprError::Validation(_) => {}
            _ => error!(
                request_id = %request_id,
                error_type = error.category(),
                "ERROR after {}ms: {}",
                duration.as_millis(),
                error
            ),
        }

        FeedFailure {
            request_id,
            duration_ms: duration.as_millis() as u64,
            error,
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wmpr_core::{
        mock_engine::MockQueryEngine, MemorySettingsStore, QueryDefaults, SettingValue,
        DEFAULT_QUERY,
    };

    const CUSTOM_JQL: &str = "project = ABC AND status != Done ORDER BY created DESC";

    fn entry(key: &str) -> RawEntry {
        RawEntry::new(json!({
            "key": key,
            "fields": {
                "summary": format!("Summary of {}", key),
                "reporter": {"displayName": "Ada"},
                "created": "2024-01-01T00:00:00.000+0000",
                "status": {"name": "Open", "statusCategory": {"key": "new"}}
            }
        }))
    }

    fn custom_store() -> Arc<MemorySettingsStore> {
        Arc::new(MemorySettingsStore::with_values([
            ("wmpr.settings.ABC.useCustom", SettingValue::flag(true)),
            ("wmpr.settings.ABC.jql", SettingValue::Text(CUSTOM_JQL.to_string())),
        ]))
    }

    fn service(store: Arc<MemorySettingsStore>, engine: Arc<MockQueryEngine>) -> FeedService {
        let resolver = QueryResolver::new(store, Arc::new(QueryDefaults::default()));
        FeedService::new(
            resolver,
            engine,
            Duration::from_millis(500),
            Arc::new(FeedMetricsCollector::new()),
        )
    }

    fn alice() -> UserId {
        UserId::new("alice")
    }

    #[tokio::test]
    async fn test_missing_user_is_unauthorized_without_engine_calls() {
        let engine = Arc::new(MockQueryEngine::new());
        let service = service(custom_store(), engine.clone());

        let failure = service.get_feed(Some("ABC"), None).await.unwrap_err();
        assert!(matches!(failure.error, WmprError::Unauthorized));
        assert!(failure.request_id.starts_with("WMPR-"));
        assert_eq!(engine.parse_calls(), 0);
        assert_eq!(engine.execute_calls(), 0);
    }

    #[test]
    fn test_rejected_request_gets_request_id() {
        let engine = Arc::new(MockQueryEngine::new());
        let service = service(custom_store(), engine.clone());

        let failure = service.reject(Some(&alice()), WmprError::validation("bad query string"));
        assert!(matches!(failure.error, WmprError::Validation(_)));
        assert!(failure.request_id.starts_with("WMPR-"));

        let failure = service.reject(None, WmprError::validation("bad query string"));
        assert!(matches!(failure.error, WmprError::Unauthorized));
        assert_eq!(engine.parse_calls(), 0);
    }

    #[tokio::test]
    async fn test_custom_query_is_executed_with_fixed_window() {
        let engine = Arc::new(MockQueryEngine::new().with_entries(vec![entry("ABC-1")]));
        let service = service(custom_store(), engine.clone());

        let response = service.get_feed(Some("ABC"), Some(&alice())).await.unwrap();
        assert_eq!(response.diagnostics.jql, CUSTOM_JQL);
        assert_eq!(response.diagnostics.jql_source, QuerySource::ProjectCustom);
        assert_eq!(response.diagnostics.user, "alice");
        assert_eq!(engine.last_window(), Some((0, 10)));
    }

    #[tokio::test]
    async fn test_invalid_custom_query_falls_back_to_default() {
        let engine = Arc::new(
            MockQueryEngine::new()
                .with_invalid_query(CUSTOM_JQL)
                .with_entries(vec![entry("WMPR-1")]),
        );
        let service = service(custom_store(), engine.clone());

        let response = service.get_feed(Some("ABC"), Some(&alice())).await.unwrap();
        assert_eq!(response.diagnostics.jql, DEFAULT_QUERY);
        assert_eq!(response.diagnostics.jql_source, QuerySource::FallbackDefault);
        assert_eq!(response.data.len(), 1);
        assert_eq!(engine.parsed_queries(), vec![CUSTOM_JQL, DEFAULT_QUERY]);
        assert_eq!(engine.execute_calls(), 1);
    }

    #[tokio::test]
    async fn test_both_queries_invalid_is_invalid_query() {
        let engine = Arc::new(MockQueryEngine::new().rejecting_all());
        let service = service(custom_store(), engine.clone());

        let failure = service
            .get_feed(Some("ABC"), Some(&alice()))
            .await
            .unwrap_err();
        match failure.error {
            WmprError::InvalidQuery { ref query, .. } => assert_eq!(query, DEFAULT_QUERY),
            ref other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(engine.parse_calls(), 2);
        assert_eq!(engine.execute_calls(), 0);
    }

    #[tokio::test]
    async fn test_invalid_default_retries_exactly_once() {
        let engine = Arc::new(MockQueryEngine::new().with_invalid_query(DEFAULT_QUERY));
        let service = service(Arc::new(MemorySettingsStore::new()), engine.clone());

        let failure = service.get_feed(None, Some(&alice())).await.unwrap_err();
        assert_eq!(failure.error.category(), "invalid_query");
        assert_eq!(engine.parse_calls(), 2);
    }

    #[tokio::test]
    async fn test_malformed_entry_is_skipped() {
        let engine = Arc::new(MockQueryEngine::new().with_entries(vec![
            entry("WMPR-1"),
            RawEntry::new(json!({"key": "WMPR-2", "fields": {"status": 42}})),
            entry("WMPR-3"),
            RawEntry::new(json!({"fields": {"summary": "no key"}})),
        ]));
        let metrics = Arc::new(FeedMetricsCollector::new());
        let resolver = QueryResolver::new(
            Arc::new(MemorySettingsStore::new()),
            Arc::new(QueryDefaults::default()),
        );
        let service = FeedService::new(resolver, engine, Duration::from_secs(1), metrics.clone());

        let response = service.get_feed(None, Some(&alice())).await.unwrap();
        let keys: Vec<&str> = response.data.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(keys, vec!["WMPR-1", "WMPR-3"]);
        assert_eq!(response.diagnostics.result_count, response.data.len());
        assert_eq!(metrics.snapshot().skipped_records_total, 2);
    }

    #[tokio::test]
    async fn test_null_status_entry_is_kept() {
        let engine = Arc::new(MockQueryEngine::new().with_entries(vec![
            entry("WMPR-1"),
            RawEntry::new(json!({"key": "WMPR-2", "fields": {"summary": "s", "status": null}})),
        ]));
        let service = service(Arc::new(MemorySettingsStore::new()), engine);

        let response = service.get_feed(None, Some(&alice())).await.unwrap();
        assert_eq!(response.data.len(), 2);
        assert_eq!(response.data[1].status, "Unknown");
        assert_eq!(response.diagnostics.result_count, 2);
    }

    #[tokio::test]
    async fn test_engine_error_becomes_internal_failure() {
        let engine = Arc::new(MockQueryEngine::new().with_execute_error("index offline"));
        let service = service(Arc::new(MemorySettingsStore::new()), engine);

        let failure = service.get_feed(None, Some(&alice())).await.unwrap_err();
        assert_eq!(failure.error.category(), "search_engine");
        assert!(failure.request_id.starts_with("WMPR-"));
    }

    #[tokio::test]
    async fn test_engine_panic_is_contained() {
        let engine = Arc::new(MockQueryEngine::new().panicking());
        let service = service(Arc::new(MemorySettingsStore::new()), engine);

        let failure = service.get_feed(None, Some(&alice())).await.unwrap_err();
        assert_eq!(failure.error.category(), "internal");
        assert!(failure.error.to_string().contains("panicked"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_engine_times_out() {
        let engine = Arc::new(
            MockQueryEngine::new()
                .with_entries(vec![entry("WMPR-1")])
                .with_execute_delay(Duration::from_secs(60)),
        );
        let service = service(Arc::new(MemorySettingsStore::new()), engine);

        let failure = service.get_feed(None, Some(&alice())).await.unwrap_err();
        assert!(matches!(failure.error, WmprError::Timeout { timeout_ms: 500 }));
    }

    #[tokio::test]
    async fn test_unreadable_settings_still_serve_default_feed() {
        let store = custom_store();
        store.set_failing(true);
        let engine = Arc::new(MockQueryEngine::new().with_entries(vec![entry("WMPR-1")]));
        let service = service(store, engine);

        let response = service.get_feed(Some("ABC"), Some(&alice())).await.unwrap();
        assert_eq!(response.diagnostics.jql, DEFAULT_QUERY);
        assert_eq!(response.diagnostics.jql_source, QuerySource::ConfiguredDefault);
    }

    #[tokio::test]
    async fn test_request_ids_differ_between_requests() {
        let engine = Arc::new(MockQueryEngine::new());
        let service = service(Arc::new(MemorySettingsStore::new()), engine);

        let first = service.get_feed(None, Some(&alice())).await.unwrap();
        let second = service.get_feed(None, Some(&alice())).await.unwrap();
        assert_ne!(first.diagnostics.request_id, second.diagnostics.request_id);
    }
}
