//! Metrics collection and reporting for the feed service

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Thread-safe metrics collector for the feed service
#[derive(Debug)]
pub struct FeedMetricsCollector {
    /// Feed requests received
    pub requests_total: AtomicU64,

    /// Feed requests answered with records
    pub successes_total: AtomicU64,

    /// Requests rejected for lack of an authenticated user
    pub unauthorized_total: AtomicU64,

    /// Requests where both the resolved and the default query were invalid
    pub invalid_query_total: AtomicU64,

    /// Requests that timed out in the search engine
    pub timeouts_total: AtomicU64,

    /// Requests that failed for any other reason
    pub internal_errors_total: AtomicU64,

    /// Requests that fell back to the default query
    pub fallbacks_total: AtomicU64,

    /// Search entries dropped because they could not be mapped
    pub skipped_records_total: AtomicU64,

    /// Records returned
    pub records_returned_total: AtomicU64,

    /// Total feed processing time
    pub request_time_total_ms: AtomicU64,

    /// Settings saves
    pub settings_saves_total: AtomicU64,

    /// Service start time
    start_time: Instant,
}

impl Default for FeedMetricsCollector {
    fn default() -> Self {
        Self {
            requests_total: AtomicU64::new(0),
            successes_total: AtomicU64::new(0),
            unauthorized_total: AtomicU64::new(0),
            invalid_query_total: AtomicU64::new(0),
            timeouts_total: AtomicU64::new(0),
            internal_errors_total: AtomicU64::new(0),
            fallbacks_total: AtomicU64::new(0),
            skipped_records_total: AtomicU64::new(0),
            records_returned_total: AtomicU64::new(0),
            request_time_total_ms: AtomicU64::new(0),
            settings_saves_total: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }
}

impl FeedMetricsCollector {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_request(&self) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a successful feed response
    pub fn record_success(&self, duration: Duration, records: usize) {
        self.successes_total.fetch_add(1, Ordering::Relaxed);
        self.records_returned_total
            .fetch_add(records as u64, Ordering::Relaxed);
        self.request_time_total_ms
            .fetch_add(duration.as_millis() as u64, Ordering::Relaxed);
    }

    /// Record a failed feed request by error category
    pub fn record_failure(&self, category: &str, duration: Duration) {
        let counter = match category {
            "unauthorized" => &self.unauthorized_total,
            "invalid_query" => &self.invalid_query_total,
            "timeout" => &self.timeouts_total,
            _ => &self.internal_errors_total,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        self.request_time_total_ms
            .fetch_add(duration.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn record_fallback(&self) {
        self.fallbacks_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_skipped_record(&self) {
        self.skipped_records_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_settings_save(&self) {
        self.settings_saves_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current metrics snapshot
    pub fn snapshot(&self) -> FeedMetricsSnapshot {
        let requests = self.requests_total.load(Ordering::Relaxed);
        let total_time = self.request_time_total_ms.load(Ordering::Relaxed);

        FeedMetricsSnapshot {
            requests_total: requests,
            successes_total: self.successes_total.load(Ordering::Relaxed),
            unauthorized_total: self.unauthorized_total.load(Ordering::Relaxed),
            invalid_query_total: self.invalid_query_total.load(Ordering::Relaxed),
            timeouts_total: self.timeouts_total.load(Ordering::Relaxed),
            internal_errors_total: self.internal_errors_total.load(Ordering::Relaxed),
            fallbacks_total: self.fallbacks_total.load(Ordering::Relaxed),
            skipped_records_total: self.skipped_records_total.load(Ordering::Relaxed),
            records_returned_total: self.records_returned_total.load(Ordering::Relaxed),
            settings_saves_total: self.settings_saves_total.load(Ordering::Relaxed),
            uptime_seconds: self.start_time.elapsed().as_secs(),
            avg_request_time_ms: if requests > 0 {
                total_time as f64 / requests as f64
            } else {
                0.0
            },
        }
    }
}

/// Point-in-time view of the feed metrics
#[derive(Debug, Clone, serde::Serialize)]
pub struct FeedMetricsSnapshot {
    pub requests_total: u64,
    pub successes_total: u64,
    pub unauthorized_total: u64,
    pub invalid_query_total: u64,
    pub timeouts_total: u64,
    pub internal_errors_total: u64,
    pub fallbacks_total: u64,
    pub skipped_records_total: u64,
    pub records_returned_total: u64,
    pub settings_saves_total: u64,
    pub uptime_seconds: u64,
    pub avg_request_time_ms: f64,
}

impl FeedMetricsSnapshot {
    /// Render in the Prometheus text exposition format
    pub fn to_prometheus(&self) -> String {
        let counters = [
            ("wmpr_feed_requests_total", "Feed requests received", self.requests_total),
            ("wmpr_feed_successes_total", "Feed requests answered with records", self.successes_total),
            ("wmpr_feed_unauthorized_total", "Feed requests without an authenticated user", self.unauthorized_total),
            ("wmpr_feed_invalid_query_total", "Feed requests where no query was valid", self.invalid_query_total),
            ("wmpr_feed_timeouts_total", "Feed requests that timed out", self.timeouts_total),
            ("wmpr_feed_internal_errors_total", "Feed requests that failed internally", self.internal_errors_total),
            ("wmpr_feed_fallbacks_total", "Feed requests that fell back to the default query", self.fallbacks_total),
            ("wmpr_feed_skipped_records_total", "Search entries dropped during mapping", self.skipped_records_total),
            ("wmpr_feed_records_returned_total", "Records returned by the feed", self.records_returned_total),
            ("wmpr_settings_saves_total", "Settings saves", self.settings_saves_total),
        ];

        let mut out = String::new();
        for (name, help, value) in counters {
            out.push_str(&format!(
                "# HELP {name} {help}\n# TYPE {name} counter\n{name} {value}\n"
            ));
        }
        out.push_str(&format!(
            "# HELP wmpr_feed_avg_request_time_ms Average feed processing time in milliseconds\n\
             # TYPE wmpr_feed_avg_request_time_ms gauge\n\
             wmpr_feed_avg_request_time_ms {}\n",
            self.avg_request_time_ms
        ));
        out.push_str(&format!(
            "# HELP wmpr_uptime_seconds Seconds since the service started\n\
             # TYPE wmpr_uptime_seconds gauge\n\
             wmpr_uptime_seconds {}\n",
            self.uptime_seconds
        ));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failures_are_counted_by_category() {
        let metrics = FeedMetricsCollector::new();
        metrics.record_failure("unauthorized", Duration::from_millis(1));
        metrics.record_failure("timeout", Duration::from_millis(1));
        metrics.record_failure("search_engine", Duration::from_millis(1));

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.unauthorized_total, 1);
        assert_eq!(snapshot.timeouts_total, 1);
        assert_eq!(snapshot.internal_errors_total, 1);
    }

    #[test]
    fn test_prometheus_output() {
        let metrics = FeedMetricsCollector::new();
        metrics.record_request();
        metrics.record_success(Duration::from_millis(20), 4);

        let text = metrics.snapshot().to_prometheus();
        assert!(text.contains("# TYPE wmpr_feed_requests_total counter"));
        assert!(text.contains("wmpr_feed_records_returned_total 4"));
        assert!(text.contains("wmpr_feed_avg_request_time_ms 20"));
    }
}
