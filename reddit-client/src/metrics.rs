use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, SystemTime};
use tokio::sync::RwLock;
use tracing::info;

/// Why a request did not produce a usable response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Network,
    ClientError,
    ServerError,
}

impl FailureKind {
    pub fn from_status(status: u16) -> Self {
        if status >= 500 {
            FailureKind::ServerError
        } else {
            FailureKind::ClientError
        }
    }
}

/// One finished request against a route label such as `/comments/{id}`.
#[derive(Debug, Clone)]
pub struct RequestRecord {
    pub route: String,
    pub elapsed: Duration,
    pub failure: Option<FailureKind>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RouteStats {
    pub requests: u64,
    pub failures: u64,
    pub total_time: Duration,
    pub slowest: Duration,
    pub failures_by_kind: HashMap<FailureKind, u64>,
}

impl RouteStats {
    fn add(&mut self, record: &RequestRecord) {
        self.requests += 1;
        self.total_time += record.elapsed;
        self.slowest = self.slowest.max(record.elapsed);
        if let Some(kind) = record.failure {
            self.failures += 1;
            *self.failures_by_kind.entry(kind).or_default() += 1;
        }
    }

    pub fn mean_time(&self) -> Duration {
        mean(self.total_time, self.requests)
    }
}

/// Snapshot of everything a client has sent so far.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ApiMetrics {
    pub requests: u64,
    pub failures: u64,
    pub total_time: Duration,
    pub last_request_at: Option<SystemTime>,
    pub routes: BTreeMap<String, RouteStats>,
}

impl ApiMetrics {
    pub fn succeeded(&self) -> u64 {
        self.requests - self.failures
    }

    pub fn mean_time(&self) -> Duration {
        mean(self.total_time, self.requests)
    }
}

fn mean(total: Duration, count: u64) -> Duration {
    match u32::try_from(count) {
        Ok(0) => Duration::ZERO,
        Ok(n) => total / n,
        Err(_) => Duration::from_secs_f64(total.as_secs_f64() / count as f64),
    }
}

#[derive(Debug, Default)]
pub struct MetricsCollector {
    metrics: RwLock<ApiMetrics>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record(&self, record: RequestRecord) {
        let mut metrics = self.metrics.write().await;
        metrics.requests += 1;
        metrics.total_time += record.elapsed;
        metrics.last_request_at = Some(SystemTime::now());
        if record.failure.is_some() {
            metrics.failures += 1;
        }
        metrics
            .routes
            .entry(record.route.clone())
            .or_default()
            .add(&record);
    }

    pub async fn snapshot(&self) -> ApiMetrics {
        self.metrics.read().await.clone()
    }

    /// One `info` line for the totals, then one per route.
    pub async fn log_summary(&self) {
        let metrics = self.metrics.read().await;
        info!(
            total = metrics.requests,
            succeeded = metrics.succeeded(),
            failed = metrics.failures,
            avg_ms = metrics.mean_time().as_millis() as u64,
            "Reddit API usage"
        );
        for (route, stats) in &metrics.routes {
            info!(
                route = %route,
                requests = stats.requests,
                errors = stats.failures,
                avg_ms = stats.mean_time().as_millis() as u64,
                slowest_ms = stats.slowest.as_millis() as u64,
                "Reddit API route usage"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(route: &str, millis: u64, status: u16) -> RequestRecord {
        RequestRecord {
            route: route.to_string(),
            elapsed: Duration::from_millis(millis),
            failure: (status >= 400).then(|| FailureKind::from_status(status)),
        }
    }

    #[tokio::test]
    async fn test_totals() {
        let collector = MetricsCollector::new();
        collector.record(record("/r/{subreddit}/new", 150, 200)).await;

        let metrics = collector.snapshot().await;
        assert_eq!(metrics.requests, 1);
        assert_eq!(metrics.succeeded(), 1);
        assert_eq!(metrics.failures, 0);
        assert_eq!(metrics.mean_time(), Duration::from_millis(150));
        assert!(metrics.last_request_at.is_some());
    }

    #[tokio::test]
    async fn test_route_stats() {
        let collector = MetricsCollector::new();
        collector.record(record("/comments/{id}", 100, 200)).await;
        collector.record(record("/comments/{id}", 300, 503)).await;
        collector.record(record("/api/morechildren", 50, 404)).await;

        let metrics = collector.snapshot().await;
        assert_eq!(metrics.failures, 2);

        let comments = &metrics.routes["/comments/{id}"];
        assert_eq!(comments.requests, 2);
        assert_eq!(comments.failures, 1);
        assert_eq!(comments.mean_time(), Duration::from_millis(200));
        assert_eq!(comments.slowest, Duration::from_millis(300));
        assert_eq!(
            comments.failures_by_kind.get(&FailureKind::ServerError),
            Some(&1)
        );

        let more = &metrics.routes["/api/morechildren"];
        assert_eq!(
            more.failures_by_kind.get(&FailureKind::ClientError),
            Some(&1)
        );

        collector.log_summary().await;
    }

    #[test]
    fn test_empty_mean_is_zero() {
        assert_eq!(ApiMetrics::default().mean_time(), Duration::ZERO);
    }
}
