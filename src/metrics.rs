// Prometheus metrics definitions for the Panel Dash backend.

use lazy_static::lazy_static;

use crate::db::GameStatus;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // ── Gauges ───────────────────────────────────────────────────────

    /// 1 while the background poll loop is active.
    pub static ref POLLER_ACTIVE: IntGauge =
        IntGauge::new("panel_dash_poller_active", "Whether the poll loop is active").unwrap();

    /// Status of the current game: 0 none, 1 setup, 2 running, 3 ended.
    pub static ref GAME_STATUS: IntGauge =
        IntGauge::new("panel_dash_game_status", "Status of the current game").unwrap();

    /// Live WebSocket connections.
    pub static ref CONNECTED_WEBSOCKETS: IntGauge =
        IntGauge::new("panel_dash_connected_websockets", "Live WebSocket connections").unwrap();

    // ── Counters ─────────────────────────────────────────────────────

    /// Poll loop passes.
    pub static ref POLLS_TOTAL: IntCounter =
        IntCounter::new("panel_dash_polls_total", "Poll loop passes").unwrap();

    /// Poll loop passes that ended in an error.
    pub static ref POLL_ERRORS_TOTAL: IntCounter =
        IntCounter::new("panel_dash_poll_errors_total", "Poll passes that failed").unwrap();

    /// Feed requests that failed or timed out.
    pub static ref FEED_FAILURES_TOTAL: IntCounter =
        IntCounter::new("panel_dash_feed_failures_total", "Failed feed requests").unwrap();

    /// Well-formed submissions received from the feed.
    pub static ref SUBMISSIONS_FETCHED_TOTAL: IntCounter = IntCounter::new(
        "panel_dash_submissions_fetched_total",
        "Submissions received from the feed",
    )
    .unwrap();

    /// Cells captured, by team id.
    pub static ref CAPTURES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("panel_dash_captures_total", "Cells captured"),
        &["team"],
    )
    .unwrap();

    /// Total API requests, by method/endpoint/status.
    pub static ref API_REQUESTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("panel_dash_api_requests_total", "Total API requests"),
        &["method", "endpoint", "status"],
    )
    .unwrap();

    // ── Histograms ───────────────────────────────────────────────────

    /// Feed request duration in seconds.
    pub static ref FEED_FETCH_DURATION_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "panel_dash_feed_fetch_duration_seconds",
            "Feed request duration in seconds",
        )
        .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
    )
    .unwrap();
}

/// Register all metrics with the custom registry. Call once at startup.
pub fn register_metrics() {
    let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(POLLER_ACTIVE.clone()),
        Box::new(GAME_STATUS.clone()),
        Box::new(CONNECTED_WEBSOCKETS.clone()),
        Box::new(POLLS_TOTAL.clone()),
        Box::new(POLL_ERRORS_TOTAL.clone()),
        Box::new(FEED_FAILURES_TOTAL.clone()),
        Box::new(SUBMISSIONS_FETCHED_TOTAL.clone()),
        Box::new(CAPTURES_TOTAL.clone()),
        Box::new(API_REQUESTS_TOTAL.clone()),
        Box::new(FEED_FETCH_DURATION_SECONDS.clone()),
    ];

    for c in collectors {
        if let Err(e) = REGISTRY.register(c) {
            tracing::warn!("Metric registration skipped: {e}");
        }
    }
}

/// Serialize all registered metrics to the Prometheus text exposition format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {e}");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

fn game_status_value(status: Option<GameStatus>) -> i64 {
    match status {
        None => 0,
        Some(GameStatus::Setup) => 1,
        Some(GameStatus::Running) => 2,
        Some(GameStatus::Ended) => 3,
    }
}

/// Record the status of the current game.
pub fn set_game_status(status: Option<GameStatus>) {
    GAME_STATUS.set(game_status_value(status));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_game_status_values() {
        assert_eq!(game_status_value(None), 0);
        assert_eq!(game_status_value(Some(GameStatus::Setup)), 1);
        assert_eq!(game_status_value(Some(GameStatus::Running)), 2);
        assert_eq!(game_status_value(Some(GameStatus::Ended)), 3);
    }

    #[test]
    fn test_register_twice_and_gather() {
        register_metrics();
        register_metrics();
        POLLS_TOTAL.inc();
        let output = gather_metrics();
        assert!(output.contains("panel_dash_polls_total"));
        assert!(output.contains("panel_dash_game_status"));
    }

    #[test]
    fn test_metric_updates() {
        CONNECTED_WEBSOCKETS.inc();
        CONNECTED_WEBSOCKETS.dec();

        CAPTURES_TOTAL.with_label_values(&["1"]).inc();
        assert!(CAPTURES_TOTAL.with_label_values(&["1"]).get() >= 1);

        FEED_FETCH_DURATION_SECONDS.observe(0.2);
        API_REQUESTS_TOTAL
            .with_label_values(&["GET", "/api/game", "200"])
            .inc();
    }
}
