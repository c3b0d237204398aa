// Judge submission feed (AtCoder Problems API).
//
// A fetch never fails: network errors, timeouts, bad statuses and undecodable
// bodies are logged and turned into an empty batch.

use std::future::Future;
use std::time::{Duration, Instant};

use serde::Deserialize;
use serde_json::Value;

use crate::error::FeedError;
use crate::metrics;

/// One judge submission, as consumed by the capture resolver.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Submission {
    /// Judge-side submission id, used only to break timestamp ties.
    #[serde(default)]
    pub id: Option<i64>,
    pub user_id: String,
    pub problem_id: String,
    pub result: String,
    pub epoch_second: i64,
}

/// Source of judge submissions.
pub trait SubmissionFeed: Send + Sync + 'static {
    /// All submissions made at or after `since` (epoch seconds). Failures
    /// yield an empty list.
    fn fetch(&self, since: i64) -> impl Future<Output = Vec<Submission>> + Send;
}

/// Decode a raw feed batch, dropping records with missing or malformed
/// fields instead of rejecting the whole batch.
pub fn parse_submissions(records: Vec<Value>) -> Vec<Submission> {
    let total = records.len();
    let parsed: Vec<Submission> = records
        .into_iter()
        .filter_map(|record| serde_json::from_value(record).ok())
        .collect();
    if parsed.len() < total {
        tracing::debug!("Dropped {} malformed submissions", total - parsed.len());
    }
    parsed
}

/// HTTP client for the AtCoder Problems `/from/{second}` endpoint.
#[derive(Debug, Clone)]
pub struct AtCoderProblemsFeed {
    client: reqwest::Client,
    base_url: String,
}

impl AtCoderProblemsFeed {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("panel-dash/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn try_fetch(&self, since: i64) -> Result<Vec<Submission>, FeedError> {
        let url = format!("{}/from/{}", self.base_url, since);
        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(FeedError::Status(response.status()));
        }
        let records: Vec<Value> = response.json().await?;
        Ok(parse_submissions(records))
    }
}

impl SubmissionFeed for AtCoderProblemsFeed {
    async fn fetch(&self, since: i64) -> Vec<Submission> {
        let started = Instant::now();
        let result = self.try_fetch(since).await;
        metrics::FEED_FETCH_DURATION_SECONDS.observe(started.elapsed().as_secs_f64());

        match result {
            Ok(submissions) => {
                metrics::SUBMISSIONS_FETCHED_TOTAL.inc_by(submissions.len() as u64);
                submissions
            }
            Err(e) => {
                tracing::warn!("Submission feed error: {e}");
                metrics::FEED_FAILURES_TOTAL.inc();
                Vec::new()
            }
        }
    }
}
