use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, StatusCode};
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::analytics::stats::SubmissionStats;
use crate::crpt::document::Document;
use crate::error::Result;
use crate::http::rate_limiter::{Permit, RateLimiter};
use crate::transport::{HttpRequest, HttpTransport};

/// What happened to one submission. Every failure is already logged by the
/// time this is returned; callers are free to ignore it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionOutcome {
    /// HTTP 200; `body` is the response with each line trimmed.
    Accepted { body: String },
    /// The API answered with anything other than 200.
    Rejected { status: StatusCode },
    /// No answer: permit wait, serialization, or transport failed.
    Failed { reason: String },
}

impl SubmissionOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, SubmissionOutcome::Accepted { .. })
    }
}

/// Sends documents to the registration API, at most as fast as the shared
/// [`RateLimiter`] allows.
pub struct DocumentSubmitter {
    limiter: RateLimiter,
    transport: Arc<dyn HttpTransport>,
    api_url: String,
    acquire_timeout: Option<Duration>,
    stats: Arc<SubmissionStats>,
}

impl DocumentSubmitter {
    pub fn new(
        limiter: RateLimiter,
        transport: Arc<dyn HttpTransport>,
        api_url: impl Into<String>,
    ) -> Self {
        Self {
            limiter,
            transport,
            api_url: api_url.into(),
            acquire_timeout: None,
            stats: Arc::new(SubmissionStats::new()),
        }
    }

    /// Give up on a submission that cannot get a permit within `timeout`.
    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = Some(timeout);
        self
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn stats(&self) -> &Arc<SubmissionStats> {
        &self.stats
    }

    /// Waits for a permit, POSTs `document`, and logs the result.
    ///
    /// Never returns an error. The permit is released on every path,
    /// including serialization and transport failures.
    pub async fn submit(&self, document: &Document, token: &str) -> SubmissionOutcome {
        let submission_id = Uuid::new_v4();
        let start = Instant::now();

        let outcome = match self.try_submit(submission_id, document, token).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(%submission_id, "An error occurred while sending document: {}", e);
                SubmissionOutcome::Failed { reason: e.to_string() }
            }
        };

        let latency_ms = start.elapsed().as_millis() as u64;
        self.stats.record(&outcome, latency_ms);
        debug!(%submission_id, latency_ms, "Submission finished");

        outcome
    }

    async fn try_submit(
        &self,
        submission_id: Uuid,
        document: &Document,
        token: &str,
    ) -> Result<SubmissionOutcome> {
        let _permit = self.acquire_permit().await?;
        debug!(%submission_id, available = self.limiter.available(), "Permit acquired");

        let request = build_request(&self.api_url, document, token)?;
        let response = self.transport.send(request).await?;

        if response.status != StatusCode::OK {
            error!(%submission_id, status = %response.status, "HTTP response code: {}", response.status.as_u16());
            return Ok(SubmissionOutcome::Rejected { status: response.status });
        }

        let body = response.read_trimmed_lines().await?;
        info!(%submission_id, "Response: {}", body);
        Ok(SubmissionOutcome::Accepted { body })
    }

    async fn acquire_permit(&self) -> Result<Permit> {
        match self.acquire_timeout {
            Some(timeout) => self.limiter.acquire_timeout(timeout).await,
            None => self.limiter.acquire().await,
        }
    }
}

/// JSON POST of `document` with a bearer `token`.
pub fn build_request(api_url: &str, document: &Document, token: &str) -> Result<HttpRequest> {
    let body = serde_json::to_vec(document)?;

    let mut auth = HeaderValue::from_str(&format!("Bearer {}", token))?;
    auth.set_sensitive(true);

    let mut headers = HeaderMap::new();
    headers.insert(AUTHORIZATION, auth);
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

    Ok(HttpRequest {
        method: Method::POST,
        url: api_url.to_string(),
        headers,
        body,
    })
}
