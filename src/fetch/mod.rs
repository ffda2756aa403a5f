//! Outbound calls with a per-source rate budget and retry/backoff.
//!
//! Every network adapter owns a [`RateLimitedFetcher`]. Fetchers built for the
//! same source name share one token bucket through [`RateLimits`], so two
//! adapters (or two chunks in flight) never exceed the vendor's quota between
//! them.

use async_trait::async_trait;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::FetchError;

pub type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

// ── Requests / responses ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct FetchRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub query: Vec<(String, String)>,
}

impl FetchRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self { url: url.into(), ..Default::default() }
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn query(mut self, name: &str, value: impl ToString) -> Self {
        self.query.push((name.to_string(), value.to_string()));
        self
    }
}

#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl FetchResponse {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json<T: DeserializeOwned>(&self, source_name: &str) -> Result<T, FetchError> {
        serde_json::from_slice(&self.body).map_err(|e| FetchError::Decode {
            source_name: source_name.to_string(),
            reason: e.to_string(),
        })
    }
}

/// Connection-level failure (DNS, connect, reset, timeout). Always transient.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct TransportError(pub String);

#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, request: &FetchRequest) -> Result<FetchResponse, TransportError>;
}

pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("sportsync/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn execute(&self, request: &FetchRequest) -> Result<FetchResponse, TransportError> {
        let mut builder = self.client.get(&request.url);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder.send().await.map_err(|e| TransportError(e.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| TransportError(e.to_string()))?
            .to_vec();

        Ok(FetchResponse { status, body })
    }
}

// ── Rate budget ──────────────────────────────────────────────────────────────

/// `requests` calls per `interval`, replenished evenly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateBudget {
    pub requests: NonZeroU32,
    pub interval: Duration,
}

impl RateBudget {
    pub fn new(requests: u32, interval: Duration) -> Self {
        Self {
            requests: NonZeroU32::new(requests).unwrap_or(NonZeroU32::MIN),
            interval,
        }
    }

    fn quota(&self) -> Quota {
        let period = self.interval / self.requests.get();
        Quota::with_period(period)
            .map(|q| q.allow_burst(self.requests))
            .unwrap_or_else(|| Quota::per_second(self.requests))
    }
}

/// Registry of token buckets keyed by source name.
#[derive(Clone, Default)]
pub struct RateLimits {
    limiters: Arc<Mutex<HashMap<String, Arc<DirectLimiter>>>>,
}

impl RateLimits {
    pub fn new() -> Self {
        Self::default()
    }

    /// First caller for a source decides its budget; later callers share it.
    pub fn limiter_for(&self, source: &str, budget: RateBudget) -> Arc<DirectLimiter> {
        let mut limiters = self.limiters.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        limiters
            .entry(source.to_string())
            .or_insert_with(|| Arc::new(RateLimiter::direct(budget.quota())))
            .clone()
    }
}

// ── Retry policy ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_base: Duration,
    pub jitter: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base: Duration::from_millis(2000),
            jitter: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Delay after failed attempt number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        let exponential = self.backoff_base.saturating_mul(factor);
        let jitter = self.jitter.mul_f64(rand::random::<f64>());
        exponential.saturating_add(jitter).min(self.max_delay)
    }
}

// ── Fetcher ──────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct RateLimitedFetcher {
    source: String,
    transport: Arc<dyn Transport>,
    limiter: Arc<DirectLimiter>,
    policy: RetryPolicy,
}

impl RateLimitedFetcher {
    pub fn new(
        source: impl Into<String>,
        transport: Arc<dyn Transport>,
        limiter: Arc<DirectLimiter>,
        policy: RetryPolicy,
    ) -> Self {
        Self { source: source.into(), transport, limiter, policy }
    }

    /// Perform one logical call. Waits for the rate budget before every
    /// attempt; only transient failures are retried.
    pub async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, FetchError> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            self.limiter.until_ready().await;

            let failure = match self.transport.execute(request).await {
                Ok(response) => match self.classify(&request.url, response) {
                    Ok(response) => return Ok(response),
                    Err(e) if e.is_retryable() => e,
                    Err(e) => return Err(e),
                },
                Err(e) => FetchError::Transient {
                    source_name: self.source.clone(),
                    reason: e.to_string(),
                },
            };

            if attempt >= max_attempts {
                tracing::warn!("{}: giving up on {} after {} attempts", self.source, request.url, attempt);
                return Err(FetchError::Exhausted {
                    source_name: self.source.clone(),
                    attempts: attempt,
                    last: Box::new(failure),
                });
            }

            let delay = self.policy.delay_for(attempt);
            tracing::debug!(
                "{}: attempt {}/{} for {} failed ({}), retrying in {:?}",
                self.source, attempt, max_attempts, request.url, failure, delay
            );
            tokio::time::sleep(delay).await;
        }
    }

    pub async fn fetch_json<T: DeserializeOwned>(&self, request: &FetchRequest) -> Result<T, FetchError> {
        self.fetch(request).await?.json(&self.source)
    }

    fn classify(&self, url: &str, response: FetchResponse) -> Result<FetchResponse, FetchError> {
        let source_name = self.source.clone();
        let status = response.status;
        match status {
            200..=299 => Ok(response),
            401 | 403 => Err(FetchError::Credential { source_name, status }),
            404 => Err(FetchError::NotFound { source_name, url: url.to_string() }),
            429 | 500..=599 => Err(FetchError::Transient {
                source_name,
                reason: format!("HTTP {}", status),
            }),
            _ => {
                let body = response.text().chars().take(200).collect();
                Err(FetchError::Rejected { source_name, status, body })
            }
        }
    }
}
