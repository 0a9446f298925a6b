// src/scoring/client.rs

//! Request/response client for scoring and indexing children.

use std::time::Duration;

use anyhow::{anyhow, Context};
use reqwest::{Client, Url};
use serde::de::DeserializeOwned;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::config::ScoringSection;
use crate::endpoint::base_url;
use crate::errors::{Result, TaskhostError};

/// Issues one GET per query against a child's score server.
///
/// Connection failures and timeouts are retried up to `retries` attempts in
/// total, sleeping `retry_delay` between attempts, to absorb the child's
/// startup latency. Every other failure is returned immediately.
#[derive(Debug, Clone)]
pub struct ScoringClient {
    client: Client,
    host: String,
    retries: u32,
    retry_delay: Duration,
}

impl ScoringClient {
    pub fn new(
        host: impl Into<String>,
        retries: u32,
        retry_delay: Duration,
        request_timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder().timeout(request_timeout).build()?;
        Ok(Self {
            client,
            host: host.into(),
            retries: retries.max(1),
            retry_delay,
        })
    }

    pub fn from_config(host: impl Into<String>, scoring: &ScoringSection) -> Result<Self> {
        Self::new(
            host,
            scoring.retries,
            Duration::from_millis(scoring.retry_delay_ms),
            Duration::from_millis(scoring.request_timeout_ms),
        )
    }

    pub fn retries(&self) -> u32 {
        self.retries
    }

    /// URL queried for `key` on `port`.
    ///
    /// The whole key is one percent-encoded path segment, so slashes, `?`
    /// and `#` reach the scorer unchanged.
    pub fn url(&self, port: u16, key: &str) -> Result<Url> {
        let mut url = Url::parse(&base_url(&self.host, port))
            .with_context(|| format!("building scoring URL for host {:?}", self.host))?;
        url.path_segments_mut()
            .map_err(|_| anyhow!("scoring URL cannot carry a path"))?
            .pop_if_empty()
            .push(key);
        Ok(url)
    }

    /// Query the child serving on `port` for `key`.
    ///
    /// Fails with [`TaskhostError::RetryBudgetExhausted`] once every attempt
    /// failed to connect; no further attempts are made after that.
    pub async fn query<T: DeserializeOwned>(&self, port: u16, key: &str) -> Result<T> {
        self.query_with(|| port, key).await
    }

    /// Like [`ScoringClient::query`], resolving the port again before every
    /// attempt. A child may announce a different port while it starts up.
    pub async fn query_with<T, F>(&self, resolve_port: F, key: &str) -> Result<T>
    where
        T: DeserializeOwned,
        F: Fn() -> u16,
    {
        for attempt in 1..=self.retries {
            let url = self.url(resolve_port(), key)?;
            match self.client.get(url.clone()).send().await {
                Ok(response) => {
                    let status = response.status();
                    if !status.is_success() {
                        return Err(TaskhostError::ScoreRejected {
                            status: status.as_u16(),
                        });
                    }
                    debug!(%url, attempt, "score response received");
                    return Ok(response.json::<T>().await?);
                }
                Err(e) if e.is_connect() || e.is_timeout() => {
                    warn!(%url, attempt, retries = self.retries, error = %e, "scoring endpoint not ready");
                    if attempt < self.retries {
                        sleep(self.retry_delay).await;
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(TaskhostError::RetryBudgetExhausted {
            attempts: self.retries,
        })
    }
}
