// src/engine/probe.rs

//! Pluggable status probe.
//!
//! The supervisor asks a `StatusProbe` for the child's current snapshot
//! instead of talking HTTP directly, so tests can script the snapshots a
//! child "reports" while a real process provides the lifecycle.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use reqwest::Client;

use crate::endpoint::base_url;
use crate::errors::{Result, TaskhostError};
use crate::protocol::{parse_progress_record, ProgressRecord};

pub trait StatusProbe: Send {
    /// Fetch the current snapshot from the child serving on `port`.
    ///
    /// Any error is treated as transient by the caller.
    fn query(
        &mut self,
        port: u16,
    ) -> Pin<Box<dyn Future<Output = Result<ProgressRecord>> + Send + '_>>;
}

/// Production probe: `GET http://<host>:<port>/` returning JSON.
#[derive(Debug, Clone)]
pub struct HttpStatusProbe {
    client: Client,
    host: String,
}

impl HttpStatusProbe {
    pub fn new(host: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            host: host.into(),
        })
    }
}

impl StatusProbe for HttpStatusProbe {
    fn query(
        &mut self,
        port: u16,
    ) -> Pin<Box<dyn Future<Output = Result<ProgressRecord>> + Send + '_>> {
        let url = format!("{}/", base_url(&self.host, port));
        let client = self.client.clone();

        Box::pin(async move {
            let response = client.get(&url).send().await?;
            if !response.status().is_success() {
                return Err(TaskhostError::EndpointUnreachable(format!(
                    "{url} answered {}",
                    response.status()
                )));
            }
            let body = response.text().await?;
            parse_progress_record(&body)
        })
    }
}
