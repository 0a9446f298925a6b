// src/worker/server.rs

//! HTTP servers embedded in child processes.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use axum::extract::{Path as UrlPath, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::endpoint::bind_addr;
use crate::errors::Result;
use crate::protocol::{write_endpoint_handshake, ProgressRecord};
use crate::worker::progress::ProgressCell;

/// A server running on a background task.
#[derive(Debug)]
pub struct ServerHandle {
    addr: SocketAddr,
    task: JoinHandle<()>,
}

impl ServerHandle {
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Serve until the server task ends on its own.
    pub async fn wait(self) {
        let _ = self.task.await;
    }

    pub fn shutdown(self) {
        self.task.abort();
    }
}

/// Bind `host:port`, falling back to an OS-assigned port when the requested
/// one was claimed in the meantime, and announce the bound port in
/// `workdir`'s handshake file.
async fn bind_announced(host: &str, port: u16, workdir: &Path) -> Result<TcpListener> {
    let listener = match TcpListener::bind(bind_addr(host, port)?).await {
        Ok(listener) => listener,
        Err(e) => {
            warn!(port, error = %e, "allocated port taken; binding an OS-assigned one");
            TcpListener::bind(bind_addr(host, 0)?)
                .await
                .context("binding fallback port")?
        }
    };
    let bound = listener.local_addr().context("reading bound address")?;
    write_endpoint_handshake(workdir, bound.port())?;
    Ok(listener)
}

fn spawn_router(listener: TcpListener, router: Router, label: &'static str) -> Result<ServerHandle> {
    let addr = listener.local_addr().context("reading bound address")?;
    info!(%addr, server = label, "embedded server listening");
    let task = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            warn!(server = label, error = %e, "embedded server stopped");
        }
    });
    Ok(ServerHandle { addr, task })
}

/// Read-only progress endpoint: GET on any path returns the cell as JSON.
#[derive(Debug, Clone)]
pub struct StatusServer {
    cell: ProgressCell,
}

impl StatusServer {
    pub fn new(cell: ProgressCell) -> Self {
        Self { cell }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/", get(status_handler))
            .route("/*rest", get(status_handler))
            .with_state(self.cell.clone())
    }

    pub async fn start(self, host: &str, port: u16, workdir: &Path) -> Result<ServerHandle> {
        let listener = bind_announced(host, port, workdir).await?;
        spawn_router(listener, self.router(), "status")
    }
}

async fn status_handler(State(cell): State<ProgressCell>) -> Json<ProgressRecord> {
    Json(cell.snapshot())
}

/// Computes one result per request with no state retained across requests.
pub trait Scorer: Send + Sync + 'static {
    type Output: Serialize + Send + 'static;

    fn score(&self, key: &str) -> anyhow::Result<Self::Output>;
}

#[derive(Debug, Serialize)]
struct ScoreError {
    error: String,
}

/// Request/response endpoint: GET `/<key>` returns `Scorer::score(key)`.
///
/// Scoring runs on the blocking pool; failures answer HTTP 500 with a JSON
/// `{"error": ...}` body.
#[derive(Debug)]
pub struct ScoreServer<S: Scorer> {
    scorer: Arc<S>,
}

impl<S: Scorer> ScoreServer<S> {
    pub fn new(scorer: S) -> Self {
        Self {
            scorer: Arc::new(scorer),
        }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/*key", get(score_handler::<S>))
            .with_state(self.scorer.clone())
    }

    pub async fn start(self, host: &str, port: u16, workdir: &Path) -> Result<ServerHandle> {
        let listener = bind_announced(host, port, workdir).await?;
        spawn_router(listener, self.router(), "score")
    }
}

async fn score_handler<S: Scorer>(
    State(scorer): State<Arc<S>>,
    UrlPath(key): UrlPath<String>,
) -> Response {
    let outcome = tokio::task::spawn_blocking(move || scorer.score(&key)).await;
    match outcome {
        Ok(Ok(output)) => Json(output).into_response(),
        Ok(Err(e)) => score_failure(e.to_string()),
        Err(e) => score_failure(format!("scorer panicked: {e}")),
    }
}

fn score_failure(error: String) -> Response {
    warn!(%error, "scoring request failed");
    (StatusCode::INTERNAL_SERVER_ERROR, Json(ScoreError { error })).into_response()
}
