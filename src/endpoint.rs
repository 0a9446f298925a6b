// src/endpoint.rs

//! Ephemeral endpoint allocation.
//!
//! [`allocate`] binds a probe socket to port 0, reads back the port the OS
//! picked and closes the socket again. The port was free at that instant
//! only: another process may claim it before the child binds. Children
//! built on [`crate::worker`] fall back to an OS-assigned port when that
//! happens and announce it through the handshake file, and the supervisor
//! relaunches once when a child stays unreachable.

use std::net::{Ipv4Addr, SocketAddr, TcpListener};
use std::path::Path;

use anyhow::Context;
use tracing::debug;

use crate::errors::Result;
use crate::protocol::read_endpoint_handshake;

/// Obtain a local port that is unused right now.
pub fn allocate() -> Result<u16> {
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0))
        .context("binding ephemeral probe socket")?;
    let port = listener
        .local_addr()
        .context("reading probe socket address")?
        .port();
    drop(listener);
    debug!(port, "allocated ephemeral port");
    Ok(port)
}

/// The port a child is actually serving on: the handshake value if the child
/// wrote one, otherwise the port it was given.
pub fn effective_port(workdir: &Path, allocated: u16) -> u16 {
    read_endpoint_handshake(workdir).unwrap_or(allocated)
}

/// Base URL of a local endpoint.
pub fn base_url(host: &str, port: u16) -> String {
    format!("http://{host}:{port}")
}

/// Socket address a child should bind for `host`/`port`.
pub fn bind_addr(host: &str, port: u16) -> Result<SocketAddr> {
    // Hostnames such as "localhost" do not parse as addresses.
    let addr = format!("{host}:{port}")
        .parse::<SocketAddr>()
        .or_else(|_| format!("127.0.0.1:{port}").parse::<SocketAddr>())
        .context("building bind address")?;
    Ok(addr)
}
