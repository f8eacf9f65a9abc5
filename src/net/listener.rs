//! TCP listener binding.
//!
//! # Responsibilities
//! - Resolve the configured bind address and port
//! - Bind listeners for the plain and TLS servers
//! - Describe fatal listener failures

use std::net::{IpAddr, SocketAddr};

use thiserror::Error;
use tokio::net::TcpListener;

/// Fatal failure of one of the proxy listeners.
#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("invalid bind address {0:?}")]
    Address(String),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("{listener} listener failed: {source}")]
    Serve {
        listener: &'static str,
        #[source]
        source: std::io::Error,
    },
}

/// Combine a configured IP and port.
pub fn socket_addr(bind_address: &str, port: u16) -> Result<SocketAddr, ListenerError> {
    let ip: IpAddr = bind_address
        .parse()
        .map_err(|_| ListenerError::Address(bind_address.to_string()))?;
    Ok(SocketAddr::new(ip, port))
}

/// Bind a TCP listener.
pub async fn bind(addr: SocketAddr) -> Result<TcpListener, ListenerError> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| ListenerError::Bind { addr, source })?;

    let local_addr = listener
        .local_addr()
        .map_err(|source| ListenerError::Bind { addr, source })?;
    tracing::info!(address = %local_addr, "Listener bound");

    Ok(listener)
}
