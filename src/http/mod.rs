//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (Axum setup, plain + TLS listeners)
//!     → request.rs (request ID, routing host, forwarding headers)
//!     → routing table lookup (host + path → upstream)
//!     → upstream client (hyper-util)
//!     → response.rs (strip hop-by-hop headers, error bodies)
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use request::{RequestIdExt, X_REQUEST_ID};
pub use server::{ProxyServer, ServerError};
