//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (bind, fatal listener errors)
//!     → tls.rs (TLS handshake, certificate chosen by SNI)
//!     → Hand off to HTTP layer
//! ```
//!
//! # Design Decisions
//! - Listeners are bound only once the first routing table is installed
//! - The certificate resolver reads the current table on every handshake

pub mod listener;
pub mod tls;

pub use listener::ListenerError;
