//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Route Compilation (on every coalesced change):
//!     ConfigSnapshot
//!     → table.rs (fold over entries, skip + warn on bad ones)
//!     → matcher.rs (compile path regex, resolve upstream)
//!     → Freeze as immutable RoutingTable
//!
//! Incoming Request (host, path)
//!     → table.rs (host lookup, ordered scan)
//!     → Return: Upstream or BackendNotFound
//!
//! TLS Handshake (sni)
//!     → table.rs (exact name, then wildcard peel)
//!     → Return: certificate or CertificateNotFound
//! ```
//!
//! # Design Decisions
//! - Tables are immutable at runtime; reload means build-and-replace
//! - Deterministic: same snapshot and request always resolve the same way
//! - First match wins (ordered by snapshot position)

pub mod error;
pub mod matcher;
pub mod snapshot;
pub mod table;

pub use error::{LookupError, RouteError};
pub use matcher::{BackendMatcher, Upstream};
pub use snapshot::{ConfigSnapshot, KeyMaterial, RouteEntry, TlsBinding};
pub use table::RoutingTable;
