//! Dynamic reverse proxy library.
//!
//! Routing rules arrive as complete snapshots. Each snapshot is compiled into
//! an immutable [`RoutingTable`] and swapped in atomically; the HTTP and HTTPS
//! listeners read whichever table is current.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod reload;
pub mod routing;
pub mod source;

pub use config::schema::ProxyConfig;
pub use http::{ProxyServer, ServerError};
pub use lifecycle::{ReadinessGate, Shutdown};
pub use reload::Coalescer;
pub use routing::{ConfigSnapshot, RoutingTable};
pub use source::{ConfigurationSink, FileSource};
