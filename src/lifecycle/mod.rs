//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup:
//!     Construct server (empty table) → first snapshot installed
//!     → ready.rs gate fires → listeners bind and accept
//!
//! Shutdown (shutdown.rs):
//!     Signal received → cancel token → stop accepting → drain → exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Listeners start last (traffic only once a routing table exists)
//! - One cancellation token reaches every long-running task
//! - Waiting for readiness is itself cancellable

pub mod ready;
pub mod shutdown;
pub mod signals;

pub use ready::ReadinessGate;
pub use shutdown::Shutdown;
