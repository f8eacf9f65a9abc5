//! Reload subsystem.
//!
//! # Data Flow
//! ```text
//! watcher events (add / update / delete)
//!     → coalescer.rs (debounce, quiet window)
//!     → rebuild action (load snapshot, build table)
//!     → ConfigurationSink::on_configuration_change
//! ```

pub mod coalescer;

pub use coalescer::Coalescer;
