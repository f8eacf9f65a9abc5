//! Routing errors.

use thiserror::Error;

/// A snapshot entry that could not be compiled into the routing table.
///
/// These never abort a rebuild; the entry is skipped and the error is kept
/// on the resulting table as a warning.
#[derive(Debug, Error)]
pub enum RouteError {
    #[error("invalid path pattern {pattern:?} for host {host:?}: {source}")]
    InvalidPattern {
        host: String,
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("invalid upstream {service:?}:{port}: {reason}")]
    InvalidUpstream {
        service: String,
        port: u16,
        reason: String,
    },

    #[error("secret {secret:?} referenced by {hosts:?} is not present")]
    MissingSecret { secret: String, hosts: Vec<String> },

    #[error("failed to load certificate from secret {secret:?}: {reason}")]
    CertificateLoad { secret: String, reason: String },
}

/// A lookup against the routing table found nothing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupError {
    #[error("no backend server found for {host}{path}")]
    BackendNotFound { host: String, path: String },

    #[error("certificate not found for {sni:?}")]
    CertificateNotFound { sni: String },
}
