//! Route matching logic.
//!
//! # Responsibilities
//! - Compile a route's path pattern once, at table build time
//! - Decide whether a request path belongs to the route
//! - Carry the resolved upstream address
//!
//! # Design Decisions
//! - Path patterns are regexes with search semantics: a pattern matches if it
//!   matches anywhere in the path (`/api` matches `/v1/api/users`). Anchor with
//!   `^` for prefix rules.
//! - Empty pattern = always matches (catch-all for the host)
//! - A pattern that fails to compile is an error, never a catch-all

use std::fmt;
use std::str::FromStr;

use axum::http::uri::Authority;
use regex::Regex;
use url::Url;

use crate::routing::error::RouteError;

/// Resolved upstream address, `http://<service>:<port>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upstream {
    authority: Authority,
}

impl Upstream {
    /// Build the upstream address for a backend service.
    pub fn new(service: &str, port: u16) -> Result<Self, RouteError> {
        let invalid = |reason: String| RouteError::InvalidUpstream {
            service: service.to_string(),
            port,
            reason,
        };

        if service.is_empty() {
            return Err(invalid("empty service name".into()));
        }
        if port == 0 {
            return Err(invalid("port must be non-zero".into()));
        }

        let url = Url::parse(&format!("http://{}:{}", service, port))
            .map_err(|e| invalid(e.to_string()))?;
        let host = url
            .host_str()
            .ok_or_else(|| invalid("missing host".into()))?;
        let authority = Authority::from_str(&format!("{}:{}", host, port))
            .map_err(|e| invalid(e.to_string()))?;

        Ok(Self { authority })
    }

    /// `host:port` authority used when rewriting request URIs.
    pub fn authority(&self) -> &Authority {
        &self.authority
    }
}

impl fmt::Display for Upstream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "http://{}", self.authority)
    }
}

/// One compiled route: optional path predicate plus upstream.
#[derive(Debug, Clone)]
pub struct BackendMatcher {
    pattern: Option<Regex>,
    upstream: Upstream,
}

impl BackendMatcher {
    /// Compile a route for `host`. `host` only feeds error reporting.
    pub fn new(host: &str, path: &str, service: &str, port: u16) -> Result<Self, RouteError> {
        let pattern = if path.is_empty() {
            None
        } else {
            let re = Regex::new(path).map_err(|source| RouteError::InvalidPattern {
                host: host.to_string(),
                pattern: path.to_string(),
                source,
            })?;
            Some(re)
        };

        Ok(Self {
            pattern,
            upstream: Upstream::new(service, port)?,
        })
    }

    /// Returns true if the request path belongs to this route.
    pub fn matches(&self, path: &str) -> bool {
        match &self.pattern {
            Some(re) => re.is_match(path),
            None => true,
        }
    }

    pub fn upstream(&self) -> &Upstream {
        &self.upstream
    }

    /// The source pattern, if any.
    pub fn pattern(&self) -> Option<&str> {
        self.pattern.as_ref().map(Regex::as_str)
    }
}
