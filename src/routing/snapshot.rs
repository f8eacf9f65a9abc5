//! Configuration snapshot handed to the routing table builder.
//!
//! A snapshot is a complete point-in-time read of the routing configuration:
//! routes, TLS bindings and the key material those bindings refer to. It is
//! produced by a watcher, read once per rebuild and never mutated by the proxy.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A complete routing configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ConfigSnapshot {
    /// Routes in priority order. For a given host, the first matching route wins.
    pub routes: Vec<RouteEntry>,

    /// Hostname sets served with a named secret's certificate.
    pub tls: Vec<TlsBinding>,

    /// Key material by secret name.
    pub secrets: HashMap<String, KeyMaterial>,
}

/// One host/path rule pointing at a backend service.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RouteEntry {
    /// Host the rule applies to (matched against the request host).
    pub host: String,

    /// Path regex, searched anywhere in the request path. Empty matches all paths.
    #[serde(default)]
    pub path: String,

    /// Backend service name, used as the upstream hostname.
    pub service: String,

    /// Backend service port.
    pub port: u16,
}

impl RouteEntry {
    pub fn new(
        host: impl Into<String>,
        path: impl Into<String>,
        service: impl Into<String>,
        port: u16,
    ) -> Self {
        Self {
            host: host.into(),
            path: path.into(),
            service: service.into(),
            port,
        }
    }
}

/// Associates hostnames (possibly wildcards like `*.example.com`) with a secret.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsBinding {
    pub hosts: Vec<String>,
    pub secret: String,
}

/// PEM-encoded certificate chain and private key.
#[derive(Clone, Default, Deserialize, Serialize)]
pub struct KeyMaterial {
    pub cert_pem: Vec<u8>,
    pub key_pem: Vec<u8>,
}

impl KeyMaterial {
    pub fn new(cert_pem: impl Into<Vec<u8>>, key_pem: impl Into<Vec<u8>>) -> Self {
        Self {
            cert_pem: cert_pem.into(),
            key_pem: key_pem.into(),
        }
    }
}

// Key bytes stay out of logs.
impl std::fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("cert_pem_len", &self.cert_pem.len())
            .field("key_pem_len", &self.key_pem.len())
            .finish()
    }
}
