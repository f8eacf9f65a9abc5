//! Routing table construction and lookup.
//!
//! # Responsibilities
//! - Compile a [`ConfigSnapshot`] into host → ordered routes and
//!   hostname → certificate maps
//! - Resolve request host + path to an upstream
//! - Resolve a TLS server name to a certificate, including wildcards
//!
//! # Design Decisions
//! - Immutable after construction; reloads build a new table and swap it in
//! - Per-entry failures are skipped and kept as warnings, never fatal
//! - First match wins within a host, in snapshot order (not best match)
//! - Hostnames are compared lowercase
//! - Certificates: exact names beat wildcards, wildcards are tried in
//!   snapshot order, and a later binding for the same name replaces an
//!   earlier one
//! - Key material whose key does not match its certificate is dropped

use std::collections::HashMap;
use std::sync::Arc;

use rustls::sign::CertifiedKey;

use crate::net::tls::load_certified_key;
use crate::routing::error::{LookupError, RouteError};
use crate::routing::matcher::{BackendMatcher, Upstream};
use crate::routing::snapshot::ConfigSnapshot;

/// Compiled, immutable routing state for one snapshot.
#[derive(Debug, Default)]
pub struct RoutingTable {
    /// Request host → routes in snapshot order.
    backends: HashMap<String, Vec<BackendMatcher>>,
    /// Exact certificate hostname → certificate.
    certificates: HashMap<String, Arc<CertifiedKey>>,
    /// Wildcard certificate hostnames, in snapshot order.
    wildcards: Vec<(String, Arc<CertifiedKey>)>,
    /// Entries skipped while building.
    warnings: Vec<RouteError>,
}

impl RoutingTable {
    /// A table with no routes and no certificates.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a table from a snapshot.
    ///
    /// Malformed entries are logged, recorded in [`warnings`](Self::warnings)
    /// and left out; everything else is present.
    pub fn build(snapshot: &ConfigSnapshot) -> Self {
        let mut table = Self::empty();

        // Certificates
        for binding in &snapshot.tls {
            let Some(material) = snapshot.secrets.get(&binding.secret) else {
                table.skip(RouteError::MissingSecret {
                    secret: binding.secret.clone(),
                    hosts: binding.hosts.clone(),
                });
                continue;
            };

            let cert = match load_certified_key(material) {
                Ok(cert) => cert,
                Err(e) => {
                    table.skip(RouteError::CertificateLoad {
                        secret: binding.secret.clone(),
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            for host in &binding.hosts {
                table.insert_certificate(host.to_lowercase(), cert.clone());
            }
        }

        // Routes
        for route in &snapshot.routes {
            let host = route.host.to_lowercase();
            match BackendMatcher::new(&host, &route.path, &route.service, route.port) {
                Ok(matcher) => {
                    tracing::debug!(
                        host = %host,
                        pattern = ?matcher.pattern(),
                        upstream = %matcher.upstream(),
                        "Route added"
                    );
                    table.backends.entry(host).or_default().push(matcher);
                }
                Err(e) => table.skip(e),
            }
        }

        table
    }

    fn insert_certificate(&mut self, host: String, cert: Arc<CertifiedKey>) {
        // A later binding for the same name replaces the earlier one.
        if host.starts_with("*.") {
            match self.wildcards.iter_mut().find(|(name, _)| *name == host) {
                Some(entry) => entry.1 = cert,
                None => self.wildcards.push((host, cert)),
            }
        } else {
            self.certificates.insert(host, cert);
        }
    }

    fn skip(&mut self, error: RouteError) {
        tracing::warn!(error = %error, "Skipping routing entry");
        self.warnings.push(error);
    }

    /// Resolve the upstream for a request.
    ///
    /// `host` must already be normalized (lowercase, no port).
    pub fn get_backend(&self, host: &str, path: &str) -> Result<&Upstream, LookupError> {
        self.backends
            .get(host)
            .and_then(|routes| routes.iter().find(|m| m.matches(path)))
            .map(BackendMatcher::upstream)
            .ok_or_else(|| LookupError::BackendNotFound {
                host: host.to_string(),
                path: path.to_string(),
            })
    }

    /// Resolve the certificate for a TLS server name.
    ///
    /// An exact hostname entry wins; otherwise wildcard entries are tried in
    /// snapshot order with [`sni_matches`].
    pub fn get_certificate(&self, sni: &str) -> Result<Arc<CertifiedKey>, LookupError> {
        let sni = sni.to_lowercase();

        if let Some(cert) = self.certificates.get(&sni) {
            return Ok(cert.clone());
        }

        self.wildcards
            .iter()
            .find(|(cert_host, _)| sni_matches(&sni, cert_host))
            .map(|(_, cert)| cert.clone())
            .ok_or(LookupError::CertificateNotFound { sni })
    }

    /// Entries skipped while building this table.
    pub fn warnings(&self) -> &[RouteError] {
        &self.warnings
    }

    /// Total number of routes across all hosts.
    pub fn route_count(&self) -> usize {
        self.backends.values().map(Vec::len).sum()
    }

    /// Number of distinct routed hosts.
    pub fn host_count(&self) -> usize {
        self.backends.len()
    }

    /// Number of hostnames (exact and wildcard) with a certificate.
    pub fn certificate_count(&self) -> usize {
        self.certificates.len() + self.wildcards.len()
    }
}

/// Match a server name against a certificate hostname.
///
/// Each leading `*.` on `cert_host` consumes exactly one leftmost label of
/// `sni`; the remainders must then be equal. `*.example.com` matches
/// `foo.example.com` but not `example.com` or `a.b.example.com`.
pub fn sni_matches(sni: &str, cert_host: &str) -> bool {
    let mut sni = sni;
    let mut cert_host = cert_host;

    while let Some(rest) = cert_host.strip_prefix("*.") {
        match sni.split_once('.') {
            Some((_, tail)) => sni = tail,
            None => return false,
        }
        cert_host = rest;
    }

    sni == cert_host
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::snapshot::{KeyMaterial, RouteEntry, TlsBinding};

    fn self_signed(names: &[&str]) -> KeyMaterial {
        let names = names.iter().map(|n| n.to_string()).collect::<Vec<_>>();
        let rcgen::CertifiedKey { cert, key_pair } = rcgen::generate_simple_self_signed(names).unwrap();
        KeyMaterial::new(cert.pem(), key_pair.serialize_pem())
    }

    fn with_certificate(snapshot: &mut ConfigSnapshot, secret: &str, hosts: &[&str]) {
        snapshot.tls.push(TlsBinding {
            hosts: hosts.iter().map(|h| h.to_string()).collect(),
            secret: secret.to_string(),
        });
        snapshot.secrets.insert(secret.to_string(), self_signed(hosts));
    }

    #[test]
    fn test_first_match_wins() {
        let snapshot = ConfigSnapshot {
            routes: vec![
                RouteEntry::new("example.com", "/api", "api", 8001),
                RouteEntry::new("example.com", "", "web", 8002),
                RouteEntry::new("example.com", "/api/v2", "never", 8003),
            ],
            ..Default::default()
        };
        let table = RoutingTable::build(&snapshot);

        assert_eq!(table.get_backend("example.com", "/api/v2/users").unwrap().to_string(), "http://api:8001");
        assert_eq!(table.get_backend("example.com", "/images").unwrap().to_string(), "http://web:8002");
        assert_eq!(table.route_count(), 3);
        assert_eq!(table.host_count(), 1);
    }

    #[test]
    fn test_no_match_within_host() {
        let snapshot = ConfigSnapshot {
            routes: vec![
                RouteEntry::new("example.com", "^/a", "a", 8001),
                RouteEntry::new("example.com", "^/b", "b", 8002),
            ],
            ..Default::default()
        };
        let table = RoutingTable::build(&snapshot);

        assert_eq!(table.get_backend("example.com", "/b/1").unwrap().to_string(), "http://b:8002");
        assert_eq!(
            table.get_backend("example.com", "/c"),
            Err(LookupError::BackendNotFound {
                host: "example.com".into(),
                path: "/c".into()
            })
        );
    }

    #[test]
    fn test_unknown_host() {
        let snapshot = ConfigSnapshot {
            routes: vec![RouteEntry::new("example.com", "", "web", 80)],
            ..Default::default()
        };
        let table = RoutingTable::build(&snapshot);

        assert!(table.get_backend("other.com", "/").is_err());
        assert!(RoutingTable::empty().get_backend("example.com", "/").is_err());
    }

    #[test]
    fn test_hosts_are_case_insensitive() {
        let snapshot = ConfigSnapshot {
            routes: vec![RouteEntry::new("Example.COM", "", "web", 80)],
            ..Default::default()
        };
        let table = RoutingTable::build(&snapshot);
        assert!(table.get_backend("example.com", "/").is_ok());
    }

    #[test]
    fn test_malformed_entries_are_skipped() {
        let mut snapshot = ConfigSnapshot {
            routes: vec![
                RouteEntry::new("example.com", "/api/(", "api", 8001),
                RouteEntry::new("example.com", "", "web", 8002),
                RouteEntry::new("other.com", "", "bad host", 8003),
                RouteEntry::new("third.com", "^/ok", "ok", 8004),
            ],
            ..Default::default()
        };
        snapshot.tls.push(TlsBinding {
            hosts: vec!["missing.com".into()],
            secret: "absent".into(),
        });
        snapshot.tls.push(TlsBinding {
            hosts: vec!["broken.com".into()],
            secret: "broken".into(),
        });
        snapshot
            .secrets
            .insert("broken".into(), KeyMaterial::new("garbage", "garbage"));
        with_certificate(&mut snapshot, "good", &["good.com"]);

        let table = RoutingTable::build(&snapshot);

        // The bad pattern is dropped, not turned into a catch-all.
        assert_eq!(table.get_backend("example.com", "/api/x").unwrap().to_string(), "http://web:8002");
        assert!(table.get_backend("other.com", "/").is_err());
        assert!(table.get_backend("third.com", "/ok").is_ok());
        assert!(table.get_certificate("good.com").is_ok());
        assert!(table.get_certificate("missing.com").is_err());
        assert!(table.get_certificate("broken.com").is_err());

        let warnings = table.warnings();
        assert_eq!(warnings.len(), 4);
        assert!(matches!(warnings[0], RouteError::MissingSecret { .. }));
        assert!(matches!(warnings[1], RouteError::CertificateLoad { .. }));
        assert!(matches!(warnings[2], RouteError::InvalidPattern { .. }));
        assert!(matches!(warnings[3], RouteError::InvalidUpstream { .. }));
    }

    #[test]
    fn test_sni_peel_algorithm() {
        assert!(sni_matches("example.com", "example.com"));
        assert!(sni_matches("a.example.com", "*.example.com"));
        assert!(!sni_matches("example.com", "*.example.com"));
        assert!(!sni_matches("a.b.example.com", "*.example.com"));
        assert!(sni_matches("a.b.example.com", "*.*.example.com"));
        assert!(!sni_matches("com", "*.com.example"));
        assert!(!sni_matches("localhost", "*.localhost"));
        assert!(!sni_matches("a.other.com", "*.example.com"));
    }

    #[test]
    fn test_certificate_exact_and_wildcard() {
        let mut snapshot = ConfigSnapshot::default();
        with_certificate(&mut snapshot, "exact", &["example.com"]);
        with_certificate(&mut snapshot, "wildcard", &["*.example.com"]);
        let table = RoutingTable::build(&snapshot);

        let exact = table.get_certificate("example.com").unwrap();
        let wildcard = table.get_certificate("a.example.com").unwrap();
        assert!(!Arc::ptr_eq(&exact, &wildcard));
        assert!(Arc::ptr_eq(&wildcard, &table.get_certificate("B.Example.com").unwrap()));

        assert_eq!(
            table.get_certificate("a.b.example.com").unwrap_err(),
            LookupError::CertificateNotFound {
                sni: "a.b.example.com".into()
            }
        );
        assert_eq!(table.certificate_count(), 2);
    }

    #[test]
    fn test_wildcard_only_does_not_cover_apex() {
        let mut snapshot = ConfigSnapshot {
            routes: vec![RouteEntry::new("foo.test.com", "", "web", 80)],
            ..Default::default()
        };
        with_certificate(&mut snapshot, "wildcard", &["*.test.com"]);
        let table = RoutingTable::build(&snapshot);

        assert!(table.get_certificate("foo.test.com").is_ok());
        assert!(table.get_certificate("test.com").is_err());
        assert!(table.get_certificate("x.foo.test.com").is_err());
    }

    #[test]
    fn test_exact_certificate_wins_over_wildcard() {
        let mut snapshot = ConfigSnapshot::default();
        with_certificate(&mut snapshot, "wildcard", &["*.example.com"]);
        with_certificate(&mut snapshot, "www", &["www.example.com"]);
        let table = RoutingTable::build(&snapshot);

        let www = table.get_certificate("www.example.com").unwrap();
        let other = table.get_certificate("api.example.com").unwrap();
        assert!(!Arc::ptr_eq(&www, &other));
    }

    #[test]
    fn test_mismatched_key_falls_back_to_wildcard() {
        let mut snapshot = ConfigSnapshot::default();
        with_certificate(&mut snapshot, "wildcard", &["*.example.com"]);

        let first = self_signed(&["www.example.com"]);
        let second = self_signed(&["www.example.com"]);
        snapshot.tls.push(TlsBinding {
            hosts: vec!["www.example.com".into()],
            secret: "crossed".into(),
        });
        snapshot
            .secrets
            .insert("crossed".into(), KeyMaterial::new(first.cert_pem, second.key_pem));

        let table = RoutingTable::build(&snapshot);

        assert_eq!(table.warnings().len(), 1);
        assert!(matches!(table.warnings()[0], RouteError::CertificateLoad { ref secret, .. } if secret == "crossed"));
        assert_eq!(table.certificate_count(), 1);

        let www = table.get_certificate("www.example.com").unwrap();
        let api = table.get_certificate("api.example.com").unwrap();
        assert!(Arc::ptr_eq(&www, &api));
        assert!(www.keys_match().is_ok());
    }

    #[test]
    fn test_later_binding_replaces_same_name() {
        let mut snapshot = ConfigSnapshot::default();
        with_certificate(&mut snapshot, "old", &["www.example.com", "*.example.com"]);
        with_certificate(&mut snapshot, "new", &["www.example.com", "*.example.com"]);
        let table = RoutingTable::build(&snapshot);

        let newest = crate::net::tls::load_certified_key(&snapshot.secrets["new"]).unwrap();
        let www = table.get_certificate("www.example.com").unwrap();
        let api = table.get_certificate("api.example.com").unwrap();
        assert_eq!(www.cert, newest.cert);
        assert_eq!(api.cert, newest.cert);
        assert_eq!(table.certificate_count(), 2);
    }
}
