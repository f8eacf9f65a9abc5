//! TLS configuration and per-handshake certificate selection.
//!
//! Certificates are parsed once, when a routing table is built, and the
//! handshake callback only performs an in-memory lookup against whichever
//! table is current at that moment.

use std::sync::Arc;

use arc_swap::ArcSwap;
use axum_server::tls_rustls::RustlsConfig;
use rustls::crypto::CryptoProvider;
use rustls::pki_types::CertificateDer;
use rustls::server::{ClientHello, ResolvesServerCert};
use rustls::sign::CertifiedKey;
use rustls::ServerConfig;
use thiserror::Error;

use crate::observability::metrics;
use crate::routing::snapshot::KeyMaterial;
use crate::routing::RoutingTable;

/// Key material that could not be turned into a usable certificate.
#[derive(Debug, Error)]
pub enum CertificateError {
    #[error("no certificate found in PEM data")]
    NoCertificates,

    #[error("no private key found in PEM data")]
    NoPrivateKey,

    #[error("malformed PEM: {0}")]
    Pem(#[from] std::io::Error),

    #[error("unsupported private key: {0}")]
    UnsupportedKey(#[source] rustls::Error),

    #[error("private key does not belong to the certificate: {0}")]
    KeyMismatch(#[source] rustls::Error),
}

fn crypto_provider() -> Arc<CryptoProvider> {
    Arc::new(rustls::crypto::aws_lc_rs::default_provider())
}

/// Parse a PEM certificate chain and private key into a signing-ready certificate.
///
/// The key must belong to the chain's end-entity certificate.
pub fn load_certified_key(material: &KeyMaterial) -> Result<Arc<CertifiedKey>, CertificateError> {
    let chain = rustls_pemfile::certs(&mut material.cert_pem.as_slice())
        .collect::<Result<Vec<CertificateDer<'static>>, _>>()?;
    if chain.is_empty() {
        return Err(CertificateError::NoCertificates);
    }

    let key = rustls_pemfile::private_key(&mut material.key_pem.as_slice())?
        .ok_or(CertificateError::NoPrivateKey)?;
    let signing_key = crypto_provider()
        .key_provider
        .load_private_key(key)
        .map_err(CertificateError::UnsupportedKey)?;

    let certified = CertifiedKey::new(chain, signing_key);
    certified.keys_match().map_err(CertificateError::KeyMismatch)?;
    Ok(Arc::new(certified))
}

/// Resolves the server certificate from the current routing table by SNI.
///
/// A missing SNI or an unknown name yields no certificate, which rustls turns
/// into a handshake failure. There is no default certificate.
#[derive(Debug)]
pub struct SniResolver {
    table: Arc<ArcSwap<RoutingTable>>,
}

impl SniResolver {
    pub fn new(table: Arc<ArcSwap<RoutingTable>>) -> Self {
        Self { table }
    }

    /// Look up the certificate for a requested server name.
    pub fn resolve_name(&self, server_name: Option<&str>) -> Option<Arc<CertifiedKey>> {
        let Some(sni) = server_name else {
            tracing::debug!("TLS handshake without SNI rejected");
            metrics::record_handshake_rejected("no_sni");
            return None;
        };

        match self.table.load().get_certificate(sni) {
            Ok(cert) => Some(cert),
            Err(e) => {
                tracing::debug!(sni = %sni, error = %e, "TLS handshake rejected");
                metrics::record_handshake_rejected("unknown_sni");
                None
            }
        }
    }
}

impl ResolvesServerCert for SniResolver {
    fn resolve(&self, client_hello: ClientHello<'_>) -> Option<Arc<CertifiedKey>> {
        self.resolve_name(client_hello.server_name())
    }
}

/// Build a rustls server config whose certificates come from the routing table.
pub fn server_config(table: Arc<ArcSwap<RoutingTable>>) -> Result<ServerConfig, rustls::Error> {
    let mut config = ServerConfig::builder_with_provider(crypto_provider())
        .with_safe_default_protocol_versions()?
        .with_no_client_auth()
        .with_cert_resolver(Arc::new(SniResolver::new(table)));

    config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];
    Ok(config)
}

/// Wrap [`server_config`] for axum-server.
pub fn load_tls_config(table: Arc<ArcSwap<RoutingTable>>) -> Result<RustlsConfig, rustls::Error> {
    Ok(RustlsConfig::from_config(Arc::new(server_config(table)?)))
}
