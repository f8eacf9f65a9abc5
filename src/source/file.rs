//! Snapshot documents on disk.
//!
//! A snapshot document lists routes, TLS bindings and secrets. Secrets point
//! at PEM files, resolved relative to the document's directory:
//!
//! ```toml
//! [[routes]]
//! host = "a.test"
//! path = "^/api"
//! service = "svc1"
//! port = 8080
//!
//! [[tls]]
//! hosts = ["*.test.com"]
//! secret = "wildcard"
//!
//! [secrets.wildcard]
//! cert_file = "certs/wildcard.crt"
//! key_file = "certs/wildcard.key"
//! ```
//!
//! Documents ending in `.json` are read as JSON with the same shape.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::routing::snapshot::{ConfigSnapshot, KeyMaterial, RouteEntry, TlsBinding};

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid TOML snapshot: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid JSON snapshot: {0}")]
    Json(#[from] serde_json::Error),
}

/// Document encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Toml,
    Json,
}

impl Format {
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Format::Json,
            _ => Format::Toml,
        }
    }
}

/// Records stay untyped until [`records`] converts them one by one, so a
/// malformed entry only costs itself.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SnapshotDocument {
    routes: Vec<Value>,
    tls: Vec<Value>,
    secrets: HashMap<String, Value>,
}

#[derive(Debug, Deserialize)]
struct RouteRecord {
    host: String,
    #[serde(default)]
    path: String,
    service: Option<String>,
    port: Option<u16>,
}

#[derive(Debug, Deserialize)]
struct SecretFiles {
    cert_file: PathBuf,
    key_file: PathBuf,
}

/// Read a snapshot document and the PEM files it references.
pub fn load_snapshot(path: &Path) -> Result<ConfigSnapshot, SnapshotError> {
    let content = fs::read_to_string(path).map_err(|source| SnapshotError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_snapshot(&content, Format::from_path(path), &document_dir(path))
}

/// Parse a snapshot document. Secret file paths resolve against `base_dir`.
pub fn parse_snapshot(content: &str, format: Format, base_dir: &Path) -> Result<ConfigSnapshot, SnapshotError> {
    let document: SnapshotDocument = match format {
        Format::Toml => toml::from_str(content)?,
        Format::Json => serde_json::from_str(content)?,
    };

    let mut snapshot = ConfigSnapshot {
        tls: records::<TlsBinding>("tls", document.tls).collect(),
        ..Default::default()
    };

    for route in records::<RouteRecord>("route", document.routes) {
        match (route.service, route.port) {
            (Some(service), Some(port)) => {
                snapshot.routes.push(RouteEntry::new(route.host, route.path, service, port));
            }
            _ => {
                tracing::warn!(host = %route.host, path = %route.path, "Route has no backend service, skipping");
            }
        }
    }

    for (name, secret) in secret_files(document.secrets) {
        match read_key_material(base_dir, &secret) {
            Ok(material) => {
                snapshot.secrets.insert(name, material);
            }
            Err(e) => {
                tracing::error!(secret = %name, error = %e, "Failed to read secret");
            }
        }
    }

    Ok(snapshot)
}

/// Directories holding files a snapshot document depends on.
pub fn referenced_dirs(path: &Path) -> Vec<PathBuf> {
    let base_dir = document_dir(path);
    let mut dirs = vec![base_dir.clone()];

    let document = fs::read_to_string(path).ok().and_then(|content| {
        match Format::from_path(path) {
            Format::Toml => toml::from_str::<SnapshotDocument>(&content).ok(),
            Format::Json => serde_json::from_str::<SnapshotDocument>(&content).ok(),
        }
    });

    for (_, secret) in document.into_iter().flat_map(|d| secret_files(d.secrets)) {
        for file in [secret.cert_file, secret.key_file] {
            if let Some(dir) = base_dir.join(file).parent() {
                if !dirs.iter().any(|d| d == dir) {
                    dirs.push(dir.to_path_buf());
                }
            }
        }
    }

    dirs
}

/// Convert untyped records, skipping the ones that do not fit `T`.
fn records<T: DeserializeOwned>(kind: &'static str, values: Vec<Value>) -> impl Iterator<Item = T> {
    values
        .into_iter()
        .enumerate()
        .filter_map(move |(index, value)| match serde_json::from_value(value) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::warn!(kind = %kind, index, error = %e, "Skipping malformed snapshot record");
                None
            }
        })
}

fn secret_files(secrets: HashMap<String, Value>) -> impl Iterator<Item = (String, SecretFiles)> {
    secrets
        .into_iter()
        .filter_map(|(name, value)| match serde_json::from_value(value) {
            Ok(files) => Some((name, files)),
            Err(e) => {
                tracing::warn!(secret = %name, error = %e, "Skipping malformed secret record");
                None
            }
        })
}

fn document_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn read_key_material(base_dir: &Path, secret: &SecretFiles) -> Result<KeyMaterial, SnapshotError> {
    let read = |file: &Path| {
        let path = base_dir.join(file);
        fs::read(&path).map_err(|source| SnapshotError::Io { path, source })
    };
    Ok(KeyMaterial::new(read(&secret.cert_file)?, read(&secret.key_file)?))
}
