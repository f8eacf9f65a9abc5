//! HTTP server setup and request dispatch.
//!
//! # Responsibilities
//! - Hold the current routing table and swap it on every snapshot
//! - Hold the listeners back until the first table is installed
//! - Serve plain HTTP and HTTPS (certificate chosen by SNI) side by side
//! - Forward requests to the upstream selected by host and path
//! - Observability (metrics, correlation IDs)

use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{
        header,
        uri::{PathAndQuery, Scheme},
        HeaderValue, Request, Uri, Version,
    },
    response::Response,
    routing::any,
    Router,
};
use axum_server::tls_rustls::RustlsConfig;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::{ListenerConfig, ProxyConfig};
use crate::http::request::{
    forwarded_for, propagate_request_id_layer, request_host, set_request_id_layer, RequestIdExt,
    X_FORWARDED_FOR,
};
use crate::http::response::{bad_gateway, not_found, strip_hop_by_hop};
use crate::lifecycle::ReadinessGate;
use crate::net::listener::{self, ListenerError};
use crate::net::tls::load_tls_config;
use crate::observability::metrics;
use crate::routing::snapshot::ConfigSnapshot;
use crate::routing::RoutingTable;
use crate::source::ConfigurationSink;

/// Reasons [`ProxyServer::run`] stops with an error.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Listener(#[from] ListenerError),

    #[error("invalid TLS configuration: {0}")]
    Tls(#[from] rustls::Error),
}

/// Application state injected into handlers.
#[derive(Clone)]
struct AppState {
    table: Arc<ArcSwap<RoutingTable>>,
    client: Client<HttpConnector, Body>,
}

/// The proxy dispatch server.
///
/// Starts with an empty routing table. Listeners are bound by [`run`](Self::run)
/// once [`update`](Self::update) has installed the first table.
pub struct ProxyServer {
    listener: ListenerConfig,
    request_timeout: Duration,
    ready: ReadinessGate,
    state: AppState,
}

impl ProxyServer {
    pub fn new(config: &ProxyConfig) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(Duration::from_secs(config.timeouts.connect_secs)));
        let client = Client::builder(TokioExecutor::new()).build(connector);

        Self {
            listener: config.listener.clone(),
            request_timeout: Duration::from_secs(config.timeouts.request_secs),
            ready: ReadinessGate::new(),
            state: AppState {
                table: Arc::new(ArcSwap::from_pointee(RoutingTable::empty())),
                client,
            },
        }
    }

    /// Build a routing table from `snapshot` and make it current.
    ///
    /// Requests and handshakes that already loaded the previous table finish
    /// against it. The first call opens the readiness gate.
    pub fn update(&self, snapshot: &ConfigSnapshot) {
        let table = RoutingTable::build(snapshot);

        tracing::info!(
            routes = table.route_count(),
            hosts = table.host_count(),
            certificates = table.certificate_count(),
            warnings = table.warnings().len(),
            "Routing table installed"
        );
        metrics::record_table_installed(
            table.route_count(),
            table.certificate_count(),
            table.warnings().len(),
        );

        self.state.table.store(Arc::new(table));

        if self.ready.set() {
            tracing::info!("First routing table installed, starting listeners");
        }
    }

    /// The routing table currently in use.
    pub fn routing_table(&self) -> Arc<RoutingTable> {
        self.state.table.load_full()
    }

    /// Whether a routing table has been installed.
    pub fn is_ready(&self) -> bool {
        self.ready.is_set()
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    pub fn router(&self) -> Router {
        Router::new()
            .route("/{*path}", any(proxy_handler))
            .route("/", any(proxy_handler))
            .with_state(self.state.clone())
            .layer(TimeoutLayer::new(self.request_timeout))
            .layer(propagate_request_id_layer())
            .layer(TraceLayer::new_for_http())
            .layer(set_request_id_layer())
    }

    /// Serve until `cancel` fires or a listener fails.
    ///
    /// Waits for the first routing table before binding anything; if `cancel`
    /// fires first, returns `Ok(())` without binding.
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), ServerError> {
        if !self.ready.wait(&cancel).await {
            tracing::info!("Cancelled before the first routing table arrived");
            return Ok(());
        }

        let http_addr = listener::socket_addr(&self.listener.bind_address, self.listener.port)?;
        let https_addr = listener::socket_addr(&self.listener.bind_address, self.listener.tls_port)?;
        let tls_config = load_tls_config(self.state.table.clone())?;

        let http_listener = listener::bind(http_addr).await?;
        let https_listener = listener::bind(https_addr).await?;

        let app = self.router();
        let grace = self.listener.shutdown_grace();

        tokio::try_join!(
            serve_http(http_listener, app.clone(), cancel.clone(), grace),
            serve_https(https_listener, tls_config, app, cancel.clone(), grace),
        )?;

        tracing::info!("Proxy server stopped");
        Ok(())
    }
}

impl ConfigurationSink for ProxyServer {
    fn on_configuration_change(&self, snapshot: ConfigSnapshot) {
        self.update(&snapshot);
    }
}

async fn serve_http(
    listener: TcpListener,
    app: Router,
    cancel: CancellationToken,
    grace: Duration,
) -> Result<(), ListenerError> {
    tracing::info!(address = ?listener.local_addr().ok(), "HTTP server starting");

    let server = axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(cancel.clone().cancelled_owned())
        .into_future();
    let deadline = async {
        cancel.cancelled().await;
        tokio::time::sleep(grace).await;
    };

    tokio::select! {
        result = server => result.map_err(|source| ListenerError::Serve { listener: "http", source }),
        _ = deadline => {
            tracing::warn!(grace = ?grace, "HTTP connections still open after grace period, closing");
            Ok(())
        }
    }
}

async fn serve_https(
    listener: TcpListener,
    tls_config: RustlsConfig,
    app: Router,
    cancel: CancellationToken,
    grace: Duration,
) -> Result<(), ListenerError> {
    tracing::info!(address = ?listener.local_addr().ok(), "HTTPS server starting");

    let listener = listener
        .into_std()
        .map_err(|source| ListenerError::Serve { listener: "https", source })?;

    let handle = axum_server::Handle::new();
    let shutdown = tokio::spawn({
        let handle = handle.clone();
        async move {
            cancel.cancelled().await;
            handle.graceful_shutdown(Some(grace));
        }
    });

    let result = axum_server::from_tcp_rustls(listener, tls_config)
        .handle(handle)
        .serve(app.into_make_service_with_connect_info::<SocketAddr>())
        .await;

    shutdown.abort();
    result.map_err(|source| ListenerError::Serve { listener: "https", source })
}

/// Main proxy handler.
/// Looks up the upstream in the current table and forwards the request.
async fn proxy_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start_time = Instant::now();
    let method = request.method().to_string();
    let request_id = request.request_id().to_string();
    let path = request.uri().path().to_string();

    // One table for the whole request, even if a reload lands meanwhile.
    let table = state.table.load_full();

    let upstream = match request_host(&request) {
        Some(host) => match table.get_backend(&host, &path) {
            Ok(upstream) => upstream,
            Err(e) => {
                tracing::debug!(request_id = %request_id, error = %e, "No route matched");
                metrics::record_request(&method, 404, "none", start_time);
                return not_found();
            }
        },
        None => {
            tracing::debug!(request_id = %request_id, path = %path, "Request has no host");
            metrics::record_request(&method, 404, "none", start_time);
            return not_found();
        }
    };

    tracing::debug!(
        request_id = %request_id,
        method = %method,
        path = %path,
        upstream = %upstream,
        "Proxying request"
    );

    let client_addr = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let (mut parts, body) = request.into_parts();

    let mut uri_parts = parts.uri.clone().into_parts();
    uri_parts.scheme = Some(Scheme::HTTP);
    uri_parts.authority = Some(upstream.authority().clone());
    if uri_parts.path_and_query.is_none() {
        uri_parts.path_and_query = Some(PathAndQuery::from_static("/"));
    }
    let uri = match Uri::from_parts(uri_parts) {
        Ok(uri) => uri,
        Err(e) => {
            tracing::warn!(request_id = %request_id, error = %e, "Failed to build upstream URI");
            metrics::record_request(&method, 502, &upstream.to_string(), start_time);
            return bad_gateway();
        }
    };

    // HTTP/2 requests carry the host in the authority only.
    if !parts.headers.contains_key(header::HOST) {
        if let Some(value) = parts
            .uri
            .authority()
            .and_then(|a| HeaderValue::from_str(a.as_str()).ok())
        {
            parts.headers.insert(header::HOST, value);
        }
    }

    strip_hop_by_hop(&mut parts.headers);
    if let Some(addr) = client_addr {
        if let Some(value) = forwarded_for(parts.headers.get(X_FORWARDED_FOR), addr.ip()) {
            parts.headers.insert(X_FORWARDED_FOR, value);
        }
    }
    parts.uri = uri;
    parts.version = Version::HTTP_11;

    let upstream_label = upstream.to_string();
    match state.client.request(Request::from_parts(parts, body)).await {
        Ok(response) => {
            let status = response.status();
            metrics::record_request(&method, status.as_u16(), &upstream_label, start_time);

            let (mut parts, body) = response.into_parts();
            strip_hop_by_hop(&mut parts.headers);
            Response::from_parts(parts, Body::new(body))
        }
        Err(e) => {
            tracing::warn!(
                request_id = %request_id,
                upstream = %upstream_label,
                error = %e,
                "Upstream request failed"
            );
            metrics::record_request(&method, 502, &upstream_label, start_time);
            bad_gateway()
        }
    }
}
