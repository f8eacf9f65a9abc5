//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use ingress_proxy::config::ProxyConfig;
use ingress_proxy::lifecycle::Shutdown;
use ingress_proxy::routing::{ConfigSnapshot, KeyMaterial};
use ingress_proxy::{ProxyServer, ServerError};

/// Start a simple mock backend that returns a fixed response.
pub async fn start_mock_backend(addr: SocketAddr, response: &'static str) {
    let listener = TcpListener::bind(addr).await.unwrap();

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    tokio::spawn(async move {
                        read_request_head(&mut socket).await;
                        let response_str = format!(
                            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            response.len(),
                            response
                        );
                        let _ = socket.write_all(response_str.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });
}

/// Start a backend that answers with the request head it received as body.
pub async fn start_echo_backend(addr: SocketAddr) {
    let listener = TcpListener::bind(addr).await.unwrap();

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    tokio::spawn(async move {
                        let head = read_request_head(&mut socket).await;
                        let response_str = format!(
                            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\nX-Echo: yes\r\n\r\n{}",
                            head.len(),
                            head
                        );
                        let _ = socket.write_all(response_str.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });
}

async fn read_request_head(socket: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
        match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

/// Proxy config listening on loopback.
pub fn proxy_config(port: u16, tls_port: u16) -> ProxyConfig {
    let mut config = ProxyConfig::default();
    config.listener.bind_address = "127.0.0.1".into();
    config.listener.port = port;
    config.listener.tls_port = tls_port;
    config.listener.shutdown_grace_secs = 1;
    config
}

/// A running proxy and the means to stop it.
pub struct RunningProxy {
    pub server: Arc<ProxyServer>,
    pub shutdown: Shutdown,
    pub task: JoinHandle<Result<(), ServerError>>,
}

/// Install `snapshot`, start serving and wait for the plain listener.
pub async fn start_proxy(config: ProxyConfig, snapshot: ConfigSnapshot) -> RunningProxy {
    let addr: SocketAddr = format!("127.0.0.1:{}", config.listener.port).parse().unwrap();
    let server = Arc::new(ProxyServer::new(&config));
    server.update(&snapshot);

    let shutdown = Shutdown::new();
    let task = tokio::spawn({
        let server = server.clone();
        let cancel = shutdown.subscribe();
        async move { server.run(cancel).await }
    });

    assert!(wait_for_listener(addr).await, "proxy did not start listening");
    RunningProxy {
        server,
        shutdown,
        task,
    }
}

/// Poll until something accepts connections on `addr`.
pub async fn wait_for_listener(addr: SocketAddr) -> bool {
    for _ in 0..100 {
        if TcpStream::connect(addr).await.is_ok() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    false
}

/// Self-signed certificate and key for `names`.
pub fn self_signed(names: &[&str]) -> KeyMaterial {
    let names = names.iter().map(|n| n.to_string()).collect::<Vec<_>>();
    let rcgen::CertifiedKey { cert, key_pair } = rcgen::generate_simple_self_signed(names).unwrap();
    KeyMaterial::new(cert.pem(), key_pair.serialize_pem())
}

/// HTTP client that resolves `host` to loopback and trusts any certificate.
pub fn client_for(hosts: &[&str]) -> reqwest::Client {
    let loopback: SocketAddr = "127.0.0.1:0".parse().unwrap();
    let mut builder = reqwest::Client::builder()
        .no_proxy()
        .pool_max_idle_per_host(0)
        .danger_accept_invalid_certs(true)
        .timeout(Duration::from_secs(5));
    for host in hosts {
        builder = builder.resolve(host, loopback);
    }
    builder.build().unwrap()
}
