//! Listener setup and graceful shutdown.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use axum::Router;
use axum_server::tls_rustls::RustlsConfig;
use axum_server::Handle;
use tokio::net::TcpListener;

use crate::config::Config;

/// Time given to open connections once shutdown starts.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum ServeError {
    #[error("Invalid listen address {addr}: {source}")]
    Address {
        addr: String,
        source: std::io::Error,
    },
    #[error("Failed to load TLS material ({cert:?}, {key:?}): {source}")]
    Tls {
        cert: PathBuf,
        key: PathBuf,
        source: std::io::Error,
    },
    #[error("Server error: {0}")]
    Io(#[from] std::io::Error),
}

/// Resolve the configured listen address.
pub async fn listen_addr(config: &Config) -> Result<SocketAddr, ServeError> {
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let mut resolved = tokio::net::lookup_host(addr.clone())
        .await
        .map_err(|source| ServeError::Address {
            addr: addr.clone(),
            source,
        })?;
    resolved.next().ok_or_else(|| ServeError::Address {
        addr,
        source: std::io::Error::new(std::io::ErrorKind::NotFound, "no address resolved"),
    })
}

/// Serve `app` on the configured address until Ctrl-C.
///
/// Uses TLS when `tls.enabled` is set. The certificate and key are read once
/// at startup; a missing or unreadable file aborts startup.
pub async fn serve(config: &Config, app: Router) -> Result<(), ServeError> {
    let addr = listen_addr(config).await?;

    if !config.tls.enabled {
        tracing::warn!("TLS disabled, serving plaintext");
        let listener = TcpListener::bind(addr).await?;
        return serve_listener(listener, app).await;
    }

    let tls = load_tls(config).await?;
    let listener = std::net::TcpListener::bind(addr)?;
    serve_tls_listener(listener, tls, app).await
}

/// Read the PEM certificate and key named in the `tls` section.
pub async fn load_tls(config: &Config) -> Result<RustlsConfig, ServeError> {
    RustlsConfig::from_pem_file(&config.tls.cert_path, &config.tls.key_path)
        .await
        .map_err(|source| ServeError::Tls {
            cert: config.tls.cert_path.clone(),
            key: config.tls.key_path.clone(),
            source,
        })
}

/// Serve `app` over TLS on an already bound listener until Ctrl-C.
pub async fn serve_tls_listener(
    listener: std::net::TcpListener,
    tls: RustlsConfig,
    app: Router,
) -> Result<(), ServeError> {
    listener.set_nonblocking(true)?;
    let addr = listener.local_addr()?;

    let handle = Handle::new();
    let shutdown_handle = handle.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        shutdown_handle.graceful_shutdown(Some(SHUTDOWN_GRACE));
    });

    tracing::info!("Listening on https://{}", addr);
    axum_server::from_tcp_rustls(listener, tls)
        .handle(handle)
        .serve(app.into_make_service_with_connect_info::<SocketAddr>())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

/// Serve `app` over plaintext on an already bound listener.
pub async fn serve_listener(listener: TcpListener, app: Router) -> Result<(), ServeError> {
    tracing::info!("Listening on http://{}", listener.local_addr()?);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
