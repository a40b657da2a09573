//! Static assets and chat upgrades on the same paths.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, State, WebSocketUpgrade};
use axum::http::{header, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};

use crate::error::{AssetError, FALLBACK_NOT_FOUND_PAGE};
use crate::gateway::ws;
use crate::AppState;

/// Fallback handler: upgrades WebSocket requests, serves assets otherwise.
///
/// Browser clients open the chat socket on `/`, so any path may carry an
/// upgrade.
pub async fn asset_or_upgrade(
    State(state): State<Arc<AppState>>,
    upgrade: Option<WebSocketUpgrade>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    method: Method,
    uri: Uri,
) -> Response {
    if let Some(upgrade) = upgrade {
        return ws::upgrade(upgrade, state, connect_info.map(|ConnectInfo(addr)| addr));
    }

    if method != Method::GET && method != Method::HEAD {
        return (
            StatusCode::METHOD_NOT_ALLOWED,
            [(header::ALLOW, "GET, HEAD")],
            "Method Not Allowed",
        )
            .into_response();
    }

    let raw_path = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");

    match state.assets.load(raw_path).await {
        Ok(asset) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, asset.content_type)],
            asset.body,
        )
            .into_response(),
        Err(AssetError::NotFound) => not_found(&state).await,
        Err(e) => {
            tracing::warn!("Refused asset request {}: {}", raw_path, e);
            e.into_response()
        }
    }
}

async fn not_found(state: &AppState) -> Response {
    let page = &state.config.assets.not_found_page;
    let body = match tokio::fs::read(page).await {
        Ok(body) => body,
        Err(e) => {
            tracing::error!("Error reading {}: {}", page.display(), e);
            FALLBACK_NOT_FOUND_PAGE.as_bytes().to_vec()
        }
    };
    (
        StatusCode::NOT_FOUND,
        [(header::CONTENT_TYPE, "text/html")],
        body,
    )
        .into_response()
}
