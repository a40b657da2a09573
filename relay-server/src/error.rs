//! Error types for asset serving.

use std::io;

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};

/// Built-in body used when the configured 404 page cannot be read.
pub const FALLBACK_NOT_FOUND_PAGE: &str =
    "<!DOCTYPE html><html><head><title>404 Not Found</title></head>\
     <body><h1>404 Not Found</h1></body></html>";

/// Why a path was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForbiddenReason {
    InvalidCharacters,
    DisallowedType,
    Traversal,
}

impl ForbiddenReason {
    pub fn message(self) -> &'static str {
        match self {
            ForbiddenReason::InvalidCharacters => "Forbidden: Invalid path characters",
            ForbiddenReason::DisallowedType => "Forbidden: Disallowed file type",
            ForbiddenReason::Traversal => "Forbidden: Attempted directory traversal",
        }
    }
}

/// Error types for asset resolution.
#[derive(Debug, thiserror::Error)]
pub enum AssetError {
    #[error("{}", .0.message())]
    Forbidden(ForbiddenReason),

    #[error("Asset not found")]
    NotFound,

    #[error("Server Error: {0:?}")]
    ServerError(io::ErrorKind),
}

impl AssetError {
    pub fn status(&self) -> StatusCode {
        match self {
            AssetError::Forbidden(_) => StatusCode::FORBIDDEN,
            AssetError::NotFound => StatusCode::NOT_FOUND,
            AssetError::ServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<io::Error> for AssetError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => AssetError::NotFound,
            kind => AssetError::ServerError(kind),
        }
    }
}

impl IntoResponse for AssetError {
    fn into_response(self) -> Response {
        let status = self.status();
        match self {
            AssetError::NotFound => (
                status,
                [(header::CONTENT_TYPE, "text/html")],
                FALLBACK_NOT_FOUND_PAGE,
            )
                .into_response(),
            other => (
                status,
                [(header::CONTENT_TYPE, "text/plain")],
                other.to_string(),
            )
                .into_response(),
        }
    }
}

pub type Result<T> = std::result::Result<T, AssetError>;
