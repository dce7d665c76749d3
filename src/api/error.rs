//! Error types and axum `IntoResponse` implementation.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::version::error::{CatalogError, CheckError, GateError};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Check(#[from] CheckError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            // The client's own version is at fault; anything in the catalog is ours
            ApiError::Check(CheckError::Gate(GateError::InvalidClientVersion(_))) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Check(_) | ApiError::Catalog(_) | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed: {}", self);
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
