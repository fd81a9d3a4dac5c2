//! Error taxonomy shared by all services.
//!
//! Every failure leaves the core as a classified [`AppError`]; handlers return it
//! directly and the [`IntoResponse`] impl renders the standard error envelope.

use std::time::Duration;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::models::connection::ProbeFailure;
use crate::response::ApiResponse;

/// Result alias used across the workspace.
pub type AppResult<T> = Result<T, AppError>;

/// Application error type.
#[derive(Debug, Error)]
pub enum AppError {
    /// Malformed request body or parameter.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// A connection descriptor failed its probe.
    #[error("connection validation failed ({kind}): {message}")]
    ConnectionValidation { kind: ProbeFailure, message: String },

    #[error("connection name already registered: {0}")]
    DuplicateName(String),

    #[error("connection not found: {0}")]
    ConnectionNotFound(String),

    #[error("harvest timed out: {0}")]
    HarvestTimeout(String),

    #[error("harvest failed: {0}")]
    HarvestConnection(String),

    #[error("a harvest is already running for connection {0}")]
    HarvestInProgress(String),

    /// No harvest has ever completed for the connection.
    #[error("no metadata harvested for connection {0}")]
    MetadataNotFound(String),

    /// A snapshot broke one of its structural invariants.
    #[error("inconsistent metadata snapshot: {0}")]
    InvalidSnapshot(String),

    #[error("metadata store error: {0}")]
    MetadataStore(String),

    #[error("configuration store error: {0}")]
    ConfigStore(String),

    #[error("SQL generation failed: {0}")]
    Generation(String),

    #[error("SQL generation timed out after {0:?}")]
    GenerationTimeout(Duration),

    #[error("no SQL statement found in model response: {0}")]
    Extraction(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Stable error code for clients.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::InvalidRequest(_) => "INVALID_REQUEST",
            AppError::ConnectionValidation { .. } => "VALIDATION_ERROR",
            AppError::DuplicateName(_) => "DUPLICATE_NAME",
            AppError::ConnectionNotFound(_) => "CONNECTION_NOT_FOUND",
            AppError::HarvestTimeout(_) => "HARVEST_TIMEOUT",
            AppError::HarvestConnection(_) => "HARVEST_CONNECTION_ERROR",
            AppError::HarvestInProgress(_) => "HARVEST_IN_PROGRESS",
            AppError::MetadataNotFound(_) => "NOT_FOUND",
            AppError::InvalidSnapshot(_) => "INVALID_SNAPSHOT",
            AppError::MetadataStore(_) => "METADATA_STORE_ERROR",
            AppError::ConfigStore(_) => "CONFIG_STORE_ERROR",
            AppError::Generation(_) => "GENERATION_ERROR",
            AppError::GenerationTimeout(_) => "GENERATION_TIMEOUT",
            AppError::Extraction(_) => "EXTRACTION_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            AppError::ConnectionValidation { .. } | AppError::Extraction(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            AppError::DuplicateName(_) | AppError::HarvestInProgress(_) => StatusCode::CONFLICT,
            AppError::ConnectionNotFound(_) | AppError::MetadataNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            AppError::HarvestTimeout(_) | AppError::GenerationTimeout(_) => {
                StatusCode::GATEWAY_TIMEOUT
            }
            AppError::HarvestConnection(_) | AppError::Generation(_) => StatusCode::BAD_GATEWAY,
            AppError::InvalidSnapshot(_)
            | AppError::MetadataStore(_)
            | AppError::ConfigStore(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(code = self.code(), error = %self, "请求失败");
        } else {
            tracing::warn!(code = self.code(), error = %self, "请求被拒绝");
        }
        (status, Json(ApiResponse::err(self.code(), self.to_string()))).into_response()
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        AppError::InvalidRequest(errors.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(e: serde_json::Error) -> Self {
        AppError::MetadataStore(format!("serialization failed: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_harvest_errors_are_distinguishable() {
        let timeout = AppError::HarvestTimeout("sales".into());
        let failure = AppError::HarvestConnection("sales".into());
        assert_ne!(timeout.code(), failure.code());
        assert_eq!(timeout.status(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(failure.status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_validation_error_carries_kind() {
        let err = AppError::ConnectionValidation {
            kind: ProbeFailure::AuthFailed,
            message: "password authentication failed".into(),
        };
        assert_eq!(err.code(), "VALIDATION_ERROR");
        assert!(err.to_string().contains("auth-failed"));
    }

    #[test]
    fn test_generation_timeout_keeps_sub_second_precision() {
        let err = AppError::GenerationTimeout(Duration::from_millis(300));
        assert_eq!(err.to_string(), "SQL generation timed out after 300ms");
        assert_eq!(
            AppError::GenerationTimeout(Duration::from_secs(60)).to_string(),
            "SQL generation timed out after 60s"
        );
    }
}
