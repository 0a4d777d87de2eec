//! Query engine error types.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Errors raised while validating, planning or executing a list query.
#[derive(Debug, Error)]
pub enum QueryError {
    /// The raw filter string does not follow `field:operation:value`.
    #[error("malformed filter '{raw}': {reason}")]
    MalformedFilter { raw: String, reason: String },

    /// The field (after alias resolution) is not in the entity's filter allow-list.
    #[error("filtering on field '{field}' is not allowed")]
    DisallowedField { field: String },

    /// The raw value could not be cast to the field's declared type.
    #[error("invalid filter value '{value}' for field '{field}': {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    /// The operation cannot be applied to a field of this type.
    #[error("operation {operation} is not supported on {field_type} field '{field}'")]
    UnsupportedOperation {
        field: String,
        operation: &'static str,
        field_type: &'static str,
    },

    /// The entity's metadata contract is inconsistent.
    #[error("invalid query metadata for '{entity}': {reason}")]
    InvalidMetadata { entity: String, reason: String },

    #[error("database error")]
    Database(#[from] sqlx::Error),
}

impl QueryError {
    /// Whether the error was caused by the request rather than the server.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            QueryError::MalformedFilter { .. }
                | QueryError::DisallowedField { .. }
                | QueryError::InvalidValue { .. }
                | QueryError::UnsupportedOperation { .. }
        )
    }

    /// HTTP status the error maps to.
    pub fn status_code(&self) -> StatusCode {
        if self.is_client_error() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }

    pub(crate) fn invalid_value(
        field: &str,
        value: &str,
        reason: impl Into<String>,
    ) -> QueryError {
        QueryError::InvalidValue {
            field: field.to_string(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

impl IntoResponse for QueryError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Validation errors are shown verbatim; server-side details only reach the log
        let body = match &self {
            QueryError::Database(e) => {
                tracing::error!(error = %e, "list query failed in the database");
                "internal server error".to_string()
            }
            QueryError::InvalidMetadata { entity, reason } => {
                tracing::error!(entity = %entity, reason = %reason, "invalid query metadata");
                "internal server error".to_string()
            }
            _ => self.to_string(),
        };

        (status, body).into_response()
    }
}

/// Result type alias using QueryError.
pub type QueryResult<T> = Result<T, QueryError>;
