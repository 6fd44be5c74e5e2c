use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use pizzeria_core::ValidationError;
use pizzeria_storage::{PizzaError, RestaurantError, RestaurantPizzaError};

/// Errors surfaced by catalog handlers.
///
/// Validation failures keep their reason for logs and metrics, but the
/// response body is always the same generic payload.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("restaurant not found")]
    RestaurantNotFound,
    #[error("validation failed ({reason}): {detail}")]
    Validation { reason: &'static str, detail: String },
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::RestaurantNotFound => StatusCode::NOT_FOUND,
            Self::Validation { .. } => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Label used for the `result` dimension of request metrics.
    pub fn metric_label(&self) -> &'static str {
        match self {
            Self::RestaurantNotFound => "not_found",
            Self::Validation { .. } => "invalid",
            Self::Internal(_) => "error",
        }
    }

    pub fn invalid_json(err: serde_json::Error) -> Self {
        Self::Validation {
            reason: "invalid_json",
            detail: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            Self::RestaurantNotFound => json!({ "error": "Restaurant not found" }),
            Self::Validation { .. } => json!({ "errors": ["validation errors"] }),
            Self::Internal(message) => {
                error!(stage = "api", error = %message, "request failed");
                json!({ "error": "internal server error" })
            }
        };
        (status, Json(body)).into_response()
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        Self::Validation {
            reason: err.reason(),
            detail: err.to_string(),
        }
    }
}

impl From<RestaurantError> for ApiError {
    fn from(err: RestaurantError) -> Self {
        match err {
            RestaurantError::NotFound => Self::RestaurantNotFound,
            RestaurantError::Database(err) => Self::Internal(err.to_string()),
        }
    }
}

impl From<PizzaError> for ApiError {
    fn from(err: PizzaError) -> Self {
        match err {
            PizzaError::Database(err) => Self::Internal(err.to_string()),
        }
    }
}

/// Only the create route produces these, and every failure there answers
/// with the generic validation body.
impl From<RestaurantPizzaError> for ApiError {
    fn from(err: RestaurantPizzaError) -> Self {
        let detail = err.to_string();
        match err {
            RestaurantPizzaError::MissingReference => Self::Validation {
                reason: "missing_reference",
                detail,
            },
            RestaurantPizzaError::PriceOutOfRange(_) => Self::Validation {
                reason: "price_out_of_range",
                detail,
            },
            RestaurantPizzaError::Database(_) => Self::Validation {
                reason: "storage",
                detail,
            },
        }
    }
}
