use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use sea_orm::SqlErr;
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{resource} not found with {field}: '{value}'")]
    NotFound {
        resource: &'static str,
        field: &'static str,
        value: String,
    },

    #[error("{0}")]
    Conflict(String),

    #[error("Bad Request {0}")]
    BadRequest(String),

    #[error("Insufficient stock for product {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: Uuid,
        requested: i32,
        available: i32,
    },

    #[error("Invalid total price: expected {expected}, got {actual}")]
    InvalidTotalPrice { expected: i64, actual: i64 },

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden")]
    Forbidden,

    #[error("Database error")]
    DbError(#[from] sqlx::Error),

    #[error("ORM error")]
    OrmError(#[from] sea_orm::DbErr),

    #[error("Internal Server Error")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn not_found(resource: &'static str, field: &'static str, value: impl ToString) -> Self {
        AppError::NotFound {
            resource,
            field,
            value: value.to_string(),
        }
    }

    /// Turns unique and foreign-key violations into `Conflict`; other database errors pass through.
    pub fn from_constraint(err: sea_orm::DbErr, message: impl Into<String>) -> Self {
        match err.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(_))
            | Some(SqlErr::ForeignKeyConstraintViolation(_)) => AppError::Conflict(message.into()),
            _ => AppError::OrmError(err),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound { .. } => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::BadRequest(_)
            | AppError::InsufficientStock { .. }
            | AppError::InvalidTotalPrice { .. } => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::DbError(_) | AppError::OrmError(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    pub error: String,
    pub code: u16,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        match &self {
            AppError::DbError(err) => tracing::error!(error = %err, "database error"),
            AppError::OrmError(err) => tracing::error!(error = %err, "orm error"),
            AppError::Internal(err) => tracing::error!(error = ?err, "internal error"),
            _ => {}
        }

        let body = ErrorBody {
            error: self.to_string(),
            code: status.as_u16(),
        };

        (status, axum::Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[test]
    fn not_found_message_names_resource_field_and_value() {
        let err = AppError::not_found("Product", "id", 42);
        assert_eq!(err.to_string(), "Product not found with id: '42'");
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn business_rule_violations_are_bad_requests() {
        let stock = AppError::InsufficientStock {
            product_id: Uuid::nil(),
            requested: 3,
            available: 1,
        };
        let price = AppError::InvalidTotalPrice {
            expected: 1100,
            actual: 1000,
        };
        assert_eq!(stock.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(price.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            AppError::Conflict("dup".into()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::Unauthorized("expired".into()).status_code(),
            StatusCode::UNAUTHORIZED
        );
    }

    #[tokio::test]
    async fn error_body_carries_message_and_code() {
        let response = AppError::Conflict("Role ADMIN already exists".into()).into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"], "Role ADMIN already exists");
        assert_eq!(body["code"], 409);
    }

    #[tokio::test]
    async fn internal_errors_do_not_leak_details() {
        let response = AppError::Internal(anyhow::anyhow!("connection refused")).into_response();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"], "Internal Server Error");
        assert_eq!(body["code"], 500);
    }
}
