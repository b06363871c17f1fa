use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use mercato_order::{ErrorKind, OrderError};
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Order(#[from] OrderError),
    #[error("Invalid request body: {0}")]
    BadRequest(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Order(e) => match e.kind() {
                ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
                ErrorKind::NotFound => StatusCode::NOT_FOUND,
                ErrorKind::Conflict => StatusCode::CONFLICT,
                ErrorKind::Validation => StatusCode::BAD_REQUEST,
                ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            },
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::Order(e) => e.code(),
            AppError::BadRequest(_) => "VALIDATION_FAILED",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();

        let error_message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!("Internal Server Error: {}", self);
            "Internal Server Error".to_string()
        } else {
            self.to_string()
        };

        let body = Json(json!({
            "error": error_message,
            "code": code,
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mercato_core::{RefundError, Role};
    use uuid::Uuid;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (OrderError::TokenInvalid, StatusCode::UNAUTHORIZED),
            (OrderError::MissingRole(Role::Seller), StatusCode::UNAUTHORIZED),
            (OrderError::OrderNotFound(Uuid::nil()), StatusCode::NOT_FOUND),
            (OrderError::ConcurrencyConflict("item".into()), StatusCode::CONFLICT),
            (OrderError::VoucherExpired("SALE".into()), StatusCode::CONFLICT),
            (OrderError::Validation("empty".into()), StatusCode::BAD_REQUEST),
            (OrderError::RefundFailed(RefundError::Rejected("no".into())), StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (error, expected) in cases {
            assert_eq!(AppError::from(error).status(), expected);
        }
    }

    #[test]
    fn test_internal_message_hidden() {
        let response = AppError::from(OrderError::Database("password authentication failed".into())).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let response = AppError::BadRequest("missing field `cart_item_ids`".into()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
