use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    routing::post,
    Extension, Json, Router,
};
use chrono::Utc;
use mercato_core::AuthContext;
use mercato_order::{CancellationReceipt, CreateOrderRequest, OrderError, ReturnReceipt, ReturnRequest};
use mercato_shared::models::events::{
    OrderCancelledEvent, OrderPlacedEvent, ReturnRequestedEvent, ORDER_CANCELLED_TOPIC,
    ORDER_PLACED_TOPIC, RETURN_REQUESTED_TOPIC,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateOrderResponse {
    pub order_id: Uuid,
    pub total_amount: i64,
    pub tracking_codes: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct CancelOrderRequest {
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct ReturnLine {
    pub order_item_id: Uuid,
    pub quantity: i32,
}

#[derive(Debug, Deserialize)]
pub struct CreateReturnRequest {
    pub items: Vec<ReturnLine>,
    #[serde(default)]
    pub reason: String,
}

impl TryFrom<CreateReturnRequest> for ReturnRequest {
    type Error = OrderError;

    fn try_from(body: CreateReturnRequest) -> Result<Self, Self::Error> {
        let mut items = BTreeMap::new();
        for line in body.items {
            if items.insert(line.order_item_id, line.quantity).is_some() {
                return Err(OrderError::Validation(format!(
                    "order item {} listed more than once",
                    line.order_item_id
                )));
            }
        }

        Ok(ReturnRequest { items, reason: body.reason })
    }
}

pub(crate) fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| AppError::BadRequest(rejection.body_text()))
}

// ============================================================================
// Routes
// ============================================================================

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/orders", post(create_order))
        .route("/v1/orders/{id}/cancel", post(cancel_order))
        .route("/v1/orders/{id}/returns", post(request_return))
}

async fn create_order(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    payload: Result<Json<CreateOrderRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CreateOrderResponse>), AppError> {
    let request = json_body(payload)?;
    let receipt = state.engine.create_order(&auth, request).await?;

    state.publish(
        ORDER_PLACED_TOPIC,
        receipt.order_id.to_string(),
        OrderPlacedEvent {
            order_id: receipt.order_id,
            customer_id: receipt.customer_id,
            shop_ids: receipt.shops.iter().map(|s| s.shop_id).collect(),
            total_amount: receipt.total_amount,
            timestamp: Utc::now().timestamp(),
        },
    );

    Ok((
        StatusCode::CREATED,
        Json(CreateOrderResponse {
            order_id: receipt.order_id,
            total_amount: receipt.total_amount,
            tracking_codes: receipt.tracking_codes(),
        }),
    ))
}

async fn cancel_order(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(order_id): Path<Uuid>,
    payload: Result<Json<CancelOrderRequest>, JsonRejection>,
) -> Result<Json<CancellationReceipt>, AppError> {
    let request = json_body(payload)?;
    let receipt = state.engine.cancel_order(&auth, order_id, &request.reason).await?;

    state.publish(
        ORDER_CANCELLED_TOPIC,
        receipt.order_id.to_string(),
        OrderCancelledEvent {
            order_id: receipt.order_id,
            customer_id: receipt.customer_id,
            refunded_amount: receipt.refunded_amount,
            refund_transaction_id: receipt.refund_transaction_id.clone(),
            reason: receipt.reason.clone(),
            timestamp: receipt.cancelled_at.timestamp(),
        },
    );

    Ok(Json(receipt))
}

async fn request_return(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(order_id): Path<Uuid>,
    payload: Result<Json<CreateReturnRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ReturnReceipt>), AppError> {
    let request = ReturnRequest::try_from(json_body(payload)?)?;
    let receipt = state.engine.request_return(&auth, order_id, request).await?;

    state.publish(
        RETURN_REQUESTED_TOPIC,
        receipt.return_order_id.to_string(),
        ReturnRequestedEvent {
            return_order_id: receipt.return_order_id,
            order_id: receipt.order_id,
            customer_id: receipt.customer_id,
            refund_amount: receipt.refund_amount,
            item_count: receipt.items.len(),
            timestamp: Utc::now().timestamp(),
        },
    );

    Ok((StatusCode::CREATED, Json(receipt)))
}
