use axum::{
    extract::{rejection::JsonRejection, Path, State},
    routing::post,
    Extension, Json, Router,
};
use chrono::Utc;
use mercato_core::AuthContext;
use mercato_order::ReturnDecisionReceipt;
use mercato_shared::models::events::{ReturnResolvedEvent, RETURN_RESOLVED_TOPIC};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::orders::json_body;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ReturnDecisionRequest {
    pub return_order_item_ids: Vec<Uuid>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/returns/{id}/approve", post(approve_return))
        .route("/v1/returns/{id}/reject", post(reject_return))
}

async fn approve_return(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(return_order_id): Path<Uuid>,
    payload: Result<Json<ReturnDecisionRequest>, JsonRejection>,
) -> Result<Json<ReturnDecisionReceipt>, AppError> {
    let request = json_body(payload)?;
    let receipt = state.engine
        .approve_return_items(&auth, return_order_id, &request.return_order_item_ids)
        .await?;

    announce(&state, &receipt);
    Ok(Json(receipt))
}

async fn reject_return(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(return_order_id): Path<Uuid>,
    payload: Result<Json<ReturnDecisionRequest>, JsonRejection>,
) -> Result<Json<ReturnDecisionReceipt>, AppError> {
    let request = json_body(payload)?;
    let receipt = state.engine
        .reject_return_items(&auth, return_order_id, &request.return_order_item_ids)
        .await?;

    announce(&state, &receipt);
    Ok(Json(receipt))
}

fn announce(state: &AppState, receipt: &ReturnDecisionReceipt) {
    state.publish(
        RETURN_RESOLVED_TOPIC,
        receipt.return_order_id.to_string(),
        ReturnResolvedEvent {
            return_order_id: receipt.return_order_id,
            seller_id: receipt.seller_id,
            approved_item_ids: receipt.approved_item_ids.clone(),
            rejected_item_ids: receipt.rejected_item_ids.clone(),
            refunded_amount: receipt.refunded_amount,
            status: receipt.status.as_str().to_string(),
            timestamp: Utc::now().timestamp(),
        },
    );
}
