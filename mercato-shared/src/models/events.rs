use uuid::Uuid;

pub const ORDER_PLACED_TOPIC: &str = "order.placed";
pub const ORDER_CANCELLED_TOPIC: &str = "order.cancelled";
pub const RETURN_REQUESTED_TOPIC: &str = "return.requested";
pub const RETURN_RESOLVED_TOPIC: &str = "return.resolved";

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct OrderPlacedEvent {
    pub order_id: Uuid,
    pub customer_id: Uuid,
    pub shop_ids: Vec<Uuid>,
    pub total_amount: i64,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct OrderCancelledEvent {
    pub order_id: Uuid,
    pub customer_id: Uuid,
    pub refunded_amount: i64,
    pub refund_transaction_id: Option<String>,
    pub reason: String,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct ReturnRequestedEvent {
    pub return_order_id: Uuid,
    pub order_id: Uuid,
    pub customer_id: Uuid,
    pub refund_amount: i64,
    pub item_count: usize,
    pub timestamp: i64,
}

/// Emitted after a seller approves or rejects items of a return
#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct ReturnResolvedEvent {
    pub return_order_id: Uuid,
    pub seller_id: Uuid,
    pub approved_item_ids: Vec<Uuid>,
    pub rejected_item_ids: Vec<Uuid>,
    pub refunded_amount: i64,
    /// Status of the whole return after this decision
    pub status: String,
    pub timestamp: i64,
}
