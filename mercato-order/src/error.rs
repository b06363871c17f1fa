use chrono::{DateTime, Utc};
use mercato_catalog::{AmountOverflow, InventoryError, VoucherError};
use mercato_core::{RefundError, Role};
use serde::Serialize;
use uuid::Uuid;

use crate::lifecycle::InvalidTransition;
use crate::repository::StoreError;

/// Coarse classification every [`OrderError`] falls into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    Unauthorized,
    NotFound,
    Conflict,
    Validation,
    Internal,
}

/// Every way an order engine operation can fail
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OrderError {
    #[error("Missing or invalid identity token")]
    TokenInvalid,

    #[error("Role {0:?} required")]
    MissingRole(Role),

    #[error("User not found: {0}")]
    UserNotFound(Uuid),

    #[error("Cart item not found: {0}")]
    CartItemNotFound(Uuid),

    #[error("No delivery address found")]
    AddressNotFound,

    #[error("Item not found: {0}")]
    ItemNotFound(Uuid),

    #[error("Shop not found: {0}")]
    ShopNotFound(Uuid),

    #[error("Voucher not found: {0}")]
    VoucherNotFound(Uuid),

    #[error("Order not found: {0}")]
    OrderNotFound(Uuid),

    #[error("Order item not found: {0}")]
    OrderItemNotFound(Uuid),

    #[error("Return order not found: {0}")]
    ReturnOrderNotFound(Uuid),

    #[error("Return order item not found: {0}")]
    ReturnOrderItemNotFound(Uuid),

    #[error("Item out of stock: {0}")]
    OutOfStock(Uuid),

    #[error("Insufficient stock for {item_id}: requested {requested}, available {available}")]
    InsufficientStock {
        item_id: Uuid,
        requested: i32,
        available: i32,
    },

    #[error("Voucher {0} cannot be applied here")]
    VoucherNotApplicable(String),

    #[error("Voucher {0} is expired or not yet valid")]
    VoucherExpired(String),

    #[error("Voucher {code} requires a minimum spend of {required}, got {actual}")]
    MinSpendNotMet {
        code: String,
        required: i64,
        actual: i64,
    },

    #[error("Operation not permitted: {0}")]
    NotPermitted(String),

    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),

    #[error("Return order {return_order_id} is already {status}")]
    ReturnNotPending {
        return_order_id: Uuid,
        status: String,
    },

    #[error("Return period expired for order item {order_item_id} (delivered {delivered_at})")]
    ReturnPeriodExpired {
        order_item_id: Uuid,
        delivered_at: DateTime<Utc>,
    },

    #[error("Invalid return quantity for order item {order_item_id}: requested {requested}, ordered {ordered}")]
    QuantityReturnInvalid {
        order_item_id: Uuid,
        requested: i32,
        ordered: i32,
    },

    #[error("Concurrent update detected: {0}")]
    ConcurrencyConflict(String),

    #[error("Refund failed: {0}")]
    RefundFailed(#[from] RefundError),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(String),
}

impl OrderError {
    pub fn kind(&self) -> ErrorKind {
        use OrderError::*;
        match self {
            TokenInvalid | MissingRole(_) => ErrorKind::Unauthorized,
            UserNotFound(_)
            | CartItemNotFound(_)
            | AddressNotFound
            | ItemNotFound(_)
            | ShopNotFound(_)
            | VoucherNotFound(_)
            | OrderNotFound(_)
            | OrderItemNotFound(_)
            | ReturnOrderNotFound(_)
            | ReturnOrderItemNotFound(_) => ErrorKind::NotFound,
            OutOfStock(_)
            | InsufficientStock { .. }
            | VoucherNotApplicable(_)
            | VoucherExpired(_)
            | MinSpendNotMet { .. }
            | NotPermitted(_)
            | InvalidTransition(_)
            | ReturnNotPending { .. }
            | ReturnPeriodExpired { .. }
            | QuantityReturnInvalid { .. }
            | ConcurrencyConflict(_) => ErrorKind::Conflict,
            Validation(_) => ErrorKind::Validation,
            RefundFailed(_) | Database(_) => ErrorKind::Internal,
        }
    }

    /// Stable machine-readable code for API consumers
    pub fn code(&self) -> &'static str {
        use OrderError::*;
        match self {
            TokenInvalid => "TOKEN_INVALID",
            MissingRole(_) => "UNAUTHORIZED",
            UserNotFound(_) => "USER_NOT_FOUND",
            CartItemNotFound(_) => "CART_ITEM_NOT_FOUND",
            AddressNotFound => "ADDRESS_NOT_FOUND",
            ItemNotFound(_) => "ITEM_NOT_FOUND",
            ShopNotFound(_) => "SHOP_NOT_FOUND",
            VoucherNotFound(_) => "VOUCHER_NOT_FOUND",
            OrderNotFound(_) => "ORDER_NOT_FOUND",
            OrderItemNotFound(_) => "ORDER_ITEM_NOT_FOUND",
            ReturnOrderNotFound(_) => "RETURN_ORDER_NOT_FOUND",
            ReturnOrderItemNotFound(_) => "RETURN_ORDER_ITEM_NOT_FOUND",
            OutOfStock(_) => "OUT_OF_STOCK",
            InsufficientStock { .. } => "INSUFFICIENT_STOCK",
            VoucherNotApplicable(_) => "VOUCHER_NOT_APPLICABLE",
            VoucherExpired(_) => "VOUCHER_EXPIRED",
            MinSpendNotMet { .. } => "MIN_SPEND_NOT_MET",
            NotPermitted(_) => "NOT_PERMITTED",
            InvalidTransition(_) => "INVALID_TRANSITION",
            ReturnNotPending { .. } => "RETURN_NOT_PENDING",
            ReturnPeriodExpired { .. } => "RETURN_PERIOD_EXPIRED",
            QuantityReturnInvalid { .. } => "QUANTITY_RETURN_INVALID",
            ConcurrencyConflict(_) => "CONCURRENCY_CONFLICT",
            RefundFailed(_) => "REFUND_FAILED",
            Validation(_) => "VALIDATION_FAILED",
            Database(_) => "DATABASE_ERROR",
        }
    }

    /// Only concurrency collisions are worth retrying with fresh reads
    pub fn is_retryable(&self) -> bool {
        matches!(self, OrderError::ConcurrencyConflict(_))
    }
}

impl From<StoreError> for OrderError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict { .. } => OrderError::ConcurrencyConflict(err.to_string()),
            StoreError::Database(msg) => OrderError::Database(msg),
        }
    }
}

impl From<InventoryError> for OrderError {
    fn from(err: InventoryError) -> Self {
        match err {
            InventoryError::OutOfStock(item_id) => OrderError::OutOfStock(item_id),
            InventoryError::InsufficientStock { item_id, requested, available } => {
                OrderError::InsufficientStock { item_id, requested, available }
            }
            InventoryError::InvalidQuantity(q) => OrderError::Validation(format!("invalid quantity {}", q)),
            InventoryError::NotTracked(item_id) => OrderError::ItemNotFound(item_id),
        }
    }
}

impl From<AmountOverflow> for OrderError {
    fn from(err: AmountOverflow) -> Self {
        OrderError::Validation(err.to_string())
    }
}

impl From<VoucherError> for OrderError {
    fn from(err: VoucherError) -> Self {
        match err {
            VoucherError::NotApplicable(code) => OrderError::VoucherNotApplicable(code),
            VoucherError::Expired(code) | VoucherError::NotStarted(code) => OrderError::VoucherExpired(code),
            VoucherError::MinSpendNotMet { code, required, actual } => {
                OrderError::MinSpendNotMet { code, required, actual }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds() {
        assert_eq!(OrderError::TokenInvalid.kind(), ErrorKind::Unauthorized);
        assert_eq!(OrderError::MissingRole(Role::Seller).kind(), ErrorKind::Unauthorized);
        assert_eq!(OrderError::OrderNotFound(Uuid::nil()).kind(), ErrorKind::NotFound);
        assert_eq!(OrderError::OutOfStock(Uuid::nil()).kind(), ErrorKind::Conflict);
        assert_eq!(OrderError::ConcurrencyConflict("x".into()).kind(), ErrorKind::Conflict);
        assert_eq!(OrderError::Validation("x".into()).kind(), ErrorKind::Validation);
        assert_eq!(OrderError::Database("x".into()).kind(), ErrorKind::Internal);
    }

    #[test]
    fn test_store_error_conversion() {
        let conflict = StoreError::Conflict { entity: "item", id: Uuid::nil() };
        let err = OrderError::from(conflict);
        assert_eq!(err.code(), "CONCURRENCY_CONFLICT");
        assert!(err.is_retryable());

        let err = OrderError::from(StoreError::Database("connection reset".into()));
        assert_eq!(err, OrderError::Database("connection reset".into()));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_voucher_error_conversion() {
        let err = OrderError::from(VoucherError::NotStarted("EARLY".into()));
        assert_eq!(err, OrderError::VoucherExpired("EARLY".into()));

        let err = OrderError::from(VoucherError::MinSpendNotMet {
            code: "BIG".into(),
            required: 2500,
            actual: 200,
        });
        assert_eq!(err.code(), "MIN_SPEND_NOT_MET");
    }
}
