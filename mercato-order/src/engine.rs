use mercato_catalog::{Item, StockLedger, Voucher};
use mercato_core::{AuthContext, RefundService, Role, User};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{ErrorKind, OrderError};
use crate::fulfillment::TrackingCodeGenerator;
use crate::models::Order;
use crate::orchestrator::RefundOrchestrator;
use crate::repository::{OrderStore, StoreTransaction};
use crate::settings::EngineSettings;

/// Orchestrates order creation, cancellation and the return workflow.
///
/// Every operation runs in a single store transaction and never retries on its own;
/// a [`OrderError::ConcurrencyConflict`] tells the caller to try again with fresh reads.
pub struct OrderEngine {
    pub(crate) store: Arc<dyn OrderStore>,
    pub(crate) refunds: RefundOrchestrator,
    pub(crate) tracking: Arc<dyn TrackingCodeGenerator>,
    pub(crate) settings: EngineSettings,
}

impl OrderEngine {
    pub fn new(
        store: Arc<dyn OrderStore>,
        refund_service: Arc<dyn RefundService>,
        tracking: Arc<dyn TrackingCodeGenerator>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            store,
            refunds: RefundOrchestrator::new(refund_service),
            tracking,
            settings,
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub(crate) async fn begin(&self) -> Result<Box<dyn StoreTransaction>, OrderError> {
        Ok(self.store.begin().await?)
    }
}

pub(crate) async fn load_user(
    tx: &mut dyn StoreTransaction,
    auth: &AuthContext,
) -> Result<User, OrderError> {
    tx.find_user(auth.user_id).await?
        .ok_or(OrderError::UserNotFound(auth.user_id))
}

pub(crate) async fn load_order(
    tx: &mut dyn StoreTransaction,
    order_id: Uuid,
) -> Result<Order, OrderError> {
    tx.find_order(order_id).await?
        .ok_or(OrderError::OrderNotFound(order_id))
}

pub(crate) async fn load_item(
    tx: &mut dyn StoreTransaction,
    item_id: Uuid,
) -> Result<Item, OrderError> {
    tx.find_item(item_id).await?
        .ok_or(OrderError::ItemNotFound(item_id))
}

pub(crate) async fn load_voucher(
    tx: &mut dyn StoreTransaction,
    voucher_id: Uuid,
) -> Result<Voucher, OrderError> {
    tx.find_voucher(voucher_id).await?
        .ok_or(OrderError::VoucherNotFound(voucher_id))
}

/// Only the customer who placed the order may act on it
pub(crate) fn authorize_customer(auth: &AuthContext, order: &Order) -> Result<(), OrderError> {
    if !auth.has_role(Role::Customer) {
        return Err(OrderError::NotPermitted("customer role required".to_string()));
    }
    if order.customer_id != auth.user_id {
        return Err(OrderError::NotPermitted(format!(
            "order {} belongs to another customer",
            order.id
        )));
    }
    Ok(())
}

/// Make sure every item referenced by `item_ids` is loaded into the ledger
pub(crate) async fn track_items(
    tx: &mut dyn StoreTransaction,
    ledger: &mut StockLedger,
    item_ids: impl IntoIterator<Item = Uuid>,
) -> Result<(), OrderError> {
    for item_id in item_ids {
        if !ledger.is_tracked(&item_id) {
            let item = load_item(tx, item_id).await?;
            ledger.track(item);
        }
    }
    Ok(())
}

/// Write every stock counter the ledger changed, in item id order
pub(crate) async fn write_stock(
    tx: &mut dyn StoreTransaction,
    ledger: &StockLedger,
) -> Result<(), OrderError> {
    for item in ledger.changed() {
        tx.update_item_stock(item).await?;
    }
    Ok(())
}

pub(crate) async fn write_vouchers(
    tx: &mut dyn StoreTransaction,
    vouchers: &mut [Voucher],
) -> Result<(), OrderError> {
    vouchers.sort_by_key(|v| v.id);
    for voucher in vouchers.iter() {
        tx.update_voucher_quantity(voucher).await?;
    }
    Ok(())
}

pub(crate) fn log_failure(operation: &'static str, error: &OrderError) {
    match error.kind() {
        ErrorKind::Internal => {
            tracing::error!(operation, code = error.code(), "Operation failed: {}", error)
        }
        _ => tracing::warn!(operation, code = error.code(), "Operation rejected: {}", error),
    }
}
