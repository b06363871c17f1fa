use chrono::{DateTime, Utc};
use mercato_catalog::StockLedger;
use mercato_core::AuthContext;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engine::{self, OrderEngine};
use crate::error::OrderError;
use crate::models::OrderStatus;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CancellationReceipt {
    pub order_id: Uuid,
    pub customer_id: Uuid,
    pub status: OrderStatus,
    pub refunded_amount: i64,
    pub refund_transaction_id: Option<String>,
    pub reason: String,
    pub cancelled_at: DateTime<Utc>,
}

impl OrderEngine {
    /// Cancel an order that has not been paid for yet.
    ///
    /// Restocks every item, gives back every voucher the order consumed and
    /// refunds the order total. If the refund fails nothing is committed.
    pub async fn cancel_order(
        &self,
        auth: &AuthContext,
        order_id: Uuid,
        reason: &str,
    ) -> Result<CancellationReceipt, OrderError> {
        self.cancel(auth, order_id, reason)
            .await
            .inspect_err(|e| engine::log_failure("cancel_order", e))
    }

    async fn cancel(
        &self,
        auth: &AuthContext,
        order_id: Uuid,
        reason: &str,
    ) -> Result<CancellationReceipt, OrderError> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(OrderError::Validation("a cancellation reason is required".to_string()));
        }

        let mut tx = self.begin().await?;
        engine::load_user(tx.as_mut(), auth).await?;
        let mut order = engine::load_order(tx.as_mut(), order_id).await?;
        engine::authorize_customer(auth, &order)?;

        if order.status != OrderStatus::PendingPayment {
            return Err(OrderError::NotPermitted(format!(
                "order {} is {} and can no longer be cancelled",
                order.id, order.status
            )));
        }

        let mut ledger = StockLedger::new();
        let item_ids: Vec<Uuid> = order.items().map(|i| i.item_id).collect();
        engine::track_items(tx.as_mut(), &mut ledger, item_ids).await?;
        for item in order.items() {
            ledger.release(&item.item_id, item.quantity)?;
        }

        let mut vouchers = Vec::new();
        for voucher_id in order.voucher_ids() {
            let mut voucher = engine::load_voucher(tx.as_mut(), voucher_id).await?;
            voucher.restore();
            vouchers.push(voucher);
        }

        let now = Utc::now();
        order.cancel(reason, now)?;

        engine::write_stock(tx.as_mut(), &ledger).await?;
        engine::write_vouchers(tx.as_mut(), &mut vouchers).await?;
        tx.update_order(&order).await?;

        // Writes are staged first so a stale order fails before any money moves
        let refund = if order.total_amount > 0 {
            Some(self.refunds.refund_cancellation(&order, reason).await?)
        } else {
            None
        };

        tx.commit().await?;

        tracing::info!(
            order_id = %order.id,
            customer_id = %order.customer_id,
            refunded_amount = order.total_amount,
            "Order cancelled"
        );

        Ok(CancellationReceipt {
            order_id: order.id,
            customer_id: order.customer_id,
            status: order.status,
            refunded_amount: refund.as_ref().map(|r| r.amount).unwrap_or(0),
            refund_transaction_id: refund.map(|r| r.id),
            reason: reason.to_string(),
            cancelled_at: now,
        })
    }
}
