use mercato_core::refund::{RefundContext, RefundError, RefundKind, RefundService, RefundTransaction};
use std::sync::Arc;

use crate::models::{Order, ReturnOrder, ReturnOrderItem};

/// Builds refund requests for the order flows and forwards them to the provider
pub struct RefundOrchestrator {
    service: Arc<dyn RefundService>,
}

impl RefundOrchestrator {
    pub fn new(service: Arc<dyn RefundService>) -> Self {
        Self { service }
    }

    /// Refund the full amount of a cancelled order. The order id is the idempotency reference.
    pub async fn refund_cancellation(
        &self,
        order: &Order,
        reason: &str,
    ) -> Result<RefundTransaction, RefundError> {
        let context = RefundContext {
            kind: RefundKind::OrderCancellation,
            order_id: order.id,
            reference_id: order.id,
            customer_id: order.customer_id,
            amount: order.total_amount,
            reason: reason.to_string(),
        };
        self.issue(&context).await
    }

    /// Refund one approved return item. The return item id is the idempotency reference.
    pub async fn refund_return_item(
        &self,
        return_order: &ReturnOrder,
        item: &ReturnOrderItem,
    ) -> Result<RefundTransaction, RefundError> {
        let context = RefundContext {
            kind: RefundKind::ItemReturn,
            order_id: return_order.order_id,
            reference_id: item.id,
            customer_id: return_order.customer_id,
            amount: item.refund_amount,
            reason: item.reason.clone(),
        };
        self.issue(&context).await
    }

    async fn issue(&self, context: &RefundContext) -> Result<RefundTransaction, RefundError> {
        match self.service.create_refund(context).await {
            Ok(transaction) => {
                tracing::info!(
                    order_id = %context.order_id,
                    reference_id = %context.reference_id,
                    amount = context.amount,
                    "Refund {} issued",
                    transaction.id
                );
                Ok(transaction)
            }
            Err(e) => {
                tracing::error!(
                    order_id = %context.order_id,
                    reference_id = %context.reference_id,
                    "Refund failed: {}",
                    e
                );
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DeliveryAddress;
    use chrono::Utc;
    use mercato_core::refund::MockRefundService;
    use mercato_shared::Masked;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_cancellation_refund_uses_order_total() {
        let service = Arc::new(MockRefundService::new());
        let orchestrator = RefundOrchestrator::new(service.clone());
        let address = DeliveryAddress {
            address_id: Uuid::new_v4(),
            recipient: Masked::new("Mai".to_string()),
            phone: Masked::new("0".to_string()),
            line: Masked::new("0".to_string()),
        };
        let mut order = Order::new(Uuid::new_v4(), address, Utc::now());
        order.total_amount = 4200;

        let transaction = orchestrator.refund_cancellation(&order, "too slow").await.unwrap();

        assert_eq!(transaction.amount, 4200);
        assert_eq!(transaction.reference_id, order.id);
        let issued = service.issued().await;
        assert_eq!(issued[0].kind, RefundKind::OrderCancellation);
        assert_eq!(issued[0].reason, "too slow");
    }
}
