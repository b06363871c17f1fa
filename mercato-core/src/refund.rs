use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RefundKind {
    OrderCancellation,
    ItemReturn,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RefundStatus {
    Pending,
    Succeeded,
}

/// Everything the refund provider needs to move money back to the customer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RefundContext {
    pub kind: RefundKind,
    pub order_id: Uuid,
    /// Idempotency reference: the order id for cancellations, the return order item id for returns
    pub reference_id: Uuid,
    pub customer_id: Uuid,
    pub amount: i64,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RefundTransaction {
    pub id: String, // Provider's ID (e.g., re_123)
    pub reference_id: Uuid,
    pub amount: i64,
    pub status: RefundStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum RefundError {
    #[error("Refund rejected by provider: {0}")]
    Rejected(String),
    #[error("Refund provider unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait RefundService: Send + Sync {
    /// Issue a refund. Providers must treat a repeated `reference_id` as the same refund.
    async fn create_refund(&self, context: &RefundContext) -> Result<RefundTransaction, RefundError>;
}

/// In-process refund provider for tests and local runs.
///
/// Honours `reference_id` idempotency and can be told to fail every call.
pub struct MockRefundService {
    issued: Mutex<HashMap<Uuid, (RefundContext, RefundTransaction)>>,
    failure: Option<RefundError>,
}

impl MockRefundService {
    pub fn new() -> Self {
        Self {
            issued: Mutex::new(HashMap::new()),
            failure: None,
        }
    }

    pub fn failing(error: RefundError) -> Self {
        Self {
            issued: Mutex::new(HashMap::new()),
            failure: Some(error),
        }
    }

    /// Refunds issued so far, one per reference
    pub async fn issued(&self) -> Vec<RefundContext> {
        self.issued.lock().await.values().map(|(ctx, _)| ctx.clone()).collect()
    }

    pub async fn total_refunded(&self) -> i64 {
        self.issued.lock().await.values().map(|(_, tx)| tx.amount).sum()
    }
}

impl Default for MockRefundService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RefundService for MockRefundService {
    async fn create_refund(&self, context: &RefundContext) -> Result<RefundTransaction, RefundError> {
        if let Some(error) = &self.failure {
            tracing::warn!("Mock refund provider rejecting refund for {}", context.reference_id);
            return Err(error.clone());
        }

        let mut issued = self.issued.lock().await;
        if let Some((_, existing)) = issued.get(&context.reference_id) {
            return Ok(existing.clone());
        }

        let transaction = RefundTransaction {
            id: format!("mock_re_{}", context.reference_id.simple()),
            reference_id: context.reference_id,
            amount: context.amount,
            status: RefundStatus::Succeeded,
            created_at: Utc::now(),
        };
        issued.insert(context.reference_id, (context.clone(), transaction.clone()));

        tracing::info!("Mock refund {} issued for {} ({})", transaction.id, context.order_id, context.amount);
        Ok(transaction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(amount: i64) -> RefundContext {
        let order_id = Uuid::new_v4();
        RefundContext {
            kind: RefundKind::OrderCancellation,
            order_id,
            reference_id: order_id,
            customer_id: Uuid::new_v4(),
            amount,
            reason: "changed my mind".to_string(),
        }
    }

    #[tokio::test]
    async fn test_mock_refund_is_idempotent() {
        let service = MockRefundService::new();
        let ctx = context(1200);

        let first = service.create_refund(&ctx).await.unwrap();
        let second = service.create_refund(&ctx).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first.status, RefundStatus::Succeeded);
        assert_eq!(service.issued().await.len(), 1);
        assert_eq!(service.total_refunded().await, 1200);
    }

    #[tokio::test]
    async fn test_failing_mock() {
        let service = MockRefundService::failing(RefundError::Unavailable("gateway timeout".to_string()));

        let result = service.create_refund(&context(10)).await;
        assert!(matches!(result, Err(RefundError::Unavailable(_))));
        assert!(service.issued().await.is_empty());
    }
}
