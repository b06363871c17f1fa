use chrono::Utc;
use mercato_catalog::{pricing, StockLedger};
use mercato_core::{AuthContext, Role};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

use crate::engine::{self, OrderEngine};
use crate::error::OrderError;
use crate::models::{OrderItemStatus, ReturnOrder, ReturnOrderItem, ReturnStatus};
use crate::repository::StoreTransaction;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReturnRequest {
    /// order item id → quantity to send back
    pub items: BTreeMap<Uuid, i32>,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReturnItemReceipt {
    pub return_order_item_id: Uuid,
    pub order_item_id: Uuid,
    pub quantity: i32,
    pub refund_amount: i64,
    pub tracking_code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReturnReceipt {
    pub return_order_id: Uuid,
    pub order_id: Uuid,
    pub customer_id: Uuid,
    pub status: ReturnStatus,
    pub refund_amount: i64,
    pub items: Vec<ReturnItemReceipt>,
}

impl From<&ReturnOrder> for ReturnReceipt {
    fn from(return_order: &ReturnOrder) -> Self {
        Self {
            return_order_id: return_order.id,
            order_id: return_order.order_id,
            customer_id: return_order.customer_id,
            status: return_order.status,
            refund_amount: return_order.refund_amount,
            items: return_order.items.iter()
                .map(|i| ReturnItemReceipt {
                    return_order_item_id: i.id,
                    order_item_id: i.order_item_id,
                    quantity: i.quantity,
                    refund_amount: i.refund_amount,
                    tracking_code: i.tracking_code.clone(),
                })
                .collect(),
        }
    }
}

/// Outcome of a seller approving or rejecting return items
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReturnDecisionReceipt {
    pub return_order_id: Uuid,
    pub order_id: Uuid,
    pub seller_id: Uuid,
    pub status: ReturnStatus,
    pub approved_item_ids: Vec<Uuid>,
    pub rejected_item_ids: Vec<Uuid>,
    pub refunded_amount: i64,
    pub refund_transaction_ids: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Decision {
    Approve,
    Reject,
}

impl OrderEngine {
    /// Ask to send back delivered items of one order.
    pub async fn request_return(
        &self,
        auth: &AuthContext,
        order_id: Uuid,
        request: ReturnRequest,
    ) -> Result<ReturnReceipt, OrderError> {
        self.open_return(auth, order_id, request)
            .await
            .inspect_err(|e| engine::log_failure("request_return", e))
    }

    /// Approve return items: each is refunded and restocked.
    pub async fn approve_return_items(
        &self,
        auth: &AuthContext,
        return_order_id: Uuid,
        return_order_item_ids: &[Uuid],
    ) -> Result<ReturnDecisionReceipt, OrderError> {
        self.decide(auth, return_order_id, return_order_item_ids, Decision::Approve)
            .await
            .inspect_err(|e| engine::log_failure("approve_return_items", e))
    }

    /// Reject return items. Nothing is refunded or restocked.
    pub async fn reject_return_items(
        &self,
        auth: &AuthContext,
        return_order_id: Uuid,
        return_order_item_ids: &[Uuid],
    ) -> Result<ReturnDecisionReceipt, OrderError> {
        self.decide(auth, return_order_id, return_order_item_ids, Decision::Reject)
            .await
            .inspect_err(|e| engine::log_failure("reject_return_items", e))
    }

    async fn open_return(
        &self,
        auth: &AuthContext,
        order_id: Uuid,
        request: ReturnRequest,
    ) -> Result<ReturnReceipt, OrderError> {
        if request.items.is_empty() {
            return Err(OrderError::Validation("at least one item must be returned".to_string()));
        }

        let mut tx = self.begin().await?;
        engine::load_user(tx.as_mut(), auth).await?;
        let mut order = engine::load_order(tx.as_mut(), order_id).await?;
        engine::authorize_customer(auth, &order)?;

        let now = Utc::now();
        let window = self.settings.return_window();
        let mut return_order = ReturnOrder::new(order.id, auth.user_id, request.reason.clone(), now);

        for (&order_item_id, &quantity) in &request.items {
            let (shop, item) = order.find_item(order_item_id)
                .ok_or(OrderError::OrderItemNotFound(order_item_id))?;

            let delivered_at = match shop.delivered_at {
                Some(at) if shop.is_delivered() => at,
                _ => {
                    return Err(OrderError::NotPermitted(format!(
                        "order shop {} has not been delivered",
                        shop.id
                    )))
                }
            };

            if now - delivered_at > window {
                return Err(OrderError::ReturnPeriodExpired { order_item_id, delivered_at });
            }

            if quantity < 1 || quantity > item.quantity {
                return Err(OrderError::QuantityReturnInvalid {
                    order_item_id,
                    requested: quantity,
                    ordered: item.quantity,
                });
            }

            if item.in_return_flow() {
                return Err(OrderError::NotPermitted(format!(
                    "order item {} is already {}",
                    order_item_id, item.status
                )));
            }

            let gross = pricing::line_total(item.unit_price, quantity)?;
            let refund = gross - pricing::prorated_share(shop.discount, gross, shop.subtotal);

            return_order.add_item(ReturnOrderItem::new(
                return_order.id,
                shop,
                item,
                quantity,
                refund,
                request.reason.clone(),
                self.tracking.next_code(),
            ));
        }

        for &order_item_id in request.items.keys() {
            order.find_item_mut(order_item_id)
                .ok_or(OrderError::OrderItemNotFound(order_item_id))?
                .transition(OrderItemStatus::ReturnRequest)?;
        }

        tx.update_order(&order).await?;
        tx.insert_return_order(&return_order).await?;
        tx.commit().await?;

        tracing::info!(
            return_order_id = %return_order.id,
            order_id = %order.id,
            items = return_order.items.len(),
            refund_amount = return_order.refund_amount,
            "Return requested"
        );

        Ok(ReturnReceipt::from(&return_order))
    }

    async fn decide(
        &self,
        auth: &AuthContext,
        return_order_id: Uuid,
        item_ids: &[Uuid],
        decision: Decision,
    ) -> Result<ReturnDecisionReceipt, OrderError> {
        if item_ids.is_empty() {
            return Err(OrderError::Validation("at least one return item is required".to_string()));
        }
        if !auth.has_role(Role::Seller) {
            return Err(OrderError::MissingRole(Role::Seller));
        }

        let mut tx = self.begin().await?;
        let seller = engine::load_user(tx.as_mut(), auth).await?;
        let mut return_order = tx.find_return_order(return_order_id).await?
            .ok_or(OrderError::ReturnOrderNotFound(return_order_id))?;

        let targets = resolve_seller_items(tx.as_mut(), &return_order, seller.id, item_ids).await?;

        if return_order.status != ReturnStatus::Pending {
            return Err(OrderError::ReturnNotPending {
                return_order_id,
                status: return_order.status.to_string(),
            });
        }
        for id in &targets {
            if let Some(item) = return_order.find_item(*id) {
                if item.status != ReturnStatus::Pending {
                    return Err(OrderError::ReturnNotPending {
                        return_order_id,
                        status: format!("{} for item {}", item.status, id),
                    });
                }
            }
        }

        let mut order = engine::load_order(tx.as_mut(), return_order.order_id).await?;
        let mut ledger = StockLedger::new();
        let mut refunded_amount = 0;
        let mut refund_transaction_ids = Vec::new();

        // Stage item and order changes, then refund, then persist
        let mut staged: Vec<(Uuid, Uuid, i32)> = Vec::new();
        for id in &targets {
            let item = return_order.find_item_mut(*id)
                .ok_or(OrderError::ReturnOrderItemNotFound(*id))?;
            staged.push((item.order_item_id, item.item_id, item.quantity));

            match decision {
                Decision::Approve => item.approve()?,
                Decision::Reject => item.reject()?,
            }
        }

        for &(order_item_id, item_id, quantity) in &staged {
            let order_item = order.find_item_mut(order_item_id)
                .ok_or(OrderError::OrderItemNotFound(order_item_id))?;

            match decision {
                Decision::Approve => {
                    order_item.transition(OrderItemStatus::Returned)?;
                    engine::track_items(tx.as_mut(), &mut ledger, [item_id]).await?;
                    ledger.release(&item_id, quantity)?;
                }
                Decision::Reject => order_item.transition(OrderItemStatus::ReturnRejected)?,
            }
        }

        return_order.resolve_if_complete(Utc::now())?;

        engine::write_stock(tx.as_mut(), &ledger).await?;
        tx.update_order(&order).await?;

        // Refunds go out one by one before commit. If refund k fails, refunds
        // 1..k-1 have already been paid while every staged write rolls back.
        // Nothing compensates them here: a retry sends the same return item
        // ids as idempotency references, so the provider hands back the
        // earlier transactions instead of paying twice.
        if decision == Decision::Approve {
            for id in &targets {
                let Some(item) = return_order.find_item(*id).cloned() else {
                    continue;
                };
                let transaction = self.refunds.refund_return_item(&return_order, &item).await?;
                refunded_amount += transaction.amount;
                if let Some(stored) = return_order.find_item_mut(*id) {
                    stored.refund_transaction_id = Some(transaction.id.clone());
                }
                refund_transaction_ids.push(transaction.id);
            }
        }

        tx.update_return_order(&return_order).await?;
        tx.commit().await?;

        let (approved_item_ids, rejected_item_ids) = match decision {
            Decision::Approve => (targets, Vec::new()),
            Decision::Reject => (Vec::new(), targets),
        };

        tracing::info!(
            return_order_id = %return_order.id,
            seller_id = %seller.id,
            approved = approved_item_ids.len(),
            rejected = rejected_item_ids.len(),
            status = %return_order.status,
            "Return items decided"
        );

        Ok(ReturnDecisionReceipt {
            return_order_id: return_order.id,
            order_id: return_order.order_id,
            seller_id: seller.id,
            status: return_order.status,
            approved_item_ids,
            rejected_item_ids,
            refunded_amount,
            refund_transaction_ids,
        })
    }
}

/// Every requested id must be an item of this return and belong to a shop the seller owns.
/// Duplicates collapse; request order is kept.
async fn resolve_seller_items(
    tx: &mut dyn StoreTransaction,
    return_order: &ReturnOrder,
    seller_id: Uuid,
    item_ids: &[Uuid],
) -> Result<Vec<Uuid>, OrderError> {
    let mut owned_shops: HashMap<Uuid, bool> = HashMap::new();
    let mut targets = Vec::with_capacity(item_ids.len());

    for &id in item_ids {
        let item = return_order.find_item(id)
            .ok_or(OrderError::ReturnOrderItemNotFound(id))?;

        let owned = match owned_shops.get(&item.shop_id) {
            Some(owned) => *owned,
            None => {
                let owned = tx.find_shop(item.shop_id).await?
                    .map(|s| s.is_owned_by(seller_id))
                    .unwrap_or(false);
                owned_shops.insert(item.shop_id, owned);
                owned
            }
        };
        if !owned {
            return Err(OrderError::ReturnOrderItemNotFound(id));
        }

        if !targets.contains(&id) {
            targets.push(id);
        }
    }
    Ok(targets)
}
