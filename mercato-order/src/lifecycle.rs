use chrono::{DateTime, Utc};

use crate::models::{
    Order, OrderItem, OrderItemStatus, OrderShop, OrderShopStatus, OrderStatus, ReturnOrder,
    ReturnOrderItem, ReturnStatus,
};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid {entity} transition from {from} to {to}")]
pub struct InvalidTransition {
    pub entity: &'static str,
    pub from: String,
    pub to: String,
}

impl InvalidTransition {
    fn new(entity: &'static str, from: impl ToString, to: impl ToString) -> Self {
        Self {
            entity,
            from: from.to_string(),
            to: to.to_string(),
        }
    }
}

impl OrderStatus {
    /// PendingPayment → Completed | Cancelled
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!((self, next), (PendingPayment, Completed) | (PendingPayment, Cancelled))
    }
}

impl OrderShopStatus {
    /// PendingConfirmation → Confirmed → Shipping → Delivered; cancellable until shipped
    pub fn can_transition_to(&self, next: OrderShopStatus) -> bool {
        use OrderShopStatus::*;
        matches!(
            (self, next),
            (PendingConfirmation, Confirmed)
                | (PendingConfirmation, Cancelled)
                | (Confirmed, Shipping)
                | (Confirmed, Cancelled)
                | (Shipping, Delivered)
        )
    }
}

impl OrderItemStatus {
    /// Pending → Delivered → ReturnRequest → Returned | ReturnRejected.
    /// A Pending item of a delivered shop may enter a return directly.
    pub fn can_transition_to(&self, next: OrderItemStatus) -> bool {
        use OrderItemStatus::*;
        matches!(
            (self, next),
            (Pending, Delivered)
                | (Pending, Cancelled)
                | (Pending, ReturnRequest)
                | (Delivered, ReturnRequest)
                | (ReturnRequest, Returned)
                | (ReturnRequest, ReturnRejected)
        )
    }
}

impl ReturnStatus {
    pub fn can_transition_to(&self, next: ReturnStatus) -> bool {
        use ReturnStatus::*;
        matches!((self, next), (Pending, Approved) | (Pending, Rejected))
    }
}

impl Order {
    pub fn transition(&mut self, next: OrderStatus, now: DateTime<Utc>) -> Result<(), InvalidTransition> {
        if !self.status.can_transition_to(next) {
            return Err(InvalidTransition::new("order", self.status, next));
        }
        self.status = next;
        self.updated_at = now;
        Ok(())
    }

    /// Cancel the order together with every shop and item it owns
    pub fn cancel(&mut self, reason: &str, now: DateTime<Utc>) -> Result<(), InvalidTransition> {
        self.transition(OrderStatus::Cancelled, now)?;
        for shop in &mut self.shops {
            shop.transition(OrderShopStatus::Cancelled, now)?;
            for item in &mut shop.items {
                item.transition(OrderItemStatus::Cancelled)?;
            }
        }
        self.cancel_reason = Some(reason.to_string());
        self.cancelled_at = Some(now);
        Ok(())
    }
}

impl OrderShop {
    /// Move the shop forward. Reaching Delivered stamps `delivered_at` once
    /// and marks pending items delivered.
    pub fn transition(&mut self, next: OrderShopStatus, now: DateTime<Utc>) -> Result<(), InvalidTransition> {
        if !self.status.can_transition_to(next) {
            return Err(InvalidTransition::new("order shop", self.status, next));
        }
        self.status = next;

        if next == OrderShopStatus::Delivered {
            self.delivered_at.get_or_insert(now);
            for item in &mut self.items {
                if item.status == OrderItemStatus::Pending {
                    item.transition(OrderItemStatus::Delivered)?;
                }
            }
        }
        Ok(())
    }
}

impl OrderItem {
    pub fn transition(&mut self, next: OrderItemStatus) -> Result<(), InvalidTransition> {
        if !self.status.can_transition_to(next) {
            return Err(InvalidTransition::new("order item", self.status, next));
        }
        self.status = next;
        Ok(())
    }
}

impl ReturnOrderItem {
    pub fn approve(&mut self) -> Result<(), InvalidTransition> {
        if !self.status.can_transition_to(ReturnStatus::Approved) {
            return Err(InvalidTransition::new("return item", self.status, ReturnStatus::Approved));
        }
        self.status = ReturnStatus::Approved;
        Ok(())
    }

    pub fn reject(&mut self) -> Result<(), InvalidTransition> {
        if !self.status.can_transition_to(ReturnStatus::Rejected) {
            return Err(InvalidTransition::new("return item", self.status, ReturnStatus::Rejected));
        }
        self.status = ReturnStatus::Rejected;
        Ok(())
    }
}

impl ReturnOrder {
    /// Advance the return once every item has been decided.
    ///
    /// The return is Approved if any item was approved, Rejected otherwise.
    /// Returns whether the status changed.
    pub fn resolve_if_complete(&mut self, now: DateTime<Utc>) -> Result<bool, InvalidTransition> {
        if self.items.iter().any(|i| i.status == ReturnStatus::Pending) {
            return Ok(false);
        }

        let next = if self.items.iter().any(|i| i.status == ReturnStatus::Approved) {
            ReturnStatus::Approved
        } else {
            ReturnStatus::Rejected
        };

        if !self.status.can_transition_to(next) {
            return Err(InvalidTransition::new("return order", self.status, next));
        }
        self.status = next;
        self.updated_at = now;
        Ok(true)
    }
}
