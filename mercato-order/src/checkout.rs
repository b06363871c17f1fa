use chrono::Utc;
use mercato_catalog::{CartItem, StockLedger, Voucher, VoucherTarget};
use mercato_core::{Address, AuthContext, User};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use crate::engine::{self, OrderEngine};
use crate::error::OrderError;
use crate::models::{DeliveryAddress, Order, OrderItem, OrderShop, OrderStatus};
use crate::repository::StoreTransaction;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateOrderRequest {
    pub cart_item_ids: Vec<Uuid>,
    /// shop id → voucher id
    #[serde(default)]
    pub shop_vouchers: HashMap<Uuid, Uuid>,
    #[serde(default)]
    pub shipping_voucher_id: Option<Uuid>,
    /// Falls back to the customer's default address
    #[serde(default)]
    pub address_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ShopReceipt {
    pub order_shop_id: Uuid,
    pub shop_id: Uuid,
    pub tracking_code: String,
    pub subtotal: i64,
    pub discount: i64,
    pub shipping_fee: i64,
    pub total: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OrderReceipt {
    pub order_id: Uuid,
    pub customer_id: Uuid,
    pub status: OrderStatus,
    pub subtotal: i64,
    pub product_discount: i64,
    pub shipping_fee: i64,
    pub shipping_discount: i64,
    pub total_amount: i64,
    pub shops: Vec<ShopReceipt>,
}

impl OrderReceipt {
    pub fn tracking_codes(&self) -> Vec<String> {
        self.shops.iter().map(|s| s.tracking_code.clone()).collect()
    }
}

impl From<&Order> for OrderReceipt {
    fn from(order: &Order) -> Self {
        Self {
            order_id: order.id,
            customer_id: order.customer_id,
            status: order.status,
            subtotal: order.subtotal,
            product_discount: order.product_discount,
            shipping_fee: order.shipping_fee,
            shipping_discount: order.shipping_discount,
            total_amount: order.total_amount,
            shops: order.shops.iter()
                .map(|s| ShopReceipt {
                    order_shop_id: s.id,
                    shop_id: s.shop_id,
                    tracking_code: s.tracking_code.clone(),
                    subtotal: s.subtotal,
                    discount: s.discount,
                    shipping_fee: s.shipping_fee,
                    total: s.total,
                })
                .collect(),
        }
    }
}

/// Cart lines of one shop, in the order they appeared in the request
struct ShopGroup {
    shop_id: Uuid,
    lines: Vec<CartItem>,
}

/// Groups by the shop that owns the item. The cart row's own shop id is a
/// denormalized copy and is not trusted.
fn group_by_shop(ledger: &StockLedger, lines: Vec<CartItem>) -> Result<Vec<ShopGroup>, OrderError> {
    let mut groups: Vec<ShopGroup> = Vec::new();
    for line in lines {
        let shop_id = ledger.get(&line.item_id)
            .map(|item| item.shop_id)
            .ok_or(OrderError::ItemNotFound(line.item_id))?;
        if line.shop_id != shop_id {
            tracing::warn!(
                cart_item_id = %line.id,
                cart_shop_id = %line.shop_id,
                item_shop_id = %shop_id,
                "Cart line names a stale shop"
            );
        }

        match groups.iter_mut().find(|g| g.shop_id == shop_id) {
            Some(group) => group.lines.push(line),
            None => groups.push(ShopGroup {
                shop_id,
                lines: vec![line],
            }),
        }
    }
    Ok(groups)
}

impl OrderEngine {
    /// Turn selected cart items into a multi-shop order.
    ///
    /// Stock and voucher quantities are decremented in the same transaction that
    /// inserts the order, so a failure anywhere leaves them untouched.
    pub async fn create_order(
        &self,
        auth: &AuthContext,
        request: CreateOrderRequest,
    ) -> Result<OrderReceipt, OrderError> {
        self.place_order(auth, request)
            .await
            .inspect_err(|e| engine::log_failure("create_order", e))
    }

    async fn place_order(
        &self,
        auth: &AuthContext,
        request: CreateOrderRequest,
    ) -> Result<OrderReceipt, OrderError> {
        if request.cart_item_ids.is_empty() {
            return Err(OrderError::Validation("at least one cart item is required".to_string()));
        }
        let mut seen = HashSet::new();
        if let Some(dup) = request.cart_item_ids.iter().find(|id| !seen.insert(**id)) {
            return Err(OrderError::Validation(format!("cart item {} listed twice", dup)));
        }

        let mut tx = self.begin().await?;
        let user = engine::load_user(tx.as_mut(), auth).await?;
        let lines = load_cart_lines(tx.as_mut(), &user, &request.cart_item_ids).await?;
        let address = resolve_address(tx.as_mut(), &user, request.address_id).await?;

        let now = Utc::now();
        let mut order = Order::new(user.id, DeliveryAddress::from(&address), now);
        let mut ledger = StockLedger::new();
        let mut vouchers: Vec<Voucher> = Vec::new();

        engine::track_items(tx.as_mut(), &mut ledger, lines.iter().map(|l| l.item_id).collect::<Vec<Uuid>>()).await?;
        let groups = group_by_shop(&ledger, lines)?;
        for group in &groups {
            tx.find_shop(group.shop_id).await?
                .ok_or(OrderError::ShopNotFound(group.shop_id))?;

            let mut shop = OrderShop::new(
                order.id,
                group.shop_id,
                self.settings.shipping_fee_per_shop,
                self.tracking.next_code(),
            );

            for line in &group.lines {
                ledger.reserve(&line.item_id, line.quantity)?;
                let item = ledger.get(&line.item_id)
                    .ok_or(OrderError::ItemNotFound(line.item_id))?;
                shop.add_item(OrderItem::new(shop.id, item, line.quantity)?)?;
            }

            if let Some(voucher_id) = request.shop_vouchers.get(&group.shop_id) {
                let mut voucher = engine::load_voucher(tx.as_mut(), *voucher_id).await?;
                voucher.check_applicable(VoucherTarget::Shop(group.shop_id), shop.subtotal, now)?;
                let discount = voucher.discount_for(shop.subtotal);
                voucher.consume()?;
                shop.apply_voucher(&voucher, discount)?;
                vouchers.push(voucher);
            }

            order.add_shop(shop)?;
        }

        // A shop voucher for a shop with nothing in this order
        for (shop_id, voucher_id) in &request.shop_vouchers {
            if !groups.iter().any(|g| g.shop_id == *shop_id) {
                let voucher = engine::load_voucher(tx.as_mut(), *voucher_id).await?;
                return Err(OrderError::VoucherNotApplicable(voucher.code));
            }
        }

        if let Some(voucher_id) = request.shipping_voucher_id {
            if vouchers.iter().any(|v| v.id == voucher_id) {
                return Err(OrderError::Validation(format!("voucher {} used twice", voucher_id)));
            }
            let mut voucher = engine::load_voucher(tx.as_mut(), voucher_id).await?;
            voucher.check_applicable(VoucherTarget::Shipping, order.subtotal, now)?;
            let discount = voucher.discount_for(order.shipping_fee);
            voucher.consume()?;
            order.apply_shipping_voucher(&voucher, discount)?;
            vouchers.push(voucher);
        }

        engine::write_stock(tx.as_mut(), &ledger).await?;
        engine::write_vouchers(tx.as_mut(), &mut vouchers).await?;
        tx.insert_order(&order).await?;
        tx.commit().await?;

        tracing::info!(
            order_id = %order.id,
            customer_id = %order.customer_id,
            shops = order.shops.len(),
            total_amount = order.total_amount,
            "Order created"
        );

        Ok(OrderReceipt::from(&order))
    }
}

/// Cart lines in request order; every id must exist and belong to the user
async fn load_cart_lines(
    tx: &mut dyn StoreTransaction,
    user: &User,
    cart_item_ids: &[Uuid],
) -> Result<Vec<CartItem>, OrderError> {
    let mut found: HashMap<Uuid, CartItem> = tx.find_cart_items(user.id, cart_item_ids).await?
        .into_iter()
        .filter(|c| c.user_id == user.id)
        .map(|c| (c.id, c))
        .collect();

    cart_item_ids.iter()
        .map(|id| found.remove(id).ok_or(OrderError::CartItemNotFound(*id)))
        .collect()
}

/// The explicit address if given, otherwise the user's default
async fn resolve_address(
    tx: &mut dyn StoreTransaction,
    user: &User,
    address_id: Option<Uuid>,
) -> Result<Address, OrderError> {
    let address = match address_id.or(user.default_address_id) {
        Some(id) => tx.find_address(id).await?,
        None => tx.find_default_address(user.id).await?,
    };

    address
        .filter(|a| a.belongs_to(user.id))
        .ok_or(OrderError::AddressNotFound)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mercato_catalog::Item;

    #[test]
    fn test_group_by_shop_keeps_first_appearance() {
        let user = Uuid::new_v4();
        let shop_a = Uuid::new_v4();
        let shop_b = Uuid::new_v4();
        let a1 = Item::new(shop_a, "A1", 10, 5);
        let b1 = Item::new(shop_b, "B1", 20, 5);
        let a2 = Item::new(shop_a, "A2", 30, 5);

        let mut ledger = StockLedger::new();
        for item in [&a1, &b1, &a2] {
            ledger.track(item.clone());
        }

        let groups = group_by_shop(&ledger, vec![
            CartItem::new(user, &a1, 1),
            CartItem::new(user, &b1, 1),
            CartItem::new(user, &a2, 1),
        ])
        .unwrap();

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].shop_id, shop_a);
        assert_eq!(groups[0].lines.len(), 2);
        assert_eq!(groups[0].lines[1].item_id, a2.id);
        assert_eq!(groups[1].shop_id, shop_b);
    }

    #[test]
    fn test_group_by_shop_uses_item_owner() {
        let user = Uuid::new_v4();
        let paper = Uuid::new_v4();
        let ink = Item::new(Uuid::new_v4(), "Ink", 700, 5);
        let mut ledger = StockLedger::new();
        ledger.track(ink.clone());

        let mut line = CartItem::new(user, &ink, 1);
        line.shop_id = paper;

        let groups = group_by_shop(&ledger, vec![line]).unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].shop_id, ink.shop_id);
    }

    #[test]
    fn test_group_by_shop_requires_tracked_item() {
        let item = Item::new(Uuid::new_v4(), "Ghost", 10, 1);
        let line = CartItem::new(Uuid::new_v4(), &item, 1);

        let result = group_by_shop(&StockLedger::new(), vec![line]);
        assert!(matches!(result, Err(OrderError::ItemNotFound(id)) if id == item.id));
    }

    #[test]
    fn test_request_defaults() {
        let cart_item = Uuid::new_v4();
        let request: CreateOrderRequest = serde_json::from_value(serde_json::json!({
            "cart_item_ids": [cart_item]
        }))
        .unwrap();

        assert_eq!(request.cart_item_ids, vec![cart_item]);
        assert!(request.shop_vouchers.is_empty());
        assert!(request.shipping_voucher_id.is_none());
        assert!(request.address_id.is_none());
    }
}
