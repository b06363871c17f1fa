use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};
use mercato_catalog::{pricing, AmountOverflow, Item, Voucher};
use mercato_core::Address;
use mercato_shared::Masked;

/// Order status in the lifecycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    PendingPayment,
    Completed,
    Cancelled,
}

/// Per-shop fulfilment status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderShopStatus {
    PendingConfirmation,
    Confirmed,
    Shipping,
    Delivered,
    Cancelled,
}

/// Order item status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderItemStatus {
    Pending,
    Delivered,
    ReturnRequest,
    Returned,
    ReturnRejected,
    Cancelled,
}

/// Status shared by a return order and each of its items
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReturnStatus {
    Pending,
    Approved,
    Rejected,
}

/// Delivery address as it was when the order was placed
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeliveryAddress {
    pub address_id: Uuid,
    pub recipient: Masked<String>,
    pub phone: Masked<String>,
    pub line: Masked<String>,
}

impl From<&Address> for DeliveryAddress {
    fn from(address: &Address) -> Self {
        Self {
            address_id: address.id,
            recipient: address.recipient.clone(),
            phone: address.phone.clone(),
            line: address.line.clone(),
        }
    }
}

/// A customer's purchase across one or more shops.
///
/// The order owns its shops and their items; children refer back to their parent by id only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub delivery_address: DeliveryAddress,
    pub ordered_at: DateTime<Utc>,
    pub status: OrderStatus,
    pub subtotal: i64,
    pub product_discount: i64,
    pub shipping_fee: i64,
    pub shipping_discount: i64,
    pub total_amount: i64,
    pub shipping_voucher_id: Option<Uuid>,
    pub shipping_voucher_code: Option<String>,
    pub cancel_reason: Option<String>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub shops: Vec<OrderShop>,
    pub version: i64,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn new(customer_id: Uuid, delivery_address: DeliveryAddress, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            customer_id,
            delivery_address,
            ordered_at: now,
            status: OrderStatus::PendingPayment,
            subtotal: 0,
            product_discount: 0,
            shipping_fee: 0,
            shipping_discount: 0,
            total_amount: 0,
            shipping_voucher_id: None,
            shipping_voucher_code: None,
            cancel_reason: None,
            cancelled_at: None,
            shops: Vec::new(),
            version: 0,
            updated_at: now,
        }
    }

    pub fn add_shop(&mut self, shop: OrderShop) -> Result<(), AmountOverflow> {
        self.shops.push(shop);
        self.recalculate_totals()
    }

    /// Attach a shipping voucher. The discount never exceeds the shipping fee.
    pub fn apply_shipping_voucher(&mut self, voucher: &Voucher, discount: i64) -> Result<(), AmountOverflow> {
        self.shipping_voucher_id = Some(voucher.id);
        self.shipping_voucher_code = Some(voucher.code.clone());
        self.shipping_discount = discount.clamp(0, self.shipping_fee);
        self.recalculate_totals()
    }

    /// Recompute aggregate totals from the shops.
    ///
    /// `total_amount = subtotal - product_discount - shipping_discount + shipping_fee`
    pub fn recalculate_totals(&mut self) -> Result<(), AmountOverflow> {
        self.subtotal = pricing::checked_sum(self.shops.iter().map(|s| s.subtotal))?;
        self.product_discount = pricing::checked_sum(self.shops.iter().map(|s| s.discount))?;
        self.shipping_fee = pricing::checked_sum(self.shops.iter().map(|s| s.shipping_fee))?;
        self.shipping_discount = self.shipping_discount.min(self.shipping_fee);
        // Discounts never exceed their base, so only the fee can push past i64::MAX
        self.total_amount = (self.subtotal - self.product_discount - self.shipping_discount)
            .checked_add(self.shipping_fee)
            .ok_or(AmountOverflow)?;
        Ok(())
    }

    pub fn items(&self) -> impl Iterator<Item = &OrderItem> {
        self.shops.iter().flat_map(|s| s.items.iter())
    }

    /// Locate an item together with the shop it was bought from
    pub fn find_item(&self, order_item_id: Uuid) -> Option<(&OrderShop, &OrderItem)> {
        self.shops.iter().find_map(|shop| {
            shop.items.iter()
                .find(|item| item.id == order_item_id)
                .map(|item| (shop, item))
        })
    }

    pub fn find_item_mut(&mut self, order_item_id: Uuid) -> Option<&mut OrderItem> {
        self.shops.iter_mut()
            .flat_map(|s| s.items.iter_mut())
            .find(|item| item.id == order_item_id)
    }

    /// Every voucher this order consumed, shop vouchers first
    pub fn voucher_ids(&self) -> Vec<Uuid> {
        self.shops.iter()
            .filter_map(|s| s.voucher_id)
            .chain(self.shipping_voucher_id)
            .collect()
    }
}

/// The part of an order fulfilled by a single shop
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderShop {
    pub id: Uuid,
    pub order_id: Uuid,
    pub shop_id: Uuid,
    pub voucher_id: Option<Uuid>,
    pub voucher_code: Option<String>,
    pub subtotal: i64,
    pub discount: i64,
    pub shipping_fee: i64,
    pub total: i64,
    pub status: OrderShopStatus,
    pub delivered_at: Option<DateTime<Utc>>,
    pub tracking_code: String,
    pub items: Vec<OrderItem>,
}

impl OrderShop {
    pub fn new(order_id: Uuid, shop_id: Uuid, shipping_fee: i64, tracking_code: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            order_id,
            shop_id,
            voucher_id: None,
            voucher_code: None,
            subtotal: 0,
            discount: 0,
            shipping_fee,
            total: shipping_fee,
            status: OrderShopStatus::PendingConfirmation,
            delivered_at: None,
            tracking_code,
            items: Vec::new(),
        }
    }

    pub fn add_item(&mut self, item: OrderItem) -> Result<(), AmountOverflow> {
        self.subtotal = self.subtotal.checked_add(item.line_total).ok_or(AmountOverflow)?;
        self.items.push(item);
        self.recalculate_total()
    }

    pub fn apply_voucher(&mut self, voucher: &Voucher, discount: i64) -> Result<(), AmountOverflow> {
        self.voucher_id = Some(voucher.id);
        self.voucher_code = Some(voucher.code.clone());
        self.discount = discount.clamp(0, self.subtotal);
        self.recalculate_total()
    }

    fn recalculate_total(&mut self) -> Result<(), AmountOverflow> {
        self.total = (self.subtotal - self.discount)
            .checked_add(self.shipping_fee)
            .ok_or(AmountOverflow)?;
        Ok(())
    }

    pub fn is_delivered(&self) -> bool {
        self.status == OrderShopStatus::Delivered && self.delivered_at.is_some()
    }
}

/// One purchased item, with price snapshotted at order time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: Uuid,
    pub order_shop_id: Uuid,
    pub item_id: Uuid,
    pub item_name: String,
    pub quantity: i32,
    pub unit_price: i64,
    pub line_total: i64,
    pub status: OrderItemStatus,
}

impl OrderItem {
    pub fn new(order_shop_id: Uuid, item: &Item, quantity: i32) -> Result<Self, AmountOverflow> {
        Ok(Self {
            id: Uuid::new_v4(),
            order_shop_id,
            item_id: item.id,
            item_name: item.name.clone(),
            quantity,
            unit_price: item.price,
            line_total: pricing::line_total(item.price, quantity)?,
            status: OrderItemStatus::Pending,
        })
    }

    /// Whether the item already entered a return flow
    pub fn in_return_flow(&self) -> bool {
        matches!(
            self.status,
            OrderItemStatus::ReturnRequest | OrderItemStatus::Returned | OrderItemStatus::ReturnRejected
        )
    }
}

/// A customer's request to send back some delivered items of one order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReturnOrder {
    pub id: Uuid,
    pub order_id: Uuid,
    pub customer_id: Uuid,
    pub reason: String,
    pub refund_amount: i64,
    pub requested_at: DateTime<Utc>,
    pub status: ReturnStatus,
    pub items: Vec<ReturnOrderItem>,
    pub version: i64,
    pub updated_at: DateTime<Utc>,
}

impl ReturnOrder {
    pub fn new(order_id: Uuid, customer_id: Uuid, reason: String, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            order_id,
            customer_id,
            reason,
            refund_amount: 0,
            requested_at: now,
            status: ReturnStatus::Pending,
            items: Vec::new(),
            version: 0,
            updated_at: now,
        }
    }

    pub fn add_item(&mut self, item: ReturnOrderItem) {
        self.refund_amount += item.refund_amount;
        self.items.push(item);
    }

    pub fn find_item(&self, return_order_item_id: Uuid) -> Option<&ReturnOrderItem> {
        self.items.iter().find(|i| i.id == return_order_item_id)
    }

    pub fn find_item_mut(&mut self, return_order_item_id: Uuid) -> Option<&mut ReturnOrderItem> {
        self.items.iter_mut().find(|i| i.id == return_order_item_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReturnOrderItem {
    pub id: Uuid,
    pub return_order_id: Uuid,
    pub order_item_id: Uuid,
    pub order_shop_id: Uuid,
    pub shop_id: Uuid,
    pub item_id: Uuid,
    pub quantity: i32,
    pub refund_amount: i64,
    pub reason: String,
    pub status: ReturnStatus,
    pub tracking_code: String,
    pub refund_transaction_id: Option<String>,
}

impl ReturnOrderItem {
    pub fn new(
        return_order_id: Uuid,
        shop: &OrderShop,
        order_item: &OrderItem,
        quantity: i32,
        refund_amount: i64,
        reason: String,
        tracking_code: String,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            return_order_id,
            order_item_id: order_item.id,
            order_shop_id: shop.id,
            shop_id: shop.shop_id,
            item_id: order_item.item_id,
            quantity,
            refund_amount,
            reason,
            status: ReturnStatus::Pending,
            tracking_code,
            refund_transaction_id: None,
        }
    }
}

macro_rules! status_codes {
    ($status:ty { $($variant:ident => $code:literal),+ $(,)? }) => {
        impl $status {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $code),+
                }
            }

            pub fn parse(value: &str) -> Option<Self> {
                match value {
                    $($code => Some(Self::$variant),)+
                    _ => None,
                }
            }
        }

        impl std::fmt::Display for $status {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

status_codes!(OrderStatus {
    PendingPayment => "PENDING_PAYMENT",
    Completed => "COMPLETED",
    Cancelled => "CANCELLED",
});

status_codes!(OrderShopStatus {
    PendingConfirmation => "PENDING_CONFIRMATION",
    Confirmed => "CONFIRMED",
    Shipping => "SHIPPING",
    Delivered => "DELIVERED",
    Cancelled => "CANCELLED",
});

status_codes!(OrderItemStatus {
    Pending => "PENDING",
    Delivered => "DELIVERED",
    ReturnRequest => "RETURN_REQUEST",
    Returned => "RETURNED",
    ReturnRejected => "RETURN_REJECTED",
    Cancelled => "CANCELLED",
});

status_codes!(ReturnStatus {
    Pending => "PENDING",
    Approved => "APPROVED",
    Rejected => "REJECTED",
});

#[cfg(test)]
mod tests {
    use super::*;
    use mercato_catalog::{DiscountMethod, VoucherTarget};

    fn address() -> DeliveryAddress {
        DeliveryAddress {
            address_id: Uuid::new_v4(),
            recipient: Masked::new("Linh Tran".to_string()),
            phone: Masked::new("0900000000".to_string()),
            line: Masked::new("1 Trang Tien".to_string()),
        }
    }

    fn voucher(target: VoucherTarget) -> Voucher {
        Voucher {
            id: Uuid::new_v4(),
            code: "V1".to_string(),
            target,
            discount_method: DiscountMethod::FixedAmount,
            discount_value: 50,
            max_discount: None,
            min_spend: 0,
            remaining_quantity: 1,
            starts_at: Utc::now(),
            ends_at: Utc::now(),
            version: 0,
        }
    }

    #[test]
    fn test_order_totals() {
        let mut order = Order::new(Uuid::new_v4(), address(), Utc::now());
        let shop_id = Uuid::new_v4();
        let item = Item::new(shop_id, "Notebook", 100, 10);

        let mut shop = OrderShop::new(order.id, shop_id, 30, "TRACK00001".to_string());
        shop.add_item(OrderItem::new(shop.id, &item, 2).unwrap()).unwrap();
        shop.apply_voucher(&voucher(VoucherTarget::Shop(shop_id)), 50).unwrap();
        assert_eq!(shop.total, 200 - 50 + 30);

        order.add_shop(shop).unwrap();
        order.apply_shipping_voucher(&voucher(VoucherTarget::Shipping), 100).unwrap();

        assert_eq!(order.subtotal, 200);
        assert_eq!(order.product_discount, 50);
        assert_eq!(order.shipping_fee, 30);
        // Shipping discount is capped at the fee
        assert_eq!(order.shipping_discount, 30);
        assert_eq!(
            order.total_amount,
            order.subtotal - order.product_discount - order.shipping_discount + order.shipping_fee
        );
        assert_eq!(order.voucher_ids().len(), 2);
    }

    #[test]
    fn test_totals_reject_overflow() {
        let shop_id = Uuid::new_v4();
        let pricey = Item::new(shop_id, "Atlas", i64::MAX / 2, 10);
        assert_eq!(OrderItem::new(Uuid::new_v4(), &pricey, 3).unwrap_err(), AmountOverflow);

        let mut shop = OrderShop::new(Uuid::new_v4(), shop_id, 0, "TRACK00002".to_string());
        shop.add_item(OrderItem::new(shop.id, &pricey, 2).unwrap()).unwrap();
        let one_more = Item::new(shop_id, "Pencil", 10, 10);
        assert_eq!(shop.add_item(OrderItem::new(shop.id, &one_more, 1).unwrap()), Err(AmountOverflow));

        // The fee alone can tip the shop total over
        let mut heavy = OrderShop::new(Uuid::new_v4(), shop_id, 10, "TRACK00003".to_string());
        let at_limit = Item::new(shop_id, "Vault", i64::MAX, 1);
        assert_eq!(heavy.add_item(OrderItem::new(heavy.id, &at_limit, 1).unwrap()), Err(AmountOverflow));
    }

    #[test]
    fn test_find_item() {
        let mut order = Order::new(Uuid::new_v4(), address(), Utc::now());
        let shop_id = Uuid::new_v4();
        let item = Item::new(shop_id, "Pen", 15, 10);
        let mut shop = OrderShop::new(order.id, shop_id, 0, "TRACK00002".to_string());
        let order_item = OrderItem::new(shop.id, &item, 3).unwrap();
        let order_item_id = order_item.id;
        shop.add_item(order_item).unwrap();
        order.add_shop(shop).unwrap();

        let (found_shop, found_item) = order.find_item(order_item_id).unwrap();
        assert_eq!(found_shop.shop_id, shop_id);
        assert_eq!(found_item.line_total, 45);
        assert!(order.find_item(Uuid::new_v4()).is_none());
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(OrderStatus::PendingPayment.as_str(), "PENDING_PAYMENT");
        assert_eq!(OrderItemStatus::parse("RETURN_REQUEST"), Some(OrderItemStatus::ReturnRequest));
        assert_eq!(ReturnStatus::parse("unknown"), None);
        assert_eq!(OrderShopStatus::Delivered.to_string(), "DELIVERED");
        assert_eq!(
            serde_json::to_value(OrderShopStatus::PendingConfirmation).unwrap(),
            serde_json::json!("PENDING_CONFIRMATION")
        );
    }
}
