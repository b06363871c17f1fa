use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mercato_catalog::{CartItem, Item, Shop, Voucher};
use mercato_core::{Address, User};
use mercato_order::{
    DeliveryAddress, Order, OrderItem, OrderItemStatus, OrderShop, OrderShopStatus, OrderStatus,
    OrderStore, ReturnOrder, ReturnOrderItem, ReturnStatus, StoreError, StoreResult,
    StoreTransaction,
};
use mercato_shared::Masked;
use sqlx::{PgConnection, PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::catalog_repo::{self, db_error};

/// Postgres-backed [`OrderStore`]
#[derive(Clone)]
pub struct PgOrderStore {
    pool: PgPool,
}

impl PgOrderStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OrderStore for PgOrderStore {
    async fn begin(&self) -> StoreResult<Box<dyn StoreTransaction>> {
        let tx = self.pool.begin().await.map_err(db_error)?;
        Ok(Box::new(PgStoreTransaction { tx }))
    }
}

/// Rolled back by sqlx when dropped without `commit`
pub struct PgStoreTransaction {
    tx: Transaction<'static, Postgres>,
}

// Internal structs for type-safe querying
#[derive(sqlx::FromRow)]
struct OrderRow {
    id: Uuid,
    customer_id: Uuid,
    address_id: Uuid,
    recipient: String,
    phone: String,
    address_line: String,
    ordered_at: DateTime<Utc>,
    status: String,
    subtotal: i64,
    product_discount: i64,
    shipping_fee: i64,
    shipping_discount: i64,
    total_amount: i64,
    shipping_voucher_id: Option<Uuid>,
    shipping_voucher_code: Option<String>,
    cancel_reason: Option<String>,
    cancelled_at: Option<DateTime<Utc>>,
    version: i64,
    updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct OrderShopRow {
    id: Uuid,
    order_id: Uuid,
    shop_id: Uuid,
    voucher_id: Option<Uuid>,
    voucher_code: Option<String>,
    subtotal: i64,
    discount: i64,
    shipping_fee: i64,
    total: i64,
    status: String,
    delivered_at: Option<DateTime<Utc>>,
    tracking_code: String,
}

#[derive(sqlx::FromRow)]
struct OrderItemRow {
    id: Uuid,
    order_shop_id: Uuid,
    item_id: Uuid,
    item_name: String,
    quantity: i32,
    unit_price: i64,
    line_total: i64,
    status: String,
}

#[derive(sqlx::FromRow)]
struct ReturnOrderRow {
    id: Uuid,
    order_id: Uuid,
    customer_id: Uuid,
    reason: String,
    refund_amount: i64,
    requested_at: DateTime<Utc>,
    status: String,
    version: i64,
    updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct ReturnOrderItemRow {
    id: Uuid,
    return_order_id: Uuid,
    order_item_id: Uuid,
    order_shop_id: Uuid,
    shop_id: Uuid,
    item_id: Uuid,
    quantity: i32,
    refund_amount: i64,
    reason: String,
    status: String,
    tracking_code: String,
    refund_transaction_id: Option<String>,
}

fn parse_status<T>(value: &str, parse: fn(&str) -> Option<T>, entity: &str) -> StoreResult<T> {
    parse(value).ok_or_else(|| StoreError::Database(format!("unknown {} status {}", entity, value)))
}

impl TryFrom<OrderItemRow> for OrderItem {
    type Error = StoreError;

    fn try_from(row: OrderItemRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            order_shop_id: row.order_shop_id,
            item_id: row.item_id,
            item_name: row.item_name,
            quantity: row.quantity,
            unit_price: row.unit_price,
            line_total: row.line_total,
            status: parse_status(&row.status, OrderItemStatus::parse, "order item")?,
        })
    }
}

impl TryFrom<ReturnOrderItemRow> for ReturnOrderItem {
    type Error = StoreError;

    fn try_from(row: ReturnOrderItemRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            return_order_id: row.return_order_id,
            order_item_id: row.order_item_id,
            order_shop_id: row.order_shop_id,
            shop_id: row.shop_id,
            item_id: row.item_id,
            quantity: row.quantity,
            refund_amount: row.refund_amount,
            reason: row.reason,
            status: parse_status(&row.status, ReturnStatus::parse, "return item")?,
            tracking_code: row.tracking_code,
            refund_transaction_id: row.refund_transaction_id,
        })
    }
}

async fn load_order(conn: &mut PgConnection, order_id: Uuid) -> StoreResult<Option<Order>> {
    let row = sqlx::query_as::<_, OrderRow>(
        r#"
        SELECT id, customer_id, address_id, recipient, phone, address_line, ordered_at, status,
               subtotal, product_discount, shipping_fee, shipping_discount, total_amount,
               shipping_voucher_id, shipping_voucher_code, cancel_reason, cancelled_at,
               version, updated_at
        FROM orders
        WHERE id = $1
        "#,
    )
    .bind(order_id)
    .fetch_optional(&mut *conn)
    .await
    .map_err(db_error)?;

    let Some(row) = row else {
        return Ok(None);
    };

    let shop_rows = sqlx::query_as::<_, OrderShopRow>(
        r#"
        SELECT id, order_id, shop_id, voucher_id, voucher_code, subtotal, discount,
               shipping_fee, total, status, delivered_at, tracking_code
        FROM order_shops
        WHERE order_id = $1
        ORDER BY position
        "#,
    )
    .bind(order_id)
    .fetch_all(&mut *conn)
    .await
    .map_err(db_error)?;

    let item_rows = sqlx::query_as::<_, OrderItemRow>(
        r#"
        SELECT oi.id, oi.order_shop_id, oi.item_id, oi.item_name, oi.quantity,
               oi.unit_price, oi.line_total, oi.status
        FROM order_items oi
        JOIN order_shops os ON os.id = oi.order_shop_id
        WHERE os.order_id = $1
        ORDER BY os.position, oi.position
        "#,
    )
    .bind(order_id)
    .fetch_all(&mut *conn)
    .await
    .map_err(db_error)?;

    let mut items: Vec<OrderItem> = item_rows.into_iter()
        .map(OrderItem::try_from)
        .collect::<StoreResult<_>>()?;

    let mut shops = Vec::with_capacity(shop_rows.len());
    for shop in shop_rows {
        let (own, rest): (Vec<OrderItem>, Vec<OrderItem>) =
            items.into_iter().partition(|i| i.order_shop_id == shop.id);
        items = rest;

        shops.push(OrderShop {
            id: shop.id,
            order_id: shop.order_id,
            shop_id: shop.shop_id,
            voucher_id: shop.voucher_id,
            voucher_code: shop.voucher_code,
            subtotal: shop.subtotal,
            discount: shop.discount,
            shipping_fee: shop.shipping_fee,
            total: shop.total,
            status: parse_status(&shop.status, OrderShopStatus::parse, "order shop")?,
            delivered_at: shop.delivered_at,
            tracking_code: shop.tracking_code,
            items: own,
        });
    }

    Ok(Some(Order {
        id: row.id,
        customer_id: row.customer_id,
        delivery_address: DeliveryAddress {
            address_id: row.address_id,
            recipient: Masked::new(row.recipient),
            phone: Masked::new(row.phone),
            line: Masked::new(row.address_line),
        },
        ordered_at: row.ordered_at,
        status: parse_status(&row.status, OrderStatus::parse, "order")?,
        subtotal: row.subtotal,
        product_discount: row.product_discount,
        shipping_fee: row.shipping_fee,
        shipping_discount: row.shipping_discount,
        total_amount: row.total_amount,
        shipping_voucher_id: row.shipping_voucher_id,
        shipping_voucher_code: row.shipping_voucher_code,
        cancel_reason: row.cancel_reason,
        cancelled_at: row.cancelled_at,
        shops,
        version: row.version,
        updated_at: row.updated_at,
    }))
}

async fn insert_order(conn: &mut PgConnection, order: &Order) -> StoreResult<()> {
    sqlx::query(
        r#"
        INSERT INTO orders (id, customer_id, address_id, recipient, phone, address_line, ordered_at,
                            status, subtotal, product_discount, shipping_fee, shipping_discount,
                            total_amount, shipping_voucher_id, shipping_voucher_code, cancel_reason,
                            cancelled_at, version, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19)
        "#,
    )
    .bind(order.id)
    .bind(order.customer_id)
    .bind(order.delivery_address.address_id)
    .bind(order.delivery_address.recipient.expose())
    .bind(order.delivery_address.phone.expose())
    .bind(order.delivery_address.line.expose())
    .bind(order.ordered_at)
    .bind(order.status.as_str())
    .bind(order.subtotal)
    .bind(order.product_discount)
    .bind(order.shipping_fee)
    .bind(order.shipping_discount)
    .bind(order.total_amount)
    .bind(order.shipping_voucher_id)
    .bind(&order.shipping_voucher_code)
    .bind(&order.cancel_reason)
    .bind(order.cancelled_at)
    .bind(order.version)
    .bind(order.updated_at)
    .execute(&mut *conn)
    .await
    .map_err(db_error)?;

    for (position, shop) in order.shops.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO order_shops (id, order_id, shop_id, position, voucher_id, voucher_code,
                                     subtotal, discount, shipping_fee, total, status,
                                     delivered_at, tracking_code)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(shop.id)
        .bind(order.id)
        .bind(shop.shop_id)
        .bind(position as i32)
        .bind(shop.voucher_id)
        .bind(&shop.voucher_code)
        .bind(shop.subtotal)
        .bind(shop.discount)
        .bind(shop.shipping_fee)
        .bind(shop.total)
        .bind(shop.status.as_str())
        .bind(shop.delivered_at)
        .bind(&shop.tracking_code)
        .execute(&mut *conn)
        .await
        .map_err(db_error)?;

        for (item_position, item) in shop.items.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO order_items (id, order_shop_id, item_id, position, item_name, quantity,
                                         unit_price, line_total, status)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                "#,
            )
            .bind(item.id)
            .bind(shop.id)
            .bind(item.item_id)
            .bind(item_position as i32)
            .bind(&item.item_name)
            .bind(item.quantity)
            .bind(item.unit_price)
            .bind(item.line_total)
            .bind(item.status.as_str())
            .execute(&mut *conn)
            .await
            .map_err(db_error)?;
        }
    }

    Ok(())
}

/// Status fields are the only mutable part of a placed order
async fn update_order(conn: &mut PgConnection, order: &Order) -> StoreResult<()> {
    let result = sqlx::query(
        r#"
        UPDATE orders
        SET status = $1, cancel_reason = $2, cancelled_at = $3, updated_at = $4, version = version + 1
        WHERE id = $5 AND version = $6
        "#,
    )
    .bind(order.status.as_str())
    .bind(&order.cancel_reason)
    .bind(order.cancelled_at)
    .bind(order.updated_at)
    .bind(order.id)
    .bind(order.version)
    .execute(&mut *conn)
    .await
    .map_err(db_error)?;

    if result.rows_affected() == 0 {
        return Err(StoreError::Conflict { entity: "order", id: order.id });
    }

    for shop in &order.shops {
        sqlx::query("UPDATE order_shops SET status = $1, delivered_at = $2 WHERE id = $3")
            .bind(shop.status.as_str())
            .bind(shop.delivered_at)
            .bind(shop.id)
            .execute(&mut *conn)
            .await
            .map_err(db_error)?;

        for item in &shop.items {
            sqlx::query("UPDATE order_items SET status = $1 WHERE id = $2")
                .bind(item.status.as_str())
                .bind(item.id)
                .execute(&mut *conn)
                .await
                .map_err(db_error)?;
        }
    }

    Ok(())
}

async fn load_return_order(conn: &mut PgConnection, return_order_id: Uuid) -> StoreResult<Option<ReturnOrder>> {
    let row = sqlx::query_as::<_, ReturnOrderRow>(
        r#"
        SELECT id, order_id, customer_id, reason, refund_amount, requested_at, status, version, updated_at
        FROM return_orders
        WHERE id = $1
        "#,
    )
    .bind(return_order_id)
    .fetch_optional(&mut *conn)
    .await
    .map_err(db_error)?;

    let Some(row) = row else {
        return Ok(None);
    };

    let items = sqlx::query_as::<_, ReturnOrderItemRow>(
        r#"
        SELECT id, return_order_id, order_item_id, order_shop_id, shop_id, item_id, quantity,
               refund_amount, reason, status, tracking_code, refund_transaction_id
        FROM return_order_items
        WHERE return_order_id = $1
        ORDER BY position
        "#,
    )
    .bind(return_order_id)
    .fetch_all(&mut *conn)
    .await
    .map_err(db_error)?
    .into_iter()
    .map(ReturnOrderItem::try_from)
    .collect::<StoreResult<Vec<_>>>()?;

    Ok(Some(ReturnOrder {
        id: row.id,
        order_id: row.order_id,
        customer_id: row.customer_id,
        reason: row.reason,
        refund_amount: row.refund_amount,
        requested_at: row.requested_at,
        status: parse_status(&row.status, ReturnStatus::parse, "return order")?,
        items,
        version: row.version,
        updated_at: row.updated_at,
    }))
}

async fn insert_return_order(conn: &mut PgConnection, return_order: &ReturnOrder) -> StoreResult<()> {
    sqlx::query(
        r#"
        INSERT INTO return_orders (id, order_id, customer_id, reason, refund_amount, requested_at,
                                   status, version, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(return_order.id)
    .bind(return_order.order_id)
    .bind(return_order.customer_id)
    .bind(&return_order.reason)
    .bind(return_order.refund_amount)
    .bind(return_order.requested_at)
    .bind(return_order.status.as_str())
    .bind(return_order.version)
    .bind(return_order.updated_at)
    .execute(&mut *conn)
    .await
    .map_err(db_error)?;

    for (position, item) in return_order.items.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO return_order_items (id, return_order_id, order_item_id, order_shop_id, shop_id,
                                            item_id, position, quantity, refund_amount, reason,
                                            status, tracking_code, refund_transaction_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(item.id)
        .bind(return_order.id)
        .bind(item.order_item_id)
        .bind(item.order_shop_id)
        .bind(item.shop_id)
        .bind(item.item_id)
        .bind(position as i32)
        .bind(item.quantity)
        .bind(item.refund_amount)
        .bind(&item.reason)
        .bind(item.status.as_str())
        .bind(&item.tracking_code)
        .bind(&item.refund_transaction_id)
        .execute(&mut *conn)
        .await
        .map_err(db_error)?;
    }

    Ok(())
}

async fn update_return_order(conn: &mut PgConnection, return_order: &ReturnOrder) -> StoreResult<()> {
    let result = sqlx::query(
        r#"
        UPDATE return_orders
        SET status = $1, updated_at = $2, version = version + 1
        WHERE id = $3 AND version = $4
        "#,
    )
    .bind(return_order.status.as_str())
    .bind(return_order.updated_at)
    .bind(return_order.id)
    .bind(return_order.version)
    .execute(&mut *conn)
    .await
    .map_err(db_error)?;

    if result.rows_affected() == 0 {
        return Err(StoreError::Conflict { entity: "return order", id: return_order.id });
    }

    for item in &return_order.items {
        sqlx::query("UPDATE return_order_items SET status = $1, refund_transaction_id = $2 WHERE id = $3")
            .bind(item.status.as_str())
            .bind(&item.refund_transaction_id)
            .bind(item.id)
            .execute(&mut *conn)
            .await
            .map_err(db_error)?;
    }

    Ok(())
}

#[async_trait]
impl StoreTransaction for PgStoreTransaction {
    async fn find_user(&mut self, user_id: Uuid) -> StoreResult<Option<User>> {
        catalog_repo::find_user(&mut self.tx, user_id).await
    }

    async fn find_address(&mut self, address_id: Uuid) -> StoreResult<Option<Address>> {
        catalog_repo::find_address(&mut self.tx, address_id).await
    }

    async fn find_default_address(&mut self, user_id: Uuid) -> StoreResult<Option<Address>> {
        catalog_repo::find_default_address(&mut self.tx, user_id).await
    }

    async fn find_cart_items(&mut self, user_id: Uuid, ids: &[Uuid]) -> StoreResult<Vec<CartItem>> {
        catalog_repo::find_cart_items(&mut self.tx, user_id, ids).await
    }

    async fn find_item(&mut self, item_id: Uuid) -> StoreResult<Option<Item>> {
        catalog_repo::find_item(&mut self.tx, item_id).await
    }

    async fn find_shop(&mut self, shop_id: Uuid) -> StoreResult<Option<Shop>> {
        catalog_repo::find_shop(&mut self.tx, shop_id).await
    }

    async fn find_voucher(&mut self, voucher_id: Uuid) -> StoreResult<Option<Voucher>> {
        catalog_repo::find_voucher(&mut self.tx, voucher_id).await
    }

    async fn update_item_stock(&mut self, item: &Item) -> StoreResult<()> {
        catalog_repo::update_item_stock(&mut self.tx, item).await
    }

    async fn update_voucher_quantity(&mut self, voucher: &Voucher) -> StoreResult<()> {
        catalog_repo::update_voucher_quantity(&mut self.tx, voucher).await
    }

    async fn insert_order(&mut self, order: &Order) -> StoreResult<()> {
        insert_order(&mut self.tx, order).await
    }

    async fn find_order(&mut self, order_id: Uuid) -> StoreResult<Option<Order>> {
        load_order(&mut self.tx, order_id).await
    }

    async fn update_order(&mut self, order: &Order) -> StoreResult<()> {
        update_order(&mut self.tx, order).await
    }

    async fn insert_return_order(&mut self, return_order: &ReturnOrder) -> StoreResult<()> {
        insert_return_order(&mut self.tx, return_order).await
    }

    async fn find_return_order(&mut self, return_order_id: Uuid) -> StoreResult<Option<ReturnOrder>> {
        load_return_order(&mut self.tx, return_order_id).await
    }

    async fn update_return_order(&mut self, return_order: &ReturnOrder) -> StoreResult<()> {
        update_return_order(&mut self.tx, return_order).await
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.tx.commit().await.map_err(|e| {
            tracing::error!("Transaction commit failed: {}", e);
            db_error(e)
        })
    }
}
