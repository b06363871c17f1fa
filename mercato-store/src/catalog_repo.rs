use chrono::{DateTime, Utc};
use mercato_catalog::{CartItem, DiscountMethod, Item, Shop, Voucher, VoucherTarget};
use mercato_core::{Address, User};
use mercato_order::{StoreError, StoreResult};
use mercato_shared::Masked;
use sqlx::PgConnection;
use uuid::Uuid;

// Internal structs for type-safe querying
#[derive(sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    display_name: String,
    default_address_id: Option<Uuid>,
}

#[derive(sqlx::FromRow)]
struct AddressRow {
    id: Uuid,
    user_id: Uuid,
    recipient: String,
    phone: String,
    line: String,
    is_default: bool,
}

#[derive(sqlx::FromRow)]
struct ShopRow {
    id: Uuid,
    owner_id: Uuid,
    name: String,
}

#[derive(sqlx::FromRow)]
struct ItemRow {
    id: Uuid,
    shop_id: Uuid,
    name: String,
    price: i64,
    stock: i32,
    version: i64,
}

#[derive(sqlx::FromRow)]
struct VoucherRow {
    id: Uuid,
    code: String,
    scope: String,
    shop_id: Option<Uuid>,
    discount_method: String,
    discount_value: i64,
    max_discount: Option<i64>,
    min_spend: i64,
    remaining_quantity: i32,
    starts_at: DateTime<Utc>,
    ends_at: DateTime<Utc>,
    version: i64,
}

#[derive(sqlx::FromRow)]
struct CartItemRow {
    id: Uuid,
    user_id: Uuid,
    item_id: Uuid,
    shop_id: Uuid,
    quantity: i32,
}

pub(crate) fn db_error(e: sqlx::Error) -> StoreError {
    StoreError::Database(e.to_string())
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            display_name: row.display_name,
            default_address_id: row.default_address_id,
        }
    }
}

impl From<AddressRow> for Address {
    fn from(row: AddressRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            recipient: Masked::new(row.recipient),
            phone: Masked::new(row.phone),
            line: Masked::new(row.line),
            is_default: row.is_default,
        }
    }
}

impl From<ShopRow> for Shop {
    fn from(row: ShopRow) -> Self {
        Self {
            id: row.id,
            owner_id: row.owner_id,
            name: row.name,
        }
    }
}

impl From<ItemRow> for Item {
    fn from(row: ItemRow) -> Self {
        Self {
            id: row.id,
            shop_id: row.shop_id,
            name: row.name,
            price: row.price,
            stock: row.stock,
            version: row.version,
        }
    }
}

impl From<CartItemRow> for CartItem {
    fn from(row: CartItemRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            item_id: row.item_id,
            shop_id: row.shop_id,
            quantity: row.quantity,
        }
    }
}

impl TryFrom<VoucherRow> for Voucher {
    type Error = StoreError;

    fn try_from(row: VoucherRow) -> Result<Self, Self::Error> {
        let target = match (row.scope.as_str(), row.shop_id) {
            ("SHOP", Some(shop_id)) => VoucherTarget::Shop(shop_id),
            ("SHIPPING", None) => VoucherTarget::Shipping,
            (scope, _) => {
                return Err(StoreError::Database(format!(
                    "voucher {} has invalid scope {}",
                    row.id, scope
                )))
            }
        };

        let discount_method = DiscountMethod::parse(&row.discount_method).ok_or_else(|| {
            StoreError::Database(format!("voucher {} has unknown discount method {}", row.id, row.discount_method))
        })?;

        Ok(Self {
            id: row.id,
            code: row.code,
            target,
            discount_method,
            discount_value: row.discount_value,
            max_discount: row.max_discount,
            min_spend: row.min_spend,
            remaining_quantity: row.remaining_quantity,
            starts_at: row.starts_at,
            ends_at: row.ends_at,
            version: row.version,
        })
    }
}

pub(crate) async fn find_user(conn: &mut PgConnection, user_id: Uuid) -> StoreResult<Option<User>> {
    let row = sqlx::query_as::<_, UserRow>(
        "SELECT id, display_name, default_address_id FROM users WHERE id = $1",
    )
    .bind(user_id)
    .fetch_optional(&mut *conn)
    .await
    .map_err(db_error)?;

    Ok(row.map(User::from))
}

pub(crate) async fn find_address(conn: &mut PgConnection, address_id: Uuid) -> StoreResult<Option<Address>> {
    let row = sqlx::query_as::<_, AddressRow>(
        "SELECT id, user_id, recipient, phone, line, is_default FROM addresses WHERE id = $1",
    )
    .bind(address_id)
    .fetch_optional(&mut *conn)
    .await
    .map_err(db_error)?;

    Ok(row.map(Address::from))
}

pub(crate) async fn find_default_address(conn: &mut PgConnection, user_id: Uuid) -> StoreResult<Option<Address>> {
    let row = sqlx::query_as::<_, AddressRow>(
        r#"
        SELECT id, user_id, recipient, phone, line, is_default
        FROM addresses
        WHERE user_id = $1 AND is_default
        ORDER BY id
        LIMIT 1
        "#,
    )
    .bind(user_id)
    .fetch_optional(&mut *conn)
    .await
    .map_err(db_error)?;

    Ok(row.map(Address::from))
}

pub(crate) async fn find_cart_items(
    conn: &mut PgConnection,
    user_id: Uuid,
    ids: &[Uuid],
) -> StoreResult<Vec<CartItem>> {
    let rows = sqlx::query_as::<_, CartItemRow>(
        "SELECT id, user_id, item_id, shop_id, quantity FROM cart_items WHERE user_id = $1 AND id = ANY($2)",
    )
    .bind(user_id)
    .bind(ids)
    .fetch_all(&mut *conn)
    .await
    .map_err(db_error)?;

    Ok(rows.into_iter().map(CartItem::from).collect())
}

pub(crate) async fn find_shop(conn: &mut PgConnection, shop_id: Uuid) -> StoreResult<Option<Shop>> {
    let row = sqlx::query_as::<_, ShopRow>("SELECT id, owner_id, name FROM shops WHERE id = $1")
        .bind(shop_id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(db_error)?;

    Ok(row.map(Shop::from))
}

pub(crate) async fn find_item(conn: &mut PgConnection, item_id: Uuid) -> StoreResult<Option<Item>> {
    let row = sqlx::query_as::<_, ItemRow>(
        "SELECT id, shop_id, name, price, stock, version FROM items WHERE id = $1",
    )
    .bind(item_id)
    .fetch_optional(&mut *conn)
    .await
    .map_err(db_error)?;

    Ok(row.map(Item::from))
}

pub(crate) async fn find_voucher(conn: &mut PgConnection, voucher_id: Uuid) -> StoreResult<Option<Voucher>> {
    let row = sqlx::query_as::<_, VoucherRow>(
        r#"
        SELECT id, code, scope, shop_id, discount_method, discount_value, max_discount,
               min_spend, remaining_quantity, starts_at, ends_at, version
        FROM vouchers
        WHERE id = $1
        "#,
    )
    .bind(voucher_id)
    .fetch_optional(&mut *conn)
    .await
    .map_err(db_error)?;

    row.map(Voucher::try_from).transpose()
}

pub(crate) async fn update_item_stock(conn: &mut PgConnection, item: &Item) -> StoreResult<()> {
    let result = sqlx::query(
        "UPDATE items SET stock = $1, version = version + 1 WHERE id = $2 AND version = $3",
    )
    .bind(item.stock)
    .bind(item.id)
    .bind(item.version)
    .execute(&mut *conn)
    .await
    .map_err(db_error)?;

    if result.rows_affected() == 0 {
        return Err(StoreError::Conflict { entity: "item", id: item.id });
    }
    Ok(())
}

pub(crate) async fn update_voucher_quantity(conn: &mut PgConnection, voucher: &Voucher) -> StoreResult<()> {
    let result = sqlx::query(
        "UPDATE vouchers SET remaining_quantity = $1, version = version + 1 WHERE id = $2 AND version = $3",
    )
    .bind(voucher.remaining_quantity)
    .bind(voucher.id)
    .bind(voucher.version)
    .execute(&mut *conn)
    .await
    .map_err(db_error)?;

    if result.rows_affected() == 0 {
        return Err(StoreError::Conflict { entity: "voucher", id: voucher.id });
    }
    Ok(())
}
