use async_trait::async_trait;
use mercato_catalog::{CartItem, Item, Shop, Voucher};
use mercato_core::{Address, User};
use uuid::Uuid;

use crate::models::{Order, ReturnOrder};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// A conditional write found a different version than the one read
    #[error("{entity} {id} was modified concurrently")]
    Conflict { entity: &'static str, id: Uuid },

    #[error("Database error: {0}")]
    Database(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Entry point into the persistent store
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn begin(&self) -> StoreResult<Box<dyn StoreTransaction>>;
}

/// One unit of work against the store.
///
/// Reads see a consistent view; writes are conditional on the `version` the
/// entity was read with. Dropping the transaction without `commit` discards
/// every write.
#[async_trait]
pub trait StoreTransaction: Send {
    async fn find_user(&mut self, user_id: Uuid) -> StoreResult<Option<User>>;

    async fn find_address(&mut self, address_id: Uuid) -> StoreResult<Option<Address>>;

    /// The address flagged as default for this user, if any
    async fn find_default_address(&mut self, user_id: Uuid) -> StoreResult<Option<Address>>;

    /// Cart items among `ids` that belong to `user_id`, in no particular order
    async fn find_cart_items(&mut self, user_id: Uuid, ids: &[Uuid]) -> StoreResult<Vec<CartItem>>;

    async fn find_item(&mut self, item_id: Uuid) -> StoreResult<Option<Item>>;

    async fn find_shop(&mut self, shop_id: Uuid) -> StoreResult<Option<Shop>>;

    async fn find_voucher(&mut self, voucher_id: Uuid) -> StoreResult<Option<Voucher>>;

    /// Write `item.stock`, conditional on `item.version`
    async fn update_item_stock(&mut self, item: &Item) -> StoreResult<()>;

    /// Write `voucher.remaining_quantity`, conditional on `voucher.version`
    async fn update_voucher_quantity(&mut self, voucher: &Voucher) -> StoreResult<()>;

    /// Insert an order together with its shops and items
    async fn insert_order(&mut self, order: &Order) -> StoreResult<()>;

    async fn find_order(&mut self, order_id: Uuid) -> StoreResult<Option<Order>>;

    /// Persist status changes of the whole aggregate, conditional on `order.version`
    async fn update_order(&mut self, order: &Order) -> StoreResult<()>;

    async fn insert_return_order(&mut self, return_order: &ReturnOrder) -> StoreResult<()>;

    async fn find_return_order(&mut self, return_order_id: Uuid) -> StoreResult<Option<ReturnOrder>>;

    /// Persist status changes of the return and its items, conditional on `return_order.version`
    async fn update_return_order(&mut self, return_order: &ReturnOrder) -> StoreResult<()>;

    async fn commit(self: Box<Self>) -> StoreResult<()>;
}
