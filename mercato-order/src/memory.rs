use async_trait::async_trait;
use mercato_catalog::{CartItem, Item, Shop, Voucher};
use mercato_core::{Address, User};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

use crate::models::{Order, ReturnOrder};
use crate::repository::{OrderStore, StoreError, StoreResult, StoreTransaction};

#[derive(Debug, Clone, Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    addresses: HashMap<Uuid, Address>,
    shops: HashMap<Uuid, Shop>,
    items: HashMap<Uuid, Item>,
    vouchers: HashMap<Uuid, Voucher>,
    cart_items: HashMap<Uuid, CartItem>,
    orders: HashMap<Uuid, Order>,
    return_orders: HashMap<Uuid, ReturnOrder>,
}

/// Versioned entity a transaction intends to overwrite
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Key {
    Item(Uuid),
    Voucher(Uuid),
    Order(Uuid),
    ReturnOrder(Uuid),
}

impl Key {
    fn conflict(self) -> StoreError {
        let (entity, id) = match self {
            Key::Item(id) => ("item", id),
            Key::Voucher(id) => ("voucher", id),
            Key::Order(id) => ("order", id),
            Key::ReturnOrder(id) => ("return order", id),
        };
        StoreError::Conflict { entity, id }
    }

    fn current_version(self, tables: &Tables) -> Option<i64> {
        match self {
            Key::Item(id) => tables.items.get(&id).map(|e| e.version),
            Key::Voucher(id) => tables.vouchers.get(&id).map(|e| e.version),
            Key::Order(id) => tables.orders.get(&id).map(|e| e.version),
            Key::ReturnOrder(id) => tables.return_orders.get(&id).map(|e| e.version),
        }
    }
}

/// In-memory store with the same optimistic concurrency semantics as Postgres.
///
/// Every transaction works on a private snapshot. At commit each written
/// entity must still carry the version it was read with; otherwise nothing is
/// applied and the commit fails with [`StoreError::Conflict`].
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn insert_user(&self, user: User) {
        self.tables().users.insert(user.id, user);
    }

    pub fn insert_address(&self, address: Address) {
        self.tables().addresses.insert(address.id, address);
    }

    pub fn insert_shop(&self, shop: Shop) {
        self.tables().shops.insert(shop.id, shop);
    }

    pub fn insert_item(&self, item: Item) {
        self.tables().items.insert(item.id, item);
    }

    pub fn insert_voucher(&self, voucher: Voucher) {
        self.tables().vouchers.insert(voucher.id, voucher);
    }

    pub fn insert_cart_item(&self, cart_item: CartItem) {
        self.tables().cart_items.insert(cart_item.id, cart_item);
    }

    pub fn item(&self, item_id: Uuid) -> Option<Item> {
        self.tables().items.get(&item_id).cloned()
    }

    pub fn voucher(&self, voucher_id: Uuid) -> Option<Voucher> {
        self.tables().vouchers.get(&voucher_id).cloned()
    }

    pub fn cart_item(&self, cart_item_id: Uuid) -> Option<CartItem> {
        self.tables().cart_items.get(&cart_item_id).cloned()
    }

    pub fn order(&self, order_id: Uuid) -> Option<Order> {
        self.tables().orders.get(&order_id).cloned()
    }

    pub fn return_order(&self, return_order_id: Uuid) -> Option<ReturnOrder> {
        self.tables().return_orders.get(&return_order_id).cloned()
    }

    pub fn order_count(&self) -> usize {
        self.tables().orders.len()
    }

    /// Modify an item outside any transaction, bumping its version the way a
    /// concurrent writer would
    pub fn update_item(&self, item_id: Uuid, f: impl FnOnce(&mut Item)) -> bool {
        match self.tables().items.get_mut(&item_id) {
            Some(item) => {
                f(item);
                item.version += 1;
                true
            }
            None => false,
        }
    }

    /// Modify an order outside any transaction (fulfilment happens elsewhere)
    pub fn update_order(&self, order_id: Uuid, f: impl FnOnce(&mut Order)) -> bool {
        match self.tables().orders.get_mut(&order_id) {
            Some(order) => {
                f(order);
                order.version += 1;
                true
            }
            None => false,
        }
    }

    pub fn update_return_order(&self, return_order_id: Uuid, f: impl FnOnce(&mut ReturnOrder)) -> bool {
        match self.tables().return_orders.get_mut(&return_order_id) {
            Some(return_order) => {
                f(return_order);
                return_order.version += 1;
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn begin(&self) -> StoreResult<Box<dyn StoreTransaction>> {
        let snapshot = self.tables().clone();
        Ok(Box::new(MemoryTransaction {
            shared: Arc::clone(&self.tables),
            working: snapshot,
            expected: Vec::new(),
        }))
    }
}

pub struct MemoryTransaction {
    shared: Arc<Mutex<Tables>>,
    working: Tables,
    /// Written keys with the version they must still have at commit (`None` for inserts)
    expected: Vec<(Key, Option<i64>)>,
}

impl MemoryTransaction {
    fn expect_version(&mut self, key: Key, version: Option<i64>) -> StoreResult<()> {
        if key.current_version(&self.working) != version {
            return Err(key.conflict());
        }
        // Only the first write of a key pins the version seen by the shared store
        if !self.expected.iter().any(|(k, _)| *k == key) {
            self.expected.push((key, version));
        }
        Ok(())
    }
}

#[async_trait]
impl StoreTransaction for MemoryTransaction {
    async fn find_user(&mut self, user_id: Uuid) -> StoreResult<Option<User>> {
        Ok(self.working.users.get(&user_id).cloned())
    }

    async fn find_address(&mut self, address_id: Uuid) -> StoreResult<Option<Address>> {
        Ok(self.working.addresses.get(&address_id).cloned())
    }

    async fn find_default_address(&mut self, user_id: Uuid) -> StoreResult<Option<Address>> {
        Ok(self.working.addresses.values()
            .find(|a| a.user_id == user_id && a.is_default)
            .cloned())
    }

    async fn find_cart_items(&mut self, user_id: Uuid, ids: &[Uuid]) -> StoreResult<Vec<CartItem>> {
        Ok(ids.iter()
            .filter_map(|id| self.working.cart_items.get(id))
            .filter(|c| c.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn find_item(&mut self, item_id: Uuid) -> StoreResult<Option<Item>> {
        Ok(self.working.items.get(&item_id).cloned())
    }

    async fn find_shop(&mut self, shop_id: Uuid) -> StoreResult<Option<Shop>> {
        Ok(self.working.shops.get(&shop_id).cloned())
    }

    async fn find_voucher(&mut self, voucher_id: Uuid) -> StoreResult<Option<Voucher>> {
        Ok(self.working.vouchers.get(&voucher_id).cloned())
    }

    async fn update_item_stock(&mut self, item: &Item) -> StoreResult<()> {
        self.expect_version(Key::Item(item.id), Some(item.version))?;
        if let Some(stored) = self.working.items.get_mut(&item.id) {
            stored.stock = item.stock;
            stored.version += 1;
        }
        Ok(())
    }

    async fn update_voucher_quantity(&mut self, voucher: &Voucher) -> StoreResult<()> {
        self.expect_version(Key::Voucher(voucher.id), Some(voucher.version))?;
        if let Some(stored) = self.working.vouchers.get_mut(&voucher.id) {
            stored.remaining_quantity = voucher.remaining_quantity;
            stored.version += 1;
        }
        Ok(())
    }

    async fn insert_order(&mut self, order: &Order) -> StoreResult<()> {
        self.expect_version(Key::Order(order.id), None)?;
        self.working.orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn find_order(&mut self, order_id: Uuid) -> StoreResult<Option<Order>> {
        Ok(self.working.orders.get(&order_id).cloned())
    }

    async fn update_order(&mut self, order: &Order) -> StoreResult<()> {
        self.expect_version(Key::Order(order.id), Some(order.version))?;
        let mut stored = order.clone();
        stored.version += 1;
        self.working.orders.insert(order.id, stored);
        Ok(())
    }

    async fn insert_return_order(&mut self, return_order: &ReturnOrder) -> StoreResult<()> {
        self.expect_version(Key::ReturnOrder(return_order.id), None)?;
        self.working.return_orders.insert(return_order.id, return_order.clone());
        Ok(())
    }

    async fn find_return_order(&mut self, return_order_id: Uuid) -> StoreResult<Option<ReturnOrder>> {
        Ok(self.working.return_orders.get(&return_order_id).cloned())
    }

    async fn update_return_order(&mut self, return_order: &ReturnOrder) -> StoreResult<()> {
        self.expect_version(Key::ReturnOrder(return_order.id), Some(return_order.version))?;
        let mut stored = return_order.clone();
        stored.version += 1;
        self.working.return_orders.insert(return_order.id, stored);
        Ok(())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let MemoryTransaction { shared, working, expected } = *self;
        let mut tables = shared.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        for (key, version) in &expected {
            if key.current_version(&tables) != *version {
                return Err(key.conflict());
            }
        }

        for (key, _) in expected {
            match key {
                Key::Item(id) => {
                    if let Some(item) = working.items.get(&id) {
                        tables.items.insert(id, item.clone());
                    }
                }
                Key::Voucher(id) => {
                    if let Some(voucher) = working.vouchers.get(&id) {
                        tables.vouchers.insert(id, voucher.clone());
                    }
                }
                Key::Order(id) => {
                    if let Some(order) = working.orders.get(&id) {
                        tables.orders.insert(id, order.clone());
                    }
                }
                Key::ReturnOrder(id) => {
                    if let Some(return_order) = working.return_orders.get(&id) {
                        tables.return_orders.insert(id, return_order.clone());
                    }
                }
            }
        }
        Ok(())
    }
}
