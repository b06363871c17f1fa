use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A sellable catalog item with its stock counter.
///
/// `version` is the optimistic concurrency token: stores write a new stock value
/// only when the version they read is still current.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Item {
    pub id: Uuid,
    pub shop_id: Uuid,
    pub name: String,
    /// Unit price in minor currency units
    pub price: i64,
    pub stock: i32,
    pub version: i64,
}

impl Item {
    pub fn new(shop_id: Uuid, name: impl Into<String>, price: i64, stock: i32) -> Self {
        Self {
            id: Uuid::new_v4(),
            shop_id,
            name: name.into(),
            price,
            stock,
            version: 0,
        }
    }

    pub fn is_out_of_stock(&self) -> bool {
        self.stock <= 0
    }
}

/// A seller's storefront
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Shop {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
}

impl Shop {
    pub fn new(owner_id: Uuid, name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner_id,
            name: name.into(),
        }
    }

    pub fn is_owned_by(&self, user_id: Uuid) -> bool {
        self.owner_id == user_id
    }
}

/// A line in a customer's cart. Orders are built from these.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CartItem {
    pub id: Uuid,
    pub user_id: Uuid,
    pub item_id: Uuid,
    pub shop_id: Uuid,
    pub quantity: i32,
}

impl CartItem {
    pub fn new(user_id: Uuid, item: &Item, quantity: i32) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            item_id: item.id,
            shop_id: item.shop_id,
            quantity,
        }
    }
}
