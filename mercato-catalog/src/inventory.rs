use uuid::Uuid;
use std::collections::HashMap;

use crate::item::Item;

struct TrackedItem {
    item: Item,
    loaded_stock: i32,
}

/// Working copy of the stock counters touched by one operation.
///
/// Items are loaded once, adjusted in memory for every line of the request, and
/// written back once with the version they were read at.
pub struct StockLedger {
    items: HashMap<Uuid, TrackedItem>,
}

impl StockLedger {
    pub fn new() -> Self {
        Self {
            items: HashMap::new(),
        }
    }

    /// Start tracking an item. An item already tracked keeps its working value.
    pub fn track(&mut self, item: Item) {
        self.items.entry(item.id).or_insert_with(|| TrackedItem {
            loaded_stock: item.stock,
            item,
        });
    }

    pub fn is_tracked(&self, item_id: &Uuid) -> bool {
        self.items.contains_key(item_id)
    }

    pub fn get(&self, item_id: &Uuid) -> Option<&Item> {
        self.items.get(item_id).map(|t| &t.item)
    }

    /// Take `quantity` units out of stock
    pub fn reserve(&mut self, item_id: &Uuid, quantity: i32) -> Result<(), InventoryError> {
        if quantity < 1 {
            return Err(InventoryError::InvalidQuantity(quantity));
        }

        let tracked = self.items.get_mut(item_id)
            .ok_or(InventoryError::NotTracked(*item_id))?;

        if tracked.item.is_out_of_stock() {
            return Err(InventoryError::OutOfStock(*item_id));
        }

        if quantity > tracked.item.stock {
            return Err(InventoryError::InsufficientStock {
                item_id: *item_id,
                requested: quantity,
                available: tracked.item.stock,
            });
        }

        tracked.item.stock -= quantity;
        Ok(())
    }

    /// Put `quantity` units back (cancellation or approved return)
    pub fn release(&mut self, item_id: &Uuid, quantity: i32) -> Result<(), InventoryError> {
        if quantity < 1 {
            return Err(InventoryError::InvalidQuantity(quantity));
        }

        let tracked = self.items.get_mut(item_id)
            .ok_or(InventoryError::NotTracked(*item_id))?;

        tracked.item.stock += quantity;
        Ok(())
    }

    /// Items whose stock differs from the value they were loaded with
    pub fn changed(&self) -> Vec<&Item> {
        let mut changed: Vec<&Item> = self.items.values()
            .filter(|t| t.item.stock != t.loaded_stock)
            .map(|t| &t.item)
            .collect();
        // Stable write order keeps concurrent writers from interleaving row locks differently
        changed.sort_by_key(|item| item.id);
        changed
    }
}

impl Default for StockLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum InventoryError {
    #[error("Item not loaded into the stock ledger: {0}")]
    NotTracked(Uuid),

    #[error("Item out of stock: {0}")]
    OutOfStock(Uuid),

    #[error("Insufficient stock for {item_id}: requested {requested}, available {available}")]
    InsufficientStock {
        item_id: Uuid,
        requested: i32,
        available: i32,
    },

    #[error("Invalid quantity: {0}")]
    InvalidQuantity(i32),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(stock: i32) -> Item {
        Item::new(Uuid::new_v4(), "Ceramic mug", 100, stock)
    }

    #[test]
    fn test_reserve_and_release() {
        let mut ledger = StockLedger::new();
        let item = item(10);
        let item_id = item.id;
        ledger.track(item);

        ledger.reserve(&item_id, 2).unwrap();
        assert_eq!(ledger.get(&item_id).unwrap().stock, 8);

        ledger.release(&item_id, 2).unwrap();
        assert_eq!(ledger.get(&item_id).unwrap().stock, 10);
        assert!(ledger.changed().is_empty());
    }

    #[test]
    fn test_out_of_stock() {
        let mut ledger = StockLedger::new();
        let item = item(0);
        let item_id = item.id;
        ledger.track(item);

        assert_eq!(ledger.reserve(&item_id, 1), Err(InventoryError::OutOfStock(item_id)));
    }

    #[test]
    fn test_insufficient_stock_counts_earlier_lines() {
        let mut ledger = StockLedger::new();
        let item = item(3);
        let item_id = item.id;
        ledger.track(item);

        ledger.reserve(&item_id, 2).unwrap();
        let result = ledger.reserve(&item_id, 2);
        assert_eq!(
            result,
            Err(InventoryError::InsufficientStock { item_id, requested: 2, available: 1 })
        );
        // The failed reservation leaves the working value alone
        assert_eq!(ledger.get(&item_id).unwrap().stock, 1);
    }

    #[test]
    fn test_tracking_twice_keeps_working_value() {
        let mut ledger = StockLedger::new();
        let item = item(5);
        let item_id = item.id;
        ledger.track(item.clone());
        ledger.reserve(&item_id, 4).unwrap();

        ledger.track(item);
        assert_eq!(ledger.get(&item_id).unwrap().stock, 1);
        assert_eq!(ledger.changed().len(), 1);
        assert_eq!(ledger.changed()[0].version, 0);
    }

    #[test]
    fn test_invalid_quantity() {
        let mut ledger = StockLedger::new();
        let item = item(5);
        let item_id = item.id;
        ledger.track(item);

        assert_eq!(ledger.reserve(&item_id, 0), Err(InventoryError::InvalidQuantity(0)));
        assert_eq!(ledger.release(&item_id, -1), Err(InventoryError::InvalidQuantity(-1)));
        assert_eq!(
            ledger.reserve(&Uuid::nil(), 1),
            Err(InventoryError::NotTracked(Uuid::nil()))
        );
    }
}
