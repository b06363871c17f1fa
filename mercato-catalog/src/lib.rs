pub mod item;
pub mod voucher;
pub mod pricing;
pub mod inventory;

pub use item::{CartItem, Item, Shop};
pub use voucher::{DiscountMethod, Voucher, VoucherError, VoucherTarget};
pub use inventory::{InventoryError, StockLedger};
pub use pricing::AmountOverflow;
