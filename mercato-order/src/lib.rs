pub mod models;
pub mod lifecycle;
pub mod fulfillment;
pub mod orchestrator;
pub mod settings;
pub mod error;
pub mod repository;
pub mod memory;
pub mod engine;
pub mod checkout;
pub mod cancellation;
pub mod returns;

pub use models::{
    DeliveryAddress, Order, OrderItem, OrderItemStatus, OrderShop, OrderShopStatus, OrderStatus,
    ReturnOrder, ReturnOrderItem, ReturnStatus,
};
pub use lifecycle::InvalidTransition;
pub use fulfillment::{RandomTrackingCodes, SequentialTrackingCodes, TrackingCodeGenerator};
pub use orchestrator::RefundOrchestrator;
pub use settings::EngineSettings;
pub use error::{ErrorKind, OrderError};
pub use repository::{OrderStore, StoreError, StoreResult, StoreTransaction};
pub use memory::MemoryStore;
pub use engine::OrderEngine;
pub use checkout::{CreateOrderRequest, OrderReceipt, ShopReceipt};
pub use cancellation::CancellationReceipt;
pub use returns::{ReturnDecisionReceipt, ReturnItemReceipt, ReturnReceipt, ReturnRequest};
