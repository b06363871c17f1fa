pub mod app_config;
pub mod database;
pub mod catalog_repo;
pub mod order_repo;
pub mod redis_repo;
pub mod events;

pub use app_config::{BusinessRules, Config};
pub use database::DbClient;
pub use order_repo::{PgOrderStore, PgStoreTransaction};
pub use redis_repo::RedisClient;
pub use events::{EventProducer, PublishError};
