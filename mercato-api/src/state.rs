use mercato_core::IdentityResolver;
use mercato_order::OrderEngine;
use mercato_store::{EventProducer, RedisClient};
use serde::Serialize;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<OrderEngine>,
    pub identity: Arc<dyn IdentityResolver>,
    /// Rate limiting is skipped when absent
    pub redis: Option<Arc<RedisClient>>,
    /// Domain events are dropped when absent
    pub kafka: Option<Arc<EventProducer>>,
    pub rate_limit_per_minute: i64,
}

impl AppState {
    pub fn new(engine: Arc<OrderEngine>, identity: Arc<dyn IdentityResolver>) -> Self {
        Self {
            engine,
            identity,
            redis: None,
            kafka: None,
            rate_limit_per_minute: 120,
        }
    }

    /// Fire-and-forget publish. The request never waits on the broker.
    pub fn publish<T: Serialize + Send + Sync + 'static>(&self, topic: &'static str, key: String, event: T) {
        let Some(kafka) = self.kafka.clone() else {
            return;
        };

        tokio::spawn(async move {
            if let Err(e) = kafka.publish_event(topic, &key, &event).await {
                tracing::warn!("Failed to publish {} event for {}: {}", topic, key, e);
            }
        });
    }
}
