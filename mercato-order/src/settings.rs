use chrono::Duration;

/// Business rules the engine applies
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    /// Flat shipping fee charged for every shop in an order, in minor units
    pub shipping_fee_per_shop: i64,
    /// Days after delivery during which items can be returned
    pub return_window_days: i64,
    pub tracking_code_length: usize,
}

impl EngineSettings {
    pub fn return_window(&self) -> Duration {
        Duration::days(self.return_window_days)
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            shipping_fee_per_shop: 0,
            return_window_days: 7,
            tracking_code_length: 10,
        }
    }
}
