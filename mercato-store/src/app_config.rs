use mercato_order::EngineSettings;
use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub kafka: KafkaConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub business_rules: BusinessRules,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct BusinessRules {
    /// Minor units charged per shop in an order
    pub shipping_fee_per_shop: i64,
    pub return_window_days: i64,
    pub tracking_code_length: usize,
    pub rate_limit_per_minute: i64,
}

impl Default for BusinessRules {
    fn default() -> Self {
        let engine = EngineSettings::default();
        Self {
            shipping_fee_per_shop: engine.shipping_fee_per_shop,
            return_window_days: engine.return_window_days,
            tracking_code_length: engine.tracking_code_length,
            rate_limit_per_minute: 120,
        }
    }
}

impl From<&BusinessRules> for EngineSettings {
    fn from(rules: &BusinessRules) -> Self {
        Self {
            shipping_fee_per_shop: rules.shipping_fee_per_shop.max(0),
            return_window_days: rules.return_window_days.max(0),
            tracking_code_length: rules.tracking_code_length.max(1),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RedisConfig {
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct KafkaConfig {
    pub brokers: String,
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // Optional per-environment overrides
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Never checked in
            .add_source(config::File::with_name("config/local").required(false))
            // e.g. `MERCATO__DATABASE__URL=postgres://...`
            .add_source(config::Environment::with_prefix("MERCATO").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_business_rules_into_engine_settings() {
        let rules = BusinessRules {
            shipping_fee_per_shop: 15000,
            return_window_days: 14,
            tracking_code_length: 12,
            rate_limit_per_minute: 60,
        };

        let settings = EngineSettings::from(&rules);
        assert_eq!(settings.shipping_fee_per_shop, 15000);
        assert_eq!(settings.return_window().num_days(), 14);
        assert_eq!(settings.tracking_code_length, 12);
    }

    #[test]
    fn test_partial_business_rules_use_defaults() {
        let source = config::Config::builder()
            .add_source(config::File::from_str(
                "[business_rules]\nshipping_fee_per_shop = 500\n",
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap();

        let rules: BusinessRules = source.get("business_rules").unwrap();
        assert_eq!(rules.shipping_fee_per_shop, 500);
        assert_eq!(rules.return_window_days, 7);
        assert_eq!(rules.tracking_code_length, 10);
    }
}
