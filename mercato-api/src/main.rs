use anyhow::Context;
use mercato_api::{app, middleware::JwtIdentityResolver, AppState};
use mercato_core::refund::MockRefundService;
use mercato_order::{EngineSettings, OrderEngine, RandomTrackingCodes};
use mercato_store::{Config, DbClient, EventProducer, PgOrderStore, RedisClient};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mercato_api=debug,mercato_order=debug,tower_http=debug,axum::rejection=trace".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!("Starting Mercato API on port {}", config.server.port);

    // Database
    let db = DbClient::new(&config.database.url)
        .await
        .context("Failed to connect to Postgres")?;
    db.migrate().await.context("Failed to run migrations")?;

    // Redis Connection
    let redis = match RedisClient::new(&config.redis.url).await {
        Ok(client) => Some(Arc::new(client)),
        Err(e) => {
            tracing::warn!("Redis unavailable, rate limiting disabled: {}", e);
            None
        }
    };

    // Kafka Connection
    let kafka = match EventProducer::new(&config.kafka.brokers) {
        Ok(producer) => Some(Arc::new(producer)),
        Err(e) => {
            tracing::warn!("Kafka unavailable, domain events disabled: {}", e);
            None
        }
    };

    let settings = EngineSettings::from(&config.business_rules);
    tracing::warn!("No payment provider configured, refunds go to the in-process mock");

    let engine = OrderEngine::new(
        Arc::new(PgOrderStore::new(db.pool.clone())),
        Arc::new(MockRefundService::new()),
        Arc::new(RandomTrackingCodes::new(settings.tracking_code_length)),
        settings,
    );

    let app_state = AppState {
        engine: Arc::new(engine),
        identity: Arc::new(JwtIdentityResolver::new(&config.auth.jwt_secret)),
        redis,
        kafka,
        rate_limit_per_minute: config.business_rules.rate_limit_per_minute,
    };

    let app = app(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
