use std::net::SocketAddr;
use std::sync::Arc;

use caperoute_api::{app, AppState};
use caperoute_booking::{BookingManager, InMemoryTokenStore, ManagerConfig, TokenStore};
use caperoute_core::gateway::PaymentGateway;
use caperoute_store::{
    Config, DbClient, PgBookingStore, RedisTokenStore, ResendMailer, StripeCheckoutGateway,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "caperoute_api=debug,tower_http=debug,axum::rejection=trace".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().expect("Failed to load config");
    tracing::info!("Starting Cape Route API on port {}", config.server.port);

    let db = DbClient::new(&config.database.url)
        .await
        .expect("Failed to connect to Postgres");
    db.migrate().await.expect("Failed to run migrations");

    let store = Arc::new(PgBookingStore::new(db.pool.clone()));
    let gateway: Arc<dyn PaymentGateway> = Arc::new(StripeCheckoutGateway::new(&config.stripe));
    let notifier = Arc::new(ResendMailer::new(&config.email));

    // Redis when configured, otherwise an in-process map with a background
    // sweeper. Single-instance deployments don't need Redis at all.
    let tokens: Arc<dyn TokenStore> = match &config.redis {
        Some(redis) => {
            let store = RedisTokenStore::new(&redis.url).expect("Failed to connect to Redis");
            Arc::new(store)
        }
        None => {
            let store = Arc::new(InMemoryTokenStore::new());
            InMemoryTokenStore::spawn_sweeper(store.clone());
            store
        }
    };

    let manager = Arc::new(BookingManager::new(
        store,
        gateway.clone(),
        notifier,
        tokens,
        ManagerConfig {
            currency: config.booking.currency.clone(),
            frontend_base_url: config.frontend.base_url.clone(),
        },
    ));

    let app = app(AppState { manager, gateway });

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}
