pub mod app_config;
pub mod booking_repo;
pub mod database;
pub mod mailer;
pub mod redis_tokens;
pub mod stripe_gateway;

pub use app_config::Config;
pub use booking_repo::PgBookingStore;
pub use database::DbClient;
pub use mailer::ResendMailer;
pub use redis_tokens::RedisTokenStore;
pub use stripe_gateway::StripeCheckoutGateway;
