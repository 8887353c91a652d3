use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    /// Optional: when absent, access tokens live in process memory.
    pub redis: Option<RedisConfig>,
    pub stripe: StripeConfig,
    pub email: EmailConfig,
    pub frontend: FrontendConfig,
    pub booking: BookingConfig,
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
pub struct StripeConfig {
    pub secret_key: String,
    pub webhook_secret: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmailConfig {
    /// Resend API key. Dispatch is log-only when unset.
    pub api_key: Option<String>,
    pub from: String,
    #[serde(default = "default_email_enabled")]
    pub enabled: bool,
}

fn default_email_enabled() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct FrontendConfig {
    /// Base URL the checkout provider redirects back to.
    pub base_url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BookingConfig {
    #[serde(default = "default_currency")]
    pub currency: String,
}

fn default_currency() -> String {
    "zar".to_string()
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            // Start off by merging in the "default" configuration file
            .add_source(config::File::with_name("config/default"))
            // Add in the current environment file
            // Default to 'development' env
            // Note that this file is _optional_
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Add in a local configuration file
            // This file shouldn't be checked in to git
            .add_source(config::File::with_name("config/local").required(false))
            // Add in settings from the environment (with a prefix of CAPEROUTE)
            // Eg.. `CAPEROUTE__SERVER__PORT=9000` would set the server port
            .add_source(config::Environment::with_prefix("CAPEROUTE").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
