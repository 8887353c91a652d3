use async_trait::async_trait;
use caperoute_booking::tokens::{generate_token, IssuedToken, TokenStore, TOKEN_TTL_MINUTES};
use caperoute_core::repository::StoreError;
use chrono::{Duration, Utc};
use redis::AsyncCommands;

/// Redis-backed access token store for multi-process deployments. Expiry is
/// delegated to key TTLs, so no sweeper is needed.
#[derive(Clone)]
pub struct RedisTokenStore {
    client: redis::Client,
    ttl_seconds: u64,
}

impl RedisTokenStore {
    pub fn new(connection_string: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(connection_string)?;
        Ok(Self {
            client,
            ttl_seconds: (TOKEN_TTL_MINUTES * 60) as u64,
        })
    }

    fn key(token: &str) -> String {
        format!("booking:token:{}", token)
    }
}

#[async_trait]
impl TokenStore for RedisTokenStore {
    async fn issue(&self, booking_ref: &str) -> Result<IssuedToken, StoreError> {
        let token = generate_token();
        let expires_at = Utc::now() + Duration::seconds(self.ttl_seconds as i64);
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        conn.set_ex::<_, _, ()>(Self::key(&token), booking_ref, self.ttl_seconds)
            .await?;
        Ok(IssuedToken { token, expires_at })
    }

    async fn validate(&self, token: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let booking_ref: Option<String> = conn.get(Self::key(token)).await?;
        Ok(booking_ref)
    }

    async fn revoke(&self, token: &str) -> Result<(), StoreError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        conn.del::<_, ()>(Self::key(token)).await?;
        Ok(())
    }
}
