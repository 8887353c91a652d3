use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use caperoute_core::repository::StoreError;
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Tokens live for one hour from issue.
pub const TOKEN_TTL_MINUTES: i64 = 60;
/// Expired entries are swept every five minutes. The sweep is hygiene only;
/// `validate` checks expiry independently.
pub const SWEEP_INTERVAL_SECS: u64 = 300;

#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Short-lived opaque credential scoping a holder to self-service operations
/// on one booking reference. Not an authentication credential for anything
/// else.
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn issue(&self, booking_ref: &str) -> Result<IssuedToken, StoreError>;

    /// Read-only check; does not refresh expiry.
    async fn validate(&self, token: &str) -> Result<Option<String>, StoreError>;

    /// Invalidate a token (cancellation consumes its token).
    async fn revoke(&self, token: &str) -> Result<(), StoreError>;
}

/// 32 random bytes, hex-encoded: 256 bits of entropy.
pub fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[derive(Debug, Clone)]
struct TokenEntry {
    booking_ref: String,
    expires_at: DateTime<Utc>,
}

/// In-process token map. Suitable for single-instance deployments only; a
/// multi-process deployment should use the Redis-backed store instead.
pub struct InMemoryTokenStore {
    entries: RwLock<HashMap<String, TokenEntry>>,
    ttl: Duration,
}

impl InMemoryTokenStore {
    pub fn new() -> Self {
        Self::with_ttl(Duration::minutes(TOKEN_TTL_MINUTES))
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// Drop expired entries. Returns how many were removed.
    pub async fn sweep(&self) -> usize {
        let now = Utc::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at > now);
        let removed = before - entries.len();
        if removed > 0 {
            debug!("Swept {} expired access tokens", removed);
        }
        removed
    }

    /// Periodic background sweep.
    pub fn spawn_sweeper(store: Arc<Self>) {
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(StdDuration::from_secs(SWEEP_INTERVAL_SECS));
            info!("Access token sweeper started");
            loop {
                interval.tick().await;
                store.sweep().await;
            }
        });
    }

    #[cfg(test)]
    async fn insert_with_expiry(&self, token: &str, booking_ref: &str, expires_at: DateTime<Utc>) {
        self.entries.write().await.insert(
            token.to_string(),
            TokenEntry {
                booking_ref: booking_ref.to_string(),
                expires_at,
            },
        );
    }
}

impl Default for InMemoryTokenStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TokenStore for InMemoryTokenStore {
    async fn issue(&self, booking_ref: &str) -> Result<IssuedToken, StoreError> {
        let token = generate_token();
        let expires_at = Utc::now() + self.ttl;
        self.entries.write().await.insert(
            token.clone(),
            TokenEntry {
                booking_ref: booking_ref.to_string(),
                expires_at,
            },
        );
        Ok(IssuedToken { token, expires_at })
    }

    async fn validate(&self, token: &str) -> Result<Option<String>, StoreError> {
        let entries = self.entries.read().await;
        match entries.get(token) {
            Some(entry) if entry.expires_at > Utc::now() => Ok(Some(entry.booking_ref.clone())),
            _ => Ok(None),
        }
    }

    async fn revoke(&self, token: &str) -> Result<(), StoreError> {
        self.entries.write().await.remove(token);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_are_long_and_unique() {
        let a = generate_token();
        let b = generate_token();
        assert_eq!(a.len(), 64);
        assert!(a.bytes().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn issue_then_validate_round_trips() {
        let store = InMemoryTokenStore::new();
        let issued = store.issue("CRT-K7XP2MQH").await.unwrap();
        assert_eq!(
            store.validate(&issued.token).await.unwrap().as_deref(),
            Some("CRT-K7XP2MQH")
        );
        // Validation is read-only: still valid afterwards.
        assert!(store.validate(&issued.token).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn validates_inside_ttl_and_rejects_past_it() {
        let store = InMemoryTokenStore::new();

        // 59 minutes of life left: valid.
        store
            .insert_with_expiry("fresh", "CRT-AAAAAAAA", Utc::now() + Duration::minutes(59))
            .await;
        assert!(store.validate("fresh").await.unwrap().is_some());

        // Expired one minute ago (issued 61 minutes back): rejected.
        store
            .insert_with_expiry("stale", "CRT-BBBBBBBB", Utc::now() - Duration::minutes(1))
            .await;
        assert!(store.validate("stale").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn revoked_token_fails_validation() {
        let store = InMemoryTokenStore::new();
        let issued = store.issue("CRT-K7XP2MQH").await.unwrap();
        store.revoke(&issued.token).await.unwrap();
        assert!(store.validate(&issued.token).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn sweep_removes_only_expired_entries() {
        let store = InMemoryTokenStore::new();
        store
            .insert_with_expiry("dead", "CRT-AAAAAAAA", Utc::now() - Duration::minutes(5))
            .await;
        let live = store.issue("CRT-BBBBBBBB").await.unwrap();

        assert_eq!(store.sweep().await, 1);
        assert!(store.validate(&live.token).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn unknown_token_is_rejected() {
        let store = InMemoryTokenStore::new();
        assert!(store.validate("deadbeef").await.unwrap().is_none());
    }
}
