//! Installation Token Cache
//!
//! Holds one access token per installation and refuses to hand out tokens
//! that are inside the renewal margin of their expiry.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::fmt;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Default renewal margin, in seconds
pub const DEFAULT_RENEWAL_MARGIN_SECS: i64 = 300;

/// An installation access token and the moment it stops being valid
#[derive(Clone, PartialEq, Eq)]
pub struct InstallationToken {
    pub installation_id: String,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl fmt::Debug for InstallationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstallationToken")
            .field("installation_id", &self.installation_id)
            .field("token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Whether `token` can still be used at `now` with `margin` to spare.
///
/// An expiry too close to the representable minimum is never usable.
pub fn usable(token: &InstallationToken, now: DateTime<Utc>, margin: Duration) -> bool {
    token
        .expires_at
        .checked_sub_signed(margin)
        .is_some_and(|limit| now < limit)
}

/// Thread-safe installation token cache
#[derive(Debug)]
pub struct TokenCache {
    entries: RwLock<HashMap<String, InstallationToken>>,
    renewal_margin: Duration,
}

impl Default for TokenCache {
    fn default() -> Self {
        Self::new(Duration::seconds(DEFAULT_RENEWAL_MARGIN_SECS))
    }
}

impl TokenCache {
    /// A negative margin is treated as zero
    pub fn new(renewal_margin: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            renewal_margin: renewal_margin.max(Duration::zero()),
        }
    }

    pub fn renewal_margin(&self) -> Duration {
        self.renewal_margin
    }

    /// Get a usable token for `installation_id`, if one is cached
    pub async fn lookup(&self, installation_id: &str) -> Option<InstallationToken> {
        self.lookup_at(installation_id, Utc::now()).await
    }

    /// Same as [`TokenCache::lookup`], evaluated at `now`
    pub async fn lookup_at(
        &self,
        installation_id: &str,
        now: DateTime<Utc>,
    ) -> Option<InstallationToken> {
        let entries = self.entries.read().await;
        let cached = entries.get(installation_id)?;
        if usable(cached, now, self.renewal_margin) {
            debug!(installation_id = %installation_id, "Using cached installation token");
            Some(cached.clone())
        } else {
            debug!(
                installation_id = %installation_id,
                expires_at = %cached.expires_at,
                "Cached installation token is within renewal margin"
            );
            None
        }
    }

    /// Replace whatever is cached for the token's installation
    pub async fn store(&self, token: InstallationToken) {
        let mut entries = self.entries.write().await;
        entries.insert(token.installation_id.clone(), token);
    }

    /// Drop every cached token
    pub async fn clear(&self) {
        let mut entries = self.entries.write().await;
        let dropped = entries.len();
        entries.clear();
        info!(dropped, "Cleared installation token cache");
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn token(id: &str, value: &str, expires_at: DateTime<Utc>) -> InstallationToken {
        InstallationToken {
            installation_id: id.to_string(),
            token: value.to_string(),
            expires_at,
        }
    }

    #[test]
    fn test_usable_margin() {
        let now = Utc::now();
        let margin = Duration::seconds(300);

        assert!(usable(&token("1", "t", now + Duration::seconds(301)), now, margin));
        assert!(!usable(&token("1", "t", now + Duration::seconds(300)), now, margin));
        assert!(!usable(&token("1", "t", now + Duration::seconds(120)), now, margin));
        assert!(!usable(&token("1", "t", now - Duration::seconds(1)), now, margin));
    }

    #[test]
    fn test_usable_at_extreme_expiry() {
        let now = Utc::now();
        let margin = Duration::seconds(300);

        assert!(!usable(&token("1", "t", DateTime::<Utc>::MIN_UTC), now, margin));
        assert!(usable(&token("1", "t", DateTime::<Utc>::MAX_UTC), now, margin));
    }

    #[tokio::test]
    async fn test_extreme_expiry_lookup_misses() {
        let cache = TokenCache::default();
        cache.store(token("42", "ghs_abc", DateTime::<Utc>::MIN_UTC)).await;

        assert_eq!(cache.lookup("42").await, None);
    }

    #[tokio::test]
    async fn test_negative_margin_clamped() {
        let cache = TokenCache::new(Duration::seconds(-3600));
        let now = Utc::now();
        assert_eq!(cache.renewal_margin(), Duration::zero());

        cache.store(token("42", "ghs_abc", now - Duration::minutes(30))).await;
        assert_eq!(cache.lookup_at("42", now).await, None);
    }

    #[tokio::test]
    async fn test_lookup_after_store() {
        let cache = TokenCache::default();
        let now = Utc::now();
        let stored = token("42", "ghs_abc", now + Duration::hours(1));

        cache.store(stored.clone()).await;

        assert_eq!(cache.lookup_at("42", now).await, Some(stored));
        assert_eq!(cache.lookup_at("43", now).await, None);
    }

    #[tokio::test]
    async fn test_lookup_inside_margin_misses() {
        let cache = TokenCache::default();
        let now = Utc::now();

        // Not yet expired, but inside the five minute margin
        cache
            .store(token("42", "ghs_abc", now + Duration::seconds(299)))
            .await;

        assert_eq!(cache.lookup_at("42", now).await, None);
        // Entry is kept until overwritten
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_store_replaces_entry() {
        let cache = TokenCache::default();
        let now = Utc::now();

        cache.store(token("42", "old", now + Duration::seconds(10))).await;
        cache.store(token("42", "new", now + Duration::hours(1))).await;

        let found = cache.lookup_at("42", now).await.unwrap();
        assert_eq!(found.token, "new");
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_clear() {
        let cache = TokenCache::default();
        let expires = Utc::now() + Duration::hours(1);
        cache.store(token("1", "a", expires)).await;
        cache.store(token("2", "b", expires)).await;

        cache.clear().await;

        assert!(cache.is_empty().await);
        assert_eq!(cache.lookup("1").await, None);
        assert_eq!(cache.lookup("2").await, None);
    }

    #[tokio::test]
    async fn test_custom_margin() {
        let cache = TokenCache::new(Duration::seconds(10));
        let now = Utc::now();
        cache.store(token("1", "a", now + Duration::seconds(60))).await;
        assert!(cache.lookup_at("1", now).await.is_some());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_store_and_lookup() {
        let cache = Arc::new(TokenCache::default());
        let expires = Utc::now() + Duration::hours(1);

        let mut handles = Vec::new();
        for i in 0..32 {
            let cache = Arc::clone(&cache);
            handles.push(tokio::spawn(async move {
                let value = format!("token-{}", i);
                cache.store(token("shared", &value, expires)).await;
                let seen = cache.lookup("shared").await.unwrap();
                // Whole entries only: token and expiry always travel together
                assert!(seen.token.starts_with("token-"));
                assert_eq!(seen.expires_at, expires);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(cache.len().await, 1);
    }
}
