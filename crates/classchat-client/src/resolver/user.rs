use std::sync::Arc;
use std::time::Duration;

use classchat_net::MessageBackend;
use classchat_shared::{FetchError, User, UserId};

use super::cache::{CacheStats, CoalescingCache, Resolution};

/// Author profile lookups. Unknown users resolve to `None`.
pub struct UserResolver {
    backend: Arc<dyn MessageBackend>,
    cache: CoalescingCache<UserId, Option<User>>,
}

impl UserResolver {
    pub fn new(backend: Arc<dyn MessageBackend>, timeout: Duration) -> Self {
        Self {
            backend,
            cache: CoalescingCache::new("user", timeout),
        }
    }

    pub async fn resolve(&self, id: &UserId) -> Result<Option<User>, FetchError> {
        let backend = self.backend.clone();
        let target = id.clone();
        self.cache
            .get_or_fetch(id.clone(), move || async move {
                match backend.fetch_user(&target).await {
                    Err(FetchError::NotFound(_)) => Ok(None),
                    other => other,
                }
            })
            .await
    }

    pub fn peek(&self, id: &UserId) -> Option<Resolution<Option<User>>> {
        self.cache.peek(id)
    }

    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }
}
