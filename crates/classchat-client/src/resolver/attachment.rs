use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use classchat_net::ObjectStorage;
use classchat_shared::{FetchError, User};

use super::cache::{CacheStats, CoalescingCache, Resolution};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Audio,
    Avatar,
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Image => f.write_str("image"),
            Self::Audio => f.write_str("audio"),
            Self::Avatar => f.write_str("avatar"),
        }
    }
}

/// Storage key to URI lookups, memoized per key.
///
/// Keys are content-addressed, so one cache serves images, audio and
/// avatars alike. Failures are retried on the next request since an
/// upload may still be in progress.
pub struct AttachmentResolver {
    storage: Arc<dyn ObjectStorage>,
    cache: CoalescingCache<String, String>,
}

impl AttachmentResolver {
    pub fn new(storage: Arc<dyn ObjectStorage>, timeout: Duration) -> Self {
        Self {
            storage,
            cache: CoalescingCache::new("attachment", timeout),
        }
    }

    pub async fn resolve_image(&self, key: &str) -> Result<String, FetchError> {
        self.resolve(MediaKind::Image, key).await
    }

    pub async fn resolve_audio(&self, key: &str) -> Result<String, FetchError> {
        self.resolve(MediaKind::Audio, key).await
    }

    /// `Ok(None)` for users without an avatar.
    pub async fn resolve_avatar(&self, user: &User) -> Result<Option<String>, FetchError> {
        match &user.image_key {
            Some(key) => self.resolve(MediaKind::Avatar, key).await.map(Some),
            None => Ok(None),
        }
    }

    pub fn peek(&self, key: &str) -> Option<Resolution<String>> {
        self.cache.peek(&key.to_string())
    }

    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }

    async fn resolve(&self, kind: MediaKind, key: &str) -> Result<String, FetchError> {
        let storage = self.storage.clone();
        let owned = key.to_string();
        tracing::trace!(kind = %kind, key, "Resolving attachment");
        self.cache
            .get_or_fetch(key.to_string(), move || async move {
                storage.resolve(&owned).await
            })
            .await
    }
}
