//! Per-Robot caches for element sets and screen dimensions.
//!
//! Every Robot owns one [`Cached`] for its element set (200 ms TTL) and one
//! for its screen size (no TTL, cleared on orientation change). Mutating
//! Robot calls clear the element cache before they return, so a query issued
//! after a mutation never observes a set captured before it.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

/// How long an element set stays fresh.
pub const ELEMENT_TTL: Duration = Duration::from_millis(200);

/// A single cached value with an optional time-to-live.
#[derive(Debug)]
pub struct Cached<T> {
    ttl: Option<Duration>,
    slot: Mutex<Option<(T, Instant)>>,
}

impl<T: Clone> Cached<T> {
    /// A cache whose entries expire `ttl` after being stored.
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl: Some(ttl),
            slot: Mutex::new(None),
        }
    }

    /// A cache whose entries live until [`invalidate`](Self::invalidate).
    pub fn until_invalidated() -> Self {
        Self {
            ttl: None,
            slot: Mutex::new(None),
        }
    }

    /// The element-set cache every Robot uses.
    pub fn elements() -> Self {
        Self::with_ttl(ELEMENT_TTL)
    }

    /// Returns the cached value if it is still fresh.
    ///
    /// An expired entry is dropped on the way out.
    pub async fn get(&self) -> Option<T> {
        let mut slot = self.slot.lock().await;
        let expired = match (slot.as_ref(), self.ttl) {
            (Some((_, stored)), Some(ttl)) => stored.elapsed() >= ttl,
            _ => false,
        };
        if expired {
            *slot = None;
        }
        slot.as_ref().map(|(value, _)| value.clone())
    }

    /// Stores `value`, stamping it with the current time.
    pub async fn put(&self, value: T) {
        *self.slot.lock().await = Some((value, Instant::now()));
    }

    /// Clears the cache unconditionally.
    pub async fn invalidate(&self) {
        *self.slot.lock().await = None;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn fresh_entry_is_served() {
        let cache: Cached<Arc<[u32]>> = Cached::elements();
        let set: Arc<[u32]> = Arc::from(vec![1, 2, 3]);
        cache.put(set.clone()).await;

        tokio::time::advance(Duration::from_millis(150)).await;
        let hit = cache.get().await.expect("entry within TTL");
        assert!(Arc::ptr_eq(&hit, &set));
    }

    #[tokio::test(start_paused = true)]
    async fn entry_expires_after_ttl() {
        let cache = Cached::with_ttl(Duration::from_millis(200));
        cache.put(7u32).await;

        tokio::time::advance(Duration::from_millis(200)).await;
        assert_eq!(cache.get().await, None);
    }

    #[tokio::test]
    async fn invalidate_clears_entry() {
        let cache = Cached::elements();
        cache.put("set".to_string()).await;
        cache.invalidate().await;
        assert_eq!(cache.get().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn untimed_entry_survives_until_invalidated() {
        let cache = Cached::until_invalidated();
        cache.put(42u8).await;
        tokio::time::advance(Duration::from_secs(3600)).await;
        assert_eq!(cache.get().await, Some(42));

        cache.invalidate().await;
        assert_eq!(cache.get().await, None);
    }
}
