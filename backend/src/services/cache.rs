//! Short-lived cache for read-heavy inventory views
//!
//! Only `get_product_inventory` and `get_location_inventory` read through the
//! cache. Every stock write invalidates the product and location keys it
//! touched before returning.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use shared::{LocationInventory, ProductInventory};
use tokio::sync::RwLock;
use tokio::time::Instant;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKey {
    Product(Uuid),
    Location(Uuid),
}

/// A cached aggregate
#[derive(Debug, Clone)]
pub enum CachedView {
    Product(ProductInventory),
    Location(LocationInventory),
}

/// Invalidation count for one key, read before a view is built
pub type Generation = u64;

#[async_trait]
pub trait ReadCache: Send + Sync {
    async fn get(&self, key: &CacheKey) -> Option<CachedView>;
    async fn generation(&self, key: &CacheKey) -> Generation;
    /// Stores `view` only if `key` has not been invalidated since `generation` was read
    async fn set(&self, key: CacheKey, view: CachedView, generation: Generation);
    async fn invalidate(&self, key: &CacheKey);
}

struct Entry {
    view: CachedView,
    expires_at: Instant,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<CacheKey, Entry>,
    generations: HashMap<CacheKey, Generation>,
}

impl CacheState {
    fn generation(&self, key: &CacheKey) -> Generation {
        self.generations.get(key).copied().unwrap_or(0)
    }
}

/// In-process cache whose entries expire after a fixed TTL
pub struct TtlCache {
    ttl: Duration,
    state: RwLock<CacheState>,
}

impl TtlCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            state: RwLock::new(CacheState::default()),
        }
    }
}

#[async_trait]
impl ReadCache for TtlCache {
    async fn get(&self, key: &CacheKey) -> Option<CachedView> {
        {
            let state = self.state.read().await;
            match state.entries.get(key) {
                Some(entry) if entry.expires_at > Instant::now() => {
                    return Some(entry.view.clone())
                }
                Some(_) => {}
                None => return None,
            }
        }
        // Expired; drop it
        self.state.write().await.entries.remove(key);
        None
    }

    async fn generation(&self, key: &CacheKey) -> Generation {
        self.state.read().await.generation(key)
    }

    async fn set(&self, key: CacheKey, view: CachedView, generation: Generation) {
        let mut state = self.state.write().await;
        if state.generation(&key) != generation {
            tracing::debug!(?key, "Discarding view built before an invalidation");
            return;
        }
        let entry = Entry {
            view,
            expires_at: Instant::now() + self.ttl,
        };
        state.entries.insert(key, entry);
    }

    async fn invalidate(&self, key: &CacheKey) {
        let mut state = self.state.write().await;
        state.entries.remove(key);
        let generation = state.generations.entry(*key).or_insert(0);
        *generation = generation.wrapping_add(1);
    }
}
