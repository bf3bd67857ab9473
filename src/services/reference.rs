use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::{
    db::EntityStore,
    error::{AppError, AppResult},
    models::EntityId,
};

/// Known director ids, loaded once at startup.
///
/// Owned by the application state rather than held globally. Director writes
/// call [`ReferenceCache::invalidate`]; the next lookup reloads from the store.
/// A reload that overlaps an invalidation answers its caller but is not kept.
#[derive(Clone)]
pub struct ReferenceCache {
    store: Arc<dyn EntityStore>,
    directors: Arc<RwLock<Option<BTreeSet<EntityId>>>>,
    generation: Arc<AtomicU64>,
}

impl ReferenceCache {
    /// Builds the cache and populates it from the store
    pub async fn load(store: Arc<dyn EntityStore>) -> AppResult<Self> {
        let cache = Self {
            store,
            directors: Arc::new(RwLock::new(None)),
            generation: Arc::new(AtomicU64::new(0)),
        };
        let count = cache.reload().await?.len();
        tracing::info!(directors = count, "Reference cache loaded");
        Ok(cache)
    }

    async fn reload(&self) -> AppResult<BTreeSet<EntityId>> {
        let generation = self.generation.load(Ordering::Acquire);
        let ids: BTreeSet<EntityId> = self
            .store
            .list_directors()
            .await?
            .into_iter()
            .map(|director| director.id)
            .collect();

        let mut slot = self.directors.write().await;
        if self.generation.load(Ordering::Acquire) == generation {
            *slot = Some(ids.clone());
        } else {
            tracing::debug!("Directors changed during reload, result not cached");
        }
        Ok(ids)
    }

    pub async fn contains_director(&self, director_id: EntityId) -> AppResult<bool> {
        if let Some(ids) = self.directors.read().await.as_ref() {
            return Ok(ids.contains(&director_id));
        }
        tracing::debug!("Reference cache empty, reloading directors");
        Ok(self.reload().await?.contains(&director_id))
    }

    pub async fn require_director(&self, director_id: EntityId) -> AppResult<()> {
        if self.contains_director(director_id).await? {
            Ok(())
        } else {
            Err(AppError::NotFound(format!(
                "director {} not found",
                director_id
            )))
        }
    }

    pub async fn invalidate(&self) {
        let mut slot = self.directors.write().await;
        self.generation.fetch_add(1, Ordering::AcqRel);
        *slot = None;
    }
}
