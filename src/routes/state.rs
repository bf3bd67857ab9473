use std::sync::Arc;

use crate::{
    db::{Cache, EntityStore},
    error::AppResult,
    services::{
        CatalogService, FeedService, FriendshipService, LikeService, RankingService,
        RecommendationService, ReferenceCache, ReviewService,
    },
};

/// Shared application state
///
/// Every service shares the same store. The reference cache and the optional
/// ranking cache are owned here rather than held in statics.
#[derive(Clone)]
pub struct AppState {
    pub catalog: CatalogService,
    pub friendship: FriendshipService,
    pub ranking: RankingService,
    pub recommendations: RecommendationService,
    pub feed: FeedService,
    pub likes: LikeService,
    pub reviews: ReviewService,
}

impl AppState {
    /// Wires the services over `store`, loading reference data up front
    pub async fn new(
        store: Arc<dyn EntityStore>,
        cache: Option<Cache>,
        ranking_cache_ttl: u64,
    ) -> AppResult<Self> {
        let reference = ReferenceCache::load(store.clone()).await?;
        let feed = FeedService::new(store.clone());
        let ranking = RankingService::new(store.clone(), reference.clone(), cache, ranking_cache_ttl);

        Ok(Self {
            catalog: CatalogService::new(store.clone(), reference, ranking.clone()),
            friendship: FriendshipService::new(store.clone(), feed.clone()),
            recommendations: RecommendationService::new(store.clone()),
            likes: LikeService::new(store.clone(), feed.clone(), ranking.clone()),
            reviews: ReviewService::new(store, feed.clone()),
            ranking,
            feed,
        })
    }
}
