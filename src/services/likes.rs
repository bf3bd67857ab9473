use std::sync::Arc;

use crate::{
    db::{EntityStore, Mutation},
    error::{AppError, AppResult},
    models::{EntityId, EventType, FeedEvent, Like, NewFeedEvent, Operation, MAX_SCORE, MIN_SCORE},
    services::{feed::FeedService, ranking::RankingService},
};

/// Records likes and scores, each paired with a feed event
#[derive(Clone)]
pub struct LikeService {
    store: Arc<dyn EntityStore>,
    feed: FeedService,
    ranking: RankingService,
}

impl LikeService {
    pub fn new(store: Arc<dyn EntityStore>, feed: FeedService, ranking: RankingService) -> Self {
        Self {
            store,
            feed,
            ranking,
        }
    }

    async fn require(&self, film_id: EntityId, user_id: EntityId) -> AppResult<()> {
        self.store.get_user(user_id).await?;
        self.store.get_film(film_id).await?;
        Ok(())
    }

    /// Likes `film_id`, overwriting any earlier like or score by the same user
    pub async fn add_like(
        &self,
        film_id: EntityId,
        user_id: EntityId,
        score: Option<i32>,
    ) -> AppResult<FeedEvent> {
        if let Some(score) = score {
            if !Like::score_in_range(score) {
                return Err(AppError::Validation(format!(
                    "score must be between {} and {}, got {}",
                    MIN_SCORE, MAX_SCORE, score
                )));
            }
        }
        self.require(film_id, user_id).await?;

        let like = Like {
            user_id,
            film_id,
            score,
        };
        let event = self
            .feed
            .record_with(
                vec![Mutation::PutLike(like)],
                NewFeedEvent::new(user_id, film_id, EventType::Like, Operation::Add),
            )
            .await?;

        self.ranking.invalidate();
        tracing::info!(film_id, user_id, score = ?score, "Like added");
        Ok(event)
    }

    /// Removing a like that does not exist is not an error
    pub async fn remove_like(&self, film_id: EntityId, user_id: EntityId) -> AppResult<FeedEvent> {
        self.require(film_id, user_id).await?;

        let event = self
            .feed
            .record_with(
                vec![Mutation::DeleteLike { user_id, film_id }],
                NewFeedEvent::new(user_id, film_id, EventType::Like, Operation::Remove),
            )
            .await?;

        self.ranking.invalidate();
        tracing::info!(film_id, user_id, "Like removed");
        Ok(event)
    }
}
