use std::sync::Arc;

use crate::{
    db::{EntityStore, Mutation},
    error::{AppError, AppResult},
    models::{EntityId, EventType, NewFeedEvent, NewReview, Operation, Review, ReviewVote},
    services::feed::FeedService,
};

pub const DEFAULT_REVIEW_COUNT: i64 = 10;

/// Film reviews and their usefulness votes
#[derive(Clone)]
pub struct ReviewService {
    store: Arc<dyn EntityStore>,
    feed: FeedService,
}

fn validate_content(content: &str) -> AppResult<()> {
    if content.trim().is_empty() {
        return Err(AppError::Validation(
            "review content must not be blank".to_string(),
        ));
    }
    Ok(())
}

impl ReviewService {
    pub fn new(store: Arc<dyn EntityStore>, feed: FeedService) -> Self {
        Self { store, feed }
    }

    pub async fn create(&self, review: NewReview) -> AppResult<Review> {
        validate_content(&review.content)?;
        self.store.get_user(review.user_id).await?;
        self.store.get_film(review.film_id).await?;

        let event = NewFeedEvent::new(review.user_id, 0, EventType::Review, Operation::Add);
        let (review, event) = self.store.insert_review(review, event).await?;

        tracing::info!(
            review_id = review.id,
            film_id = review.film_id,
            user_id = review.user_id,
            event_id = event.event_id,
            "Review created"
        );
        Ok(review)
    }

    /// Changes content and polarity; author and film stay as they were
    pub async fn update(
        &self,
        review_id: EntityId,
        content: String,
        is_positive: bool,
    ) -> AppResult<Review> {
        validate_content(&content)?;
        let existing = self.store.get_review(review_id).await?;

        self.feed
            .record_with(
                vec![Mutation::UpdateReview {
                    review_id,
                    content,
                    is_positive,
                }],
                NewFeedEvent::new(
                    existing.user_id,
                    review_id,
                    EventType::Review,
                    Operation::Update,
                ),
            )
            .await?;

        self.store.get_review(review_id).await
    }

    pub async fn delete(&self, review_id: EntityId) -> AppResult<()> {
        let existing = self.store.get_review(review_id).await?;

        self.feed
            .record_with(
                vec![Mutation::DeleteReview { review_id }],
                NewFeedEvent::new(
                    existing.user_id,
                    review_id,
                    EventType::Review,
                    Operation::Remove,
                ),
            )
            .await?;

        tracing::info!(review_id, "Review deleted");
        Ok(())
    }

    pub async fn get(&self, review_id: EntityId) -> AppResult<Review> {
        self.store.get_review(review_id).await
    }

    /// Most useful first, optionally restricted to one film
    pub async fn list(&self, film_id: Option<EntityId>, count: Option<i64>) -> AppResult<Vec<Review>> {
        let count = count.unwrap_or(DEFAULT_REVIEW_COUNT);
        if count <= 0 {
            return Err(AppError::Validation(format!(
                "count must be positive, got {}",
                count
            )));
        }
        if let Some(film_id) = film_id {
            self.store.get_film(film_id).await?;
        }

        let limit = usize::try_from(count).unwrap_or(usize::MAX);
        self.store.list_reviews(film_id, limit).await
    }

    /// Casts or replaces `user_id`'s vote on a review written by someone else
    pub async fn vote(&self, review_id: EntityId, user_id: EntityId, vote: ReviewVote) -> AppResult<()> {
        let review = self.store.get_review(review_id).await?;
        self.store.get_user(user_id).await?;
        if review.user_id == user_id {
            return Err(AppError::Validation(
                "authors cannot vote on their own review".to_string(),
            ));
        }

        self.store
            .apply(vec![Mutation::PutReviewVote {
                review_id,
                user_id,
                vote,
            }])
            .await?;

        tracing::debug!(review_id, user_id, vote = ?vote, "Review vote cast");
        Ok(())
    }

    /// Withdraws the vote only if it has the given polarity
    pub async fn remove_vote(
        &self,
        review_id: EntityId,
        user_id: EntityId,
        vote: ReviewVote,
    ) -> AppResult<()> {
        self.store.get_review(review_id).await?;
        self.store.get_user(user_id).await?;

        self.store
            .apply(vec![Mutation::DeleteReviewVote {
                review_id,
                user_id,
                vote,
            }])
            .await?;

        tracing::debug!(review_id, user_id, vote = ?vote, "Review vote removed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use crate::models::{Mpa, NewFilm, NewUser};
    use chrono::NaiveDate;
    use std::collections::BTreeSet;
    use tokio_test::assert_err;

    struct Fixture {
        store: Arc<MemoryStore>,
        service: ReviewService,
        users: Vec<EntityId>,
        film: EntityId,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let mut users = Vec::new();
        for login in ["ann", "bob", "cid"] {
            let user = store
                .create_user(NewUser {
                    email: format!("{}@example.com", login),
                    login: login.to_string(),
                    name: None,
                    birthday: None,
                })
                .await
                .unwrap();
            users.push(user.id);
        }
        let film = store
            .create_film(NewFilm {
                name: "Solaris".to_string(),
                description: String::new(),
                release_date: NaiveDate::from_ymd_opt(1972, 3, 20).unwrap(),
                duration: 167,
                mpa: Mpa::Pg,
                genres: BTreeSet::new(),
                director_ids: BTreeSet::new(),
            })
            .await
            .unwrap();
        let service = ReviewService::new(store.clone(), FeedService::new(store.clone()));
        Fixture {
            store,
            service,
            users,
            film: film.id,
        }
    }

    fn draft(user_id: EntityId, film_id: EntityId, content: &str) -> NewReview {
        NewReview {
            content: content.to_string(),
            user_id,
            film_id,
            is_positive: true,
        }
    }

    #[tokio::test]
    async fn test_review_lifecycle_feeds_author() {
        let fx = fixture().await;
        let author = fx.users[0];

        let review = fx
            .service
            .create(draft(author, fx.film, "Slow and haunting"))
            .await
            .unwrap();
        assert_eq!(review.useful, 0);

        let updated = fx
            .service
            .update(review.id, "Haunting".to_string(), false)
            .await
            .unwrap();
        assert_eq!(updated.content, "Haunting");
        assert!(!updated.is_positive);
        assert_eq!(updated.user_id, author);

        fx.service.delete(review.id).await.unwrap();
        assert!(matches!(
            fx.service.get(review.id).await,
            Err(AppError::NotFound(_))
        ));

        let feed: Vec<(EntityId, Operation)> = fx
            .store
            .query_feed_events(author)
            .await
            .unwrap()
            .into_iter()
            .map(|e| (e.entity_id, e.operation))
            .collect();
        assert_eq!(
            feed,
            vec![
                (review.id, Operation::Add),
                (review.id, Operation::Update),
                (review.id, Operation::Remove)
            ]
        );
    }

    #[tokio::test]
    async fn test_usefulness_orders_listing() {
        let fx = fixture().await;
        let (ann, bob, cid) = (fx.users[0], fx.users[1], fx.users[2]);

        let first = fx.service.create(draft(ann, fx.film, "first")).await.unwrap();
        let second = fx.service.create(draft(bob, fx.film, "second")).await.unwrap();

        fx.service.vote(second.id, ann, ReviewVote::Useful).await.unwrap();
        fx.service.vote(second.id, cid, ReviewVote::Useful).await.unwrap();
        fx.service.vote(first.id, cid, ReviewVote::Useless).await.unwrap();

        let listed = fx.service.list(Some(fx.film), None).await.unwrap();
        let order: Vec<(EntityId, i64)> = listed.iter().map(|r| (r.id, r.useful)).collect();
        assert_eq!(order, vec![(second.id, 2), (first.id, -1)]);

        // Switching a vote replaces it
        fx.service.vote(first.id, cid, ReviewVote::Useful).await.unwrap();
        assert_eq!(fx.service.get(first.id).await.unwrap().useful, 1);

        fx.service
            .remove_vote(first.id, cid, ReviewVote::Useful)
            .await
            .unwrap();
        assert_eq!(fx.service.get(first.id).await.unwrap().useful, 0);
    }

    #[tokio::test]
    async fn test_validation() {
        let fx = fixture().await;
        let ann = fx.users[0];

        let err = assert_err!(fx.service.create(draft(ann, fx.film, "  ")).await);
        assert!(matches!(err, AppError::Validation(_)));

        let review = fx.service.create(draft(ann, fx.film, "ok")).await.unwrap();
        let err = assert_err!(fx.service.vote(review.id, ann, ReviewVote::Useful).await);
        assert!(matches!(err, AppError::Validation(_)));

        let err = assert_err!(fx.service.list(None, Some(0)).await);
        assert!(matches!(err, AppError::Validation(_)));

        let err = assert_err!(fx.service.create(draft(ann, fx.film + 50, "ok")).await);
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
