//! Entity store capability.
//!
//! The services only ever talk to storage through [`EntityStore`]. Two
//! variants exist, picked once at startup: [`super::MemoryStore`] and
//! [`super::PgStore`].

use std::collections::{BTreeSet, HashMap};

use crate::{
    error::AppResult,
    models::{
        Director, EdgeChange, EntityId, FeedEvent, Film, FriendshipStatus, Like, NewFeedEvent,
        NewFilm, NewReview, NewUser, Review, ReviewVote, User,
    },
};

/// A write applied as part of an atomic batch
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    Edge(EdgeChange),
    /// `from` asks `to` to be friends. The store reads both edges and applies
    /// [`FriendshipState::on_request`](crate::models::FriendshipState::on_request)
    /// within the same atomic step, serialised per unordered pair.
    RequestFriend { from: EntityId, to: EntityId },
    /// Insert or overwrite the (user, film) like
    PutLike(Like),
    DeleteLike {
        user_id: EntityId,
        film_id: EntityId,
    },
    UpdateReview {
        review_id: EntityId,
        content: String,
        is_positive: bool,
    },
    /// Removes the review together with its votes
    DeleteReview { review_id: EntityId },
    /// Insert or overwrite the (review, user) vote
    PutReviewVote {
        review_id: EntityId,
        user_id: EntityId,
        vote: ReviewVote,
    },
    /// Removes the (review, user) vote only when it has the given polarity
    DeleteReviewVote {
        review_id: EntityId,
        user_id: EntityId,
        vote: ReviewVote,
    },
}

/// Durable keyed storage for users, films, likes, friendships, reviews and
/// feed events.
///
/// Lookups of a single entity fail with `AppError::NotFound` when it is
/// absent. Backend failures surface as `AppError::StorageUnavailable`.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait EntityStore: Send + Sync {
    async fn create_user(&self, user: NewUser) -> AppResult<User>;

    async fn get_user(&self, id: EntityId) -> AppResult<User>;

    /// Fails with `NotFound` when a referenced director does not exist
    async fn create_film(&self, film: NewFilm) -> AppResult<Film>;

    async fn get_film(&self, id: EntityId) -> AppResult<Film>;

    /// All films ordered by id
    async fn list_films(&self) -> AppResult<Vec<Film>>;

    async fn create_director(&self, name: String) -> AppResult<Director>;

    /// Also detaches the director from every film
    async fn delete_director(&self, id: EntityId) -> AppResult<()>;

    async fn list_directors(&self) -> AppResult<Vec<Director>>;

    async fn get_friend_edge(
        &self,
        from: EntityId,
        to: EntityId,
    ) -> AppResult<Option<FriendshipStatus>>;

    /// Targets of every edge leaving `user_id`, whatever their status
    async fn list_outgoing_edges(&self, user_id: EntityId) -> AppResult<BTreeSet<EntityId>>;

    /// Like counts per film; films without likes are absent from the map
    async fn get_like_counts(&self) -> AppResult<HashMap<EntityId, i64>>;

    async fn get_liked_film_ids(&self, user_id: EntityId) -> AppResult<BTreeSet<EntityId>>;

    async fn list_users_who_liked(&self, film_id: EntityId) -> AppResult<BTreeSet<EntityId>>;

    async fn get_review(&self, id: EntityId) -> AppResult<Review>;

    /// Reviews ordered by usefulness descending, then id ascending
    async fn list_reviews(
        &self,
        film_id: Option<EntityId>,
        limit: usize,
    ) -> AppResult<Vec<Review>>;

    /// Inserts the review and appends `event` atomically. The event's
    /// entity id is replaced by the id assigned to the review.
    async fn insert_review(
        &self,
        review: NewReview,
        event: NewFeedEvent,
    ) -> AppResult<(Review, FeedEvent)>;

    /// Applies every mutation and appends `event` in one atomic step
    async fn commit(&self, mutations: Vec<Mutation>, event: NewFeedEvent)
        -> AppResult<FeedEvent>;

    /// Applies every mutation in one atomic step without a feed event
    async fn apply(&self, mutations: Vec<Mutation>) -> AppResult<()>;

    /// Assigns the next event id and the current timestamp
    async fn append_feed_event(&self, event: NewFeedEvent) -> AppResult<FeedEvent>;

    /// Events whose actor is `user_id`, ordered by timestamp then id
    async fn query_feed_events(&self, user_id: EntityId) -> AppResult<Vec<FeedEvent>>;
}
