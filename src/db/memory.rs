use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tokio::sync::RwLock;

use super::store::{EntityStore, Mutation};
use crate::{
    error::{AppError, AppResult},
    models::{
        Director, EdgeChange, EntityId, FeedEvent, Film, FriendshipState, FriendshipStatus, Like,
        NewFeedEvent, NewFilm, NewReview, NewUser, Review, ReviewVote, User,
    },
};

/// Process-local entity store.
///
/// All tables sit behind a single lock; every batch runs under the write
/// guard, so id assignment and multi-row writes are serialised.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

#[derive(Default)]
struct Tables {
    last_id: EntityId,
    last_event_at: Option<DateTime<Utc>>,
    users: BTreeMap<EntityId, User>,
    films: BTreeMap<EntityId, Film>,
    directors: BTreeMap<EntityId, Director>,
    edges: HashMap<(EntityId, EntityId), FriendshipStatus>,
    likes: BTreeMap<(EntityId, EntityId), Like>,
    reviews: BTreeMap<EntityId, Review>,
    review_votes: HashMap<(EntityId, EntityId), ReviewVote>,
    feed: Vec<FeedEvent>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Tables {
    fn next_id(&mut self) -> EntityId {
        self.last_id += 1;
        self.last_id
    }

    fn require_user(&self, id: EntityId) -> AppResult<()> {
        if self.users.contains_key(&id) {
            Ok(())
        } else {
            Err(AppError::user_not_found(id))
        }
    }

    fn require_film(&self, id: EntityId) -> AppResult<()> {
        if self.films.contains_key(&id) {
            Ok(())
        } else {
            Err(AppError::film_not_found(id))
        }
    }

    fn require_review(&self, id: EntityId) -> AppResult<()> {
        if self.reviews.contains_key(&id) {
            Ok(())
        } else {
            Err(AppError::NotFound(format!("review {} not found", id)))
        }
    }

    /// Referential checks, run for the whole batch before anything is written
    fn check(&self, mutation: &Mutation) -> AppResult<()> {
        match mutation {
            Mutation::Edge(EdgeChange::Put { from, to, .. })
            | Mutation::RequestFriend { from, to } => {
                self.require_user(*from)?;
                self.require_user(*to)
            }
            Mutation::Edge(EdgeChange::Delete { .. }) => Ok(()),
            Mutation::PutLike(like) => {
                self.require_user(like.user_id)?;
                self.require_film(like.film_id)
            }
            Mutation::DeleteLike { .. } => Ok(()),
            Mutation::UpdateReview { review_id, .. } | Mutation::DeleteReview { review_id } => {
                self.require_review(*review_id)
            }
            Mutation::PutReviewVote {
                review_id, user_id, ..
            } => {
                self.require_review(*review_id)?;
                self.require_user(*user_id)
            }
            Mutation::DeleteReviewVote { .. } => Ok(()),
        }
    }

    fn write(&mut self, mutation: Mutation) {
        match mutation {
            Mutation::Edge(EdgeChange::Put { from, to, status }) => {
                self.edges.insert((from, to), status);
            }
            Mutation::Edge(EdgeChange::Delete { from, to }) => {
                self.edges.remove(&(from, to));
            }
            Mutation::RequestFriend { from, to } => {
                let state = FriendshipState::from_edges(
                    self.edges.get(&(from, to)).copied(),
                    self.edges.get(&(to, from)).copied(),
                );
                for change in state.on_request(from, to) {
                    self.write(Mutation::Edge(change));
                }
            }
            Mutation::PutLike(like) => {
                self.likes.insert((like.user_id, like.film_id), like);
            }
            Mutation::DeleteLike { user_id, film_id } => {
                self.likes.remove(&(user_id, film_id));
            }
            Mutation::UpdateReview {
                review_id,
                content,
                is_positive,
            } => {
                if let Some(review) = self.reviews.get_mut(&review_id) {
                    review.content = content;
                    review.is_positive = is_positive;
                }
            }
            Mutation::DeleteReview { review_id } => {
                self.reviews.remove(&review_id);
                self.review_votes.retain(|(review, _), _| *review != review_id);
            }
            Mutation::PutReviewVote {
                review_id,
                user_id,
                vote,
            } => {
                self.review_votes.insert((review_id, user_id), vote);
            }
            Mutation::DeleteReviewVote {
                review_id,
                user_id,
                vote,
            } => {
                if self.review_votes.get(&(review_id, user_id)) == Some(&vote) {
                    self.review_votes.remove(&(review_id, user_id));
                }
            }
        }
    }

    fn write_batch(&mut self, mutations: Vec<Mutation>) -> AppResult<()> {
        for mutation in &mutations {
            self.check(mutation)?;
        }
        for mutation in mutations {
            self.write(mutation);
        }
        Ok(())
    }

    fn append(&mut self, event: NewFeedEvent) -> FeedEvent {
        // Timestamps never go backwards, even if the wall clock does
        let now = Utc::now();
        let timestamp = match self.last_event_at {
            Some(last) if last > now => last,
            _ => now,
        };
        self.last_event_at = Some(timestamp);

        let event = event.into_event(self.next_id(), timestamp);
        self.feed.push(event.clone());
        event
    }

    fn with_usefulness(&self, review: &Review) -> Review {
        let useful = self
            .review_votes
            .iter()
            .filter(|((review_id, _), _)| *review_id == review.id)
            .map(|(_, vote)| vote.weight())
            .sum();
        Review {
            useful,
            ..review.clone()
        }
    }
}

#[async_trait::async_trait]
impl EntityStore for MemoryStore {
    async fn create_user(&self, user: NewUser) -> AppResult<User> {
        let mut tables = self.tables.write().await;
        let user = user.into_user(tables.next_id());
        tables.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn get_user(&self, id: EntityId) -> AppResult<User> {
        let tables = self.tables.read().await;
        tables
            .users
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::user_not_found(id))
    }

    async fn create_film(&self, film: NewFilm) -> AppResult<Film> {
        let mut tables = self.tables.write().await;

        let mut directors = Vec::with_capacity(film.director_ids.len());
        for director_id in &film.director_ids {
            let director = tables.directors.get(director_id).cloned().ok_or_else(|| {
                AppError::NotFound(format!("director {} not found", director_id))
            })?;
            directors.push(director);
        }

        let film = Film {
            id: tables.next_id(),
            name: film.name,
            description: film.description,
            release_date: film.release_date,
            duration: film.duration,
            mpa: film.mpa,
            genres: film.genres,
            directors,
        };
        tables.films.insert(film.id, film.clone());
        Ok(film)
    }

    async fn get_film(&self, id: EntityId) -> AppResult<Film> {
        let tables = self.tables.read().await;
        tables
            .films
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::film_not_found(id))
    }

    async fn list_films(&self) -> AppResult<Vec<Film>> {
        let tables = self.tables.read().await;
        Ok(tables.films.values().cloned().collect())
    }

    async fn create_director(&self, name: String) -> AppResult<Director> {
        let mut tables = self.tables.write().await;
        let director = Director {
            id: tables.next_id(),
            name,
        };
        tables.directors.insert(director.id, director.clone());
        Ok(director)
    }

    async fn delete_director(&self, id: EntityId) -> AppResult<()> {
        let mut tables = self.tables.write().await;
        if tables.directors.remove(&id).is_none() {
            return Err(AppError::NotFound(format!("director {} not found", id)));
        }
        for film in tables.films.values_mut() {
            film.directors.retain(|d| d.id != id);
        }
        Ok(())
    }

    async fn list_directors(&self) -> AppResult<Vec<Director>> {
        let tables = self.tables.read().await;
        Ok(tables.directors.values().cloned().collect())
    }

    async fn get_friend_edge(
        &self,
        from: EntityId,
        to: EntityId,
    ) -> AppResult<Option<FriendshipStatus>> {
        let tables = self.tables.read().await;
        Ok(tables.edges.get(&(from, to)).copied())
    }

    async fn list_outgoing_edges(&self, user_id: EntityId) -> AppResult<BTreeSet<EntityId>> {
        let tables = self.tables.read().await;
        Ok(tables
            .edges
            .keys()
            .filter(|(from, _)| *from == user_id)
            .map(|(_, to)| *to)
            .collect())
    }

    async fn get_like_counts(&self) -> AppResult<HashMap<EntityId, i64>> {
        let tables = self.tables.read().await;
        let mut counts = HashMap::new();
        for (_, film_id) in tables.likes.keys() {
            *counts.entry(*film_id).or_insert(0) += 1;
        }
        Ok(counts)
    }

    async fn get_liked_film_ids(&self, user_id: EntityId) -> AppResult<BTreeSet<EntityId>> {
        let tables = self.tables.read().await;
        Ok(tables
            .likes
            .range((user_id, EntityId::MIN)..=(user_id, EntityId::MAX))
            .map(|((_, film_id), _)| *film_id)
            .collect())
    }

    async fn list_users_who_liked(&self, film_id: EntityId) -> AppResult<BTreeSet<EntityId>> {
        let tables = self.tables.read().await;
        Ok(tables
            .likes
            .keys()
            .filter(|(_, film)| *film == film_id)
            .map(|(user, _)| *user)
            .collect())
    }

    async fn get_review(&self, id: EntityId) -> AppResult<Review> {
        let tables = self.tables.read().await;
        let review = tables
            .reviews
            .get(&id)
            .ok_or_else(|| AppError::NotFound(format!("review {} not found", id)))?;
        Ok(tables.with_usefulness(review))
    }

    async fn list_reviews(
        &self,
        film_id: Option<EntityId>,
        limit: usize,
    ) -> AppResult<Vec<Review>> {
        let tables = self.tables.read().await;
        let mut reviews: Vec<Review> = tables
            .reviews
            .values()
            .filter(|review| film_id.map_or(true, |film| review.film_id == film))
            .map(|review| tables.with_usefulness(review))
            .collect();

        reviews.sort_by(|a, b| b.useful.cmp(&a.useful).then(a.id.cmp(&b.id)));
        reviews.truncate(limit);
        Ok(reviews)
    }

    async fn insert_review(
        &self,
        review: NewReview,
        event: NewFeedEvent,
    ) -> AppResult<(Review, FeedEvent)> {
        let mut tables = self.tables.write().await;
        tables.require_user(review.user_id)?;
        tables.require_film(review.film_id)?;

        let review = review.into_review(tables.next_id());
        tables.reviews.insert(review.id, review.clone());
        let event = tables.append(NewFeedEvent {
            entity_id: review.id,
            ..event
        });
        Ok((review, event))
    }

    async fn commit(
        &self,
        mutations: Vec<Mutation>,
        event: NewFeedEvent,
    ) -> AppResult<FeedEvent> {
        let mut tables = self.tables.write().await;
        tables.write_batch(mutations)?;
        Ok(tables.append(event))
    }

    async fn apply(&self, mutations: Vec<Mutation>) -> AppResult<()> {
        let mut tables = self.tables.write().await;
        tables.write_batch(mutations)
    }

    async fn append_feed_event(&self, event: NewFeedEvent) -> AppResult<FeedEvent> {
        let mut tables = self.tables.write().await;
        Ok(tables.append(event))
    }

    async fn query_feed_events(&self, user_id: EntityId) -> AppResult<Vec<FeedEvent>> {
        let tables = self.tables.read().await;
        let mut events: Vec<FeedEvent> = tables
            .feed
            .iter()
            .filter(|event| event.user_id == user_id)
            .cloned()
            .collect();
        events.sort_by(|a, b| {
            a.timestamp
                .cmp(&b.timestamp)
                .then(a.event_id.cmp(&b.event_id))
        });
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EventType, Mpa, Operation};
    use std::sync::Arc;
    use chrono::NaiveDate;

    fn new_user(login: &str) -> NewUser {
        NewUser {
            email: format!("{}@example.com", login),
            login: login.to_string(),
            name: None,
            birthday: None,
        }
    }

    fn new_film(name: &str) -> NewFilm {
        NewFilm {
            name: name.to_string(),
            description: String::new(),
            release_date: NaiveDate::from_ymd_opt(2000, 1, 1).unwrap(),
            duration: 90,
            mpa: Mpa::Pg,
            genres: Default::default(),
            director_ids: Default::default(),
        }
    }

    #[tokio::test]
    async fn test_repeated_like_overwrites_score() {
        let store = MemoryStore::new();
        let user = store.create_user(new_user("ann")).await.unwrap();
        let film = store.create_film(new_film("Heat")).await.unwrap();

        for score in [Some(4), Some(9)] {
            store
                .apply(vec![Mutation::PutLike(Like {
                    user_id: user.id,
                    film_id: film.id,
                    score,
                })])
                .await
                .unwrap();
        }

        let counts = store.get_like_counts().await.unwrap();
        assert_eq!(counts.get(&film.id), Some(&1));
        let tables = store.tables.read().await;
        assert_eq!(tables.likes[&(user.id, film.id)].score, Some(9));
    }

    #[tokio::test]
    async fn test_failed_batch_writes_nothing() {
        let store = MemoryStore::new();
        let user = store.create_user(new_user("ann")).await.unwrap();
        let event = NewFeedEvent::new(user.id, 999, EventType::Friend, Operation::Add);

        let result = store
            .commit(
                vec![
                    Mutation::Edge(EdgeChange::Put {
                        from: user.id,
                        to: 999,
                        status: FriendshipStatus::Requested,
                    }),
                ],
                event,
            )
            .await;

        assert!(matches!(result, Err(AppError::NotFound(_))));
        assert!(store.list_outgoing_edges(user.id).await.unwrap().is_empty());
        assert!(store.query_feed_events(user.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_feed_ids_and_timestamps_increase() {
        let store = MemoryStore::new();
        for entity_id in 1..=5 {
            store
                .append_feed_event(NewFeedEvent::new(1, entity_id, EventType::Like, Operation::Add))
                .await
                .unwrap();
        }
        store
            .append_feed_event(NewFeedEvent::new(2, 1, EventType::Like, Operation::Add))
            .await
            .unwrap();

        let events = store.query_feed_events(1).await.unwrap();
        assert_eq!(events.len(), 5);
        for pair in events.windows(2) {
            assert!(pair[0].event_id < pair[1].event_id);
            assert!(pair[0].timestamp <= pair[1].timestamp);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_feed_appends_get_distinct_increasing_ids() {
        let store = Arc::new(MemoryStore::new());

        let mut tasks = Vec::new();
        for task in 0..16 {
            let store = store.clone();
            tasks.push(tokio::spawn(async move {
                let mut ids = Vec::new();
                for entity_id in 0..10 {
                    let event = store
                        .append_feed_event(NewFeedEvent::new(
                            1,
                            task * 10 + entity_id,
                            EventType::Like,
                            Operation::Add,
                        ))
                        .await
                        .unwrap();
                    ids.push(event.event_id);
                }
                ids
            }));
        }

        let mut returned = BTreeSet::new();
        for task in tasks {
            returned.extend(task.await.unwrap());
        }
        assert_eq!(returned.len(), 160);

        let events = store.query_feed_events(1).await.unwrap();
        assert_eq!(events.len(), 160);
        for pair in events.windows(2) {
            assert!(pair[0].event_id < pair[1].event_id);
            assert!(pair[0].timestamp <= pair[1].timestamp);
        }
    }

    #[tokio::test]
    async fn test_request_friend_resolves_against_current_edges() {
        let store = MemoryStore::new();
        let ann = store.create_user(new_user("ann")).await.unwrap();
        let bob = store.create_user(new_user("bob")).await.unwrap();

        let request = |from: EntityId, to: EntityId| {
            (
                vec![Mutation::RequestFriend { from, to }],
                NewFeedEvent::new(from, to, EventType::Friend, Operation::Add),
            )
        };

        let (mutations, event) = request(ann.id, bob.id);
        store.commit(mutations, event).await.unwrap();
        assert_eq!(
            store.get_friend_edge(ann.id, bob.id).await.unwrap(),
            Some(FriendshipStatus::Requested)
        );
        assert_eq!(store.get_friend_edge(bob.id, ann.id).await.unwrap(), None);

        let (mutations, event) = request(bob.id, ann.id);
        store.commit(mutations, event).await.unwrap();
        assert_eq!(
            store.get_friend_edge(ann.id, bob.id).await.unwrap(),
            Some(FriendshipStatus::Approved)
        );
        assert_eq!(
            store.get_friend_edge(bob.id, ann.id).await.unwrap(),
            Some(FriendshipStatus::Approved)
        );

        let (mutations, event) = request(ann.id, 999);
        assert!(matches!(
            store.commit(mutations, event).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_deleting_director_detaches_films() {
        let store = MemoryStore::new();
        let director = store.create_director("Mann".to_string()).await.unwrap();
        let mut film = new_film("Heat");
        film.director_ids.insert(director.id);
        let film = store.create_film(film).await.unwrap();
        assert!(film.has_director(director.id));

        store.delete_director(director.id).await.unwrap();
        let film = store.get_film(film.id).await.unwrap();
        assert!(film.directors.is_empty());
        assert!(store.delete_director(director.id).await.is_err());
    }

    #[tokio::test]
    async fn test_review_usefulness_and_vote_polarity() {
        let store = MemoryStore::new();
        let author = store.create_user(new_user("ann")).await.unwrap();
        let voter = store.create_user(new_user("bob")).await.unwrap();
        let film = store.create_film(new_film("Heat")).await.unwrap();

        let (review, event) = store
            .insert_review(
                NewReview {
                    content: "Tense".to_string(),
                    user_id: author.id,
                    film_id: film.id,
                    is_positive: true,
                },
                NewFeedEvent::new(author.id, 0, EventType::Review, Operation::Add),
            )
            .await
            .unwrap();
        assert_eq!(event.entity_id, review.id);

        store
            .apply(vec![Mutation::PutReviewVote {
                review_id: review.id,
                user_id: voter.id,
                vote: ReviewVote::Useless,
            }])
            .await
            .unwrap();
        assert_eq!(store.get_review(review.id).await.unwrap().useful, -1);

        // Removing a like does not touch an existing dislike
        store
            .apply(vec![Mutation::DeleteReviewVote {
                review_id: review.id,
                user_id: voter.id,
                vote: ReviewVote::Useful,
            }])
            .await
            .unwrap();
        assert_eq!(store.get_review(review.id).await.unwrap().useful, -1);
    }
}
