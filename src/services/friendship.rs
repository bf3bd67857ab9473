use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeSet;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use tokio::sync::{Mutex, MutexGuard};

use crate::{
    db::{EntityStore, Mutation},
    error::{AppError, AppResult},
    models::{
        friendship::removal, EntityId, EventType, FriendshipState, NewFeedEvent, Operation,
    },
    services::feed::FeedService,
};

const LOCK_STRIPES: usize = 64;

/// Striped locks keyed by an unordered user pair.
///
/// The store decides each request atomically; holding the stripe across the
/// commit and the read-back makes the reported state belong to this request
/// rather than to a crossing one from the same process.
struct PairLocks {
    stripes: Vec<Mutex<()>>,
}

impl PairLocks {
    fn new() -> Self {
        Self {
            stripes: (0..LOCK_STRIPES).map(|_| Mutex::new(())).collect(),
        }
    }

    async fn lock(&self, a: EntityId, b: EntityId) -> MutexGuard<'_, ()> {
        let mut hasher = DefaultHasher::new();
        (a.min(b), a.max(b)).hash(&mut hasher);
        let stripe = (hasher.finish() % self.stripes.len() as u64) as usize;
        self.stripes[stripe].lock().await
    }
}

/// Owns the friend-request / approval state machine
#[derive(Clone)]
pub struct FriendshipService {
    store: Arc<dyn EntityStore>,
    feed: FeedService,
    locks: Arc<PairLocks>,
}

impl FriendshipService {
    pub fn new(store: Arc<dyn EntityStore>, feed: FeedService) -> Self {
        Self {
            store,
            feed,
            locks: Arc::new(PairLocks::new()),
        }
    }

    async fn require_users(&self, user_id: EntityId, other_id: EntityId) -> AppResult<()> {
        self.store.get_user(user_id).await?;
        self.store.get_user(other_id).await?;
        Ok(())
    }

    async fn state(&self, user_id: EntityId, target_id: EntityId) -> AppResult<FriendshipState> {
        let forward = self.store.get_friend_edge(user_id, target_id).await?;
        let backward = self.store.get_friend_edge(target_id, user_id).await?;
        Ok(FriendshipState::from_edges(forward, backward))
    }

    /// `user_id` asks `target_id` to be friends.
    ///
    /// Confirms the friendship when `target_id` already asked, otherwise
    /// leaves a pending request. Returns the state reached.
    pub async fn request_friend(
        &self,
        user_id: EntityId,
        target_id: EntityId,
    ) -> AppResult<FriendshipState> {
        self.require_users(user_id, target_id).await?;
        if user_id == target_id {
            return Err(AppError::Validation(
                "a user cannot befriend themselves".to_string(),
            ));
        }

        let _guard = self.locks.lock(user_id, target_id).await;

        self.feed
            .record_with(
                vec![Mutation::RequestFriend {
                    from: user_id,
                    to: target_id,
                }],
                NewFeedEvent::new(user_id, target_id, EventType::Friend, Operation::Add),
            )
            .await?;

        let reached = self.state(user_id, target_id).await?;
        tracing::info!(user_id, target_id, state = ?reached, "Friend request applied");
        Ok(reached)
    }

    /// Deletes both directed edges. Removing a friendship that does not exist
    /// is not an error.
    pub async fn remove_friend(&self, user_id: EntityId, target_id: EntityId) -> AppResult<()> {
        self.require_users(user_id, target_id).await?;

        let _guard = self.locks.lock(user_id, target_id).await;

        let mutations = removal(user_id, target_id)
            .into_iter()
            .map(Mutation::Edge)
            .collect();

        self.feed
            .record_with(
                mutations,
                NewFeedEvent::new(user_id, target_id, EventType::Friend, Operation::Remove),
            )
            .await?;

        tracing::info!(user_id, target_id, "Friendship removed");
        Ok(())
    }

    /// Everyone `user_id` has an outgoing edge to, pending requests included
    pub async fn list_friends(&self, user_id: EntityId) -> AppResult<BTreeSet<EntityId>> {
        self.store.get_user(user_id).await?;
        self.store.list_outgoing_edges(user_id).await
    }

    pub async fn list_common_friends(
        &self,
        user_id: EntityId,
        other_id: EntityId,
    ) -> AppResult<BTreeSet<EntityId>> {
        self.require_users(user_id, other_id).await?;

        let mine = self.store.list_outgoing_edges(user_id).await?;
        let theirs = self.store.list_outgoing_edges(other_id).await?;
        Ok(mine.intersection(&theirs).copied().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{MemoryStore, MockEntityStore};
    use crate::models::{FeedEvent, FriendshipStatus, NewUser, User};
    use tokio_test::{assert_err, assert_ok};

    async fn setup(users: usize) -> (Arc<MemoryStore>, FriendshipService, Vec<User>) {
        let store = Arc::new(MemoryStore::new());
        let mut created = Vec::new();
        for i in 0..users {
            let user = store
                .create_user(NewUser {
                    email: format!("user{}@example.com", i),
                    login: format!("user{}", i),
                    name: None,
                    birthday: None,
                })
                .await
                .unwrap();
            created.push(user);
        }
        let service = FriendshipService::new(store.clone(), FeedService::new(store.clone()));
        (store, service, created)
    }

    fn friend_adds(events: &[FeedEvent]) -> usize {
        events
            .iter()
            .filter(|e| e.event_type == EventType::Friend && e.operation == Operation::Add)
            .count()
    }

    #[tokio::test]
    async fn test_one_sided_request() {
        let (store, service, users) = setup(2).await;
        let (a, b) = (users[0].id, users[1].id);

        let state = assert_ok!(service.request_friend(a, b).await);
        assert_eq!(state, FriendshipState::Outgoing);

        assert_eq!(
            store.get_friend_edge(a, b).await.unwrap(),
            Some(FriendshipStatus::Requested)
        );
        assert_eq!(service.list_friends(a).await.unwrap(), BTreeSet::from([b]));
        assert!(service.list_friends(b).await.unwrap().is_empty());

        let feed = store.query_feed_events(a).await.unwrap();
        assert_eq!(feed.len(), 1);
        assert_eq!(feed[0].entity_id, b);
        assert_eq!(feed[0].event_type, EventType::Friend);
        assert_eq!(feed[0].operation, Operation::Add);
    }

    #[tokio::test]
    async fn test_reciprocal_request_confirms_both_edges() {
        let (store, service, users) = setup(2).await;
        let (a, b) = (users[0].id, users[1].id);

        service.request_friend(a, b).await.unwrap();
        let state = service.request_friend(b, a).await.unwrap();
        assert_eq!(state, FriendshipState::Mutual);

        assert_eq!(
            store.get_friend_edge(a, b).await.unwrap(),
            Some(FriendshipStatus::Approved)
        );
        assert_eq!(
            store.get_friend_edge(b, a).await.unwrap(),
            Some(FriendshipStatus::Approved)
        );
        assert!(service.list_friends(a).await.unwrap().contains(&b));
        assert!(service.list_friends(b).await.unwrap().contains(&a));

        assert_eq!(friend_adds(&store.query_feed_events(a).await.unwrap()), 1);
        assert_eq!(friend_adds(&store.query_feed_events(b).await.unwrap()), 1);
    }

    #[tokio::test]
    async fn test_remove_friend_is_idempotent() {
        let (store, service, users) = setup(2).await;
        let (a, b) = (users[0].id, users[1].id);

        service.request_friend(a, b).await.unwrap();
        service.request_friend(b, a).await.unwrap();

        assert_ok!(service.remove_friend(a, b).await);
        assert_ok!(service.remove_friend(a, b).await);

        assert_eq!(store.get_friend_edge(a, b).await.unwrap(), None);
        assert_eq!(store.get_friend_edge(b, a).await.unwrap(), None);
        assert!(service.list_friends(a).await.unwrap().is_empty());
        assert!(service.list_friends(b).await.unwrap().is_empty());

        let removals = store
            .query_feed_events(a)
            .await
            .unwrap()
            .into_iter()
            .filter(|e| e.operation == Operation::Remove)
            .count();
        assert_eq!(removals, 2);
    }

    #[tokio::test]
    async fn test_self_request_is_rejected() {
        let (store, service, users) = setup(1).await;
        let a = users[0].id;

        let err = assert_err!(service.request_friend(a, a).await);
        assert!(matches!(err, AppError::Validation(_)));
        assert!(store.query_feed_events(a).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_users_are_not_found() {
        let (store, service, users) = setup(1).await;
        let a = users[0].id;

        let err = assert_err!(service.request_friend(a, 999).await);
        assert!(matches!(err, AppError::NotFound(_)));
        let err = assert_err!(service.remove_friend(999, a).await);
        assert!(matches!(err, AppError::NotFound(_)));
        let err = assert_err!(service.list_friends(999).await);
        assert!(matches!(err, AppError::NotFound(_)));

        assert!(store.list_outgoing_edges(a).await.unwrap().is_empty());
        assert!(store.query_feed_events(a).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_common_friends() {
        let (_store, service, users) = setup(4).await;
        let (a, b, c, d) = (users[0].id, users[1].id, users[2].id, users[3].id);

        service.request_friend(a, c).await.unwrap();
        service.request_friend(a, d).await.unwrap();
        service.request_friend(b, c).await.unwrap();

        assert_eq!(
            service.list_common_friends(a, b).await.unwrap(),
            BTreeSet::from([c])
        );
        assert!(service.list_common_friends(c, d).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_crossing_requests_end_mutual() {
        let (store, service, users) = setup(2).await;
        let (a, b) = (users[0].id, users[1].id);

        let first = service.clone();
        let second = service.clone();
        let (r1, r2) = tokio::join!(
            tokio::spawn(async move { first.request_friend(a, b).await }),
            tokio::spawn(async move { second.request_friend(b, a).await }),
        );
        r1.unwrap().unwrap();
        r2.unwrap().unwrap();

        // Whichever ran second saw the other's edge and confirmed it
        assert_eq!(
            store.get_friend_edge(a, b).await.unwrap(),
            Some(FriendshipStatus::Approved)
        );
        assert_eq!(
            store.get_friend_edge(b, a).await.unwrap(),
            Some(FriendshipStatus::Approved)
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_crossing_requests_from_separate_instances_end_mutual() {
        let (store, _service, users) = setup(40).await;
        // Independent pair locks, as with two processes sharing one store
        let left = FriendshipService::new(store.clone(), FeedService::new(store.clone()));
        let right = FriendshipService::new(store.clone(), FeedService::new(store.clone()));

        let mut tasks = Vec::new();
        for pair in users.chunks(2) {
            let (a, b) = (pair[0].id, pair[1].id);
            let (left, right) = (left.clone(), right.clone());
            tasks.push(tokio::spawn(async move {
                let (r1, r2) = tokio::join!(left.request_friend(a, b), right.request_friend(b, a));
                r1.unwrap();
                r2.unwrap();
                (a, b)
            }));
        }

        for task in tasks {
            let (a, b) = task.await.unwrap();
            assert_eq!(
                store.get_friend_edge(a, b).await.unwrap(),
                Some(FriendshipStatus::Approved)
            );
            assert_eq!(
                store.get_friend_edge(b, a).await.unwrap(),
                Some(FriendshipStatus::Approved)
            );
        }
    }

    #[tokio::test]
    async fn test_failed_commit_reports_storage_error() {
        let mut store = MockEntityStore::new();
        store.expect_get_user().returning(|id| {
            Ok(User {
                id,
                email: format!("{}@example.com", id),
                login: format!("user{}", id),
                name: format!("user{}", id),
                birthday: None,
            })
        });
        store.expect_get_friend_edge().returning(|_, _| Ok(None));
        store
            .expect_commit()
            .times(1)
            .returning(|_, _| Err(AppError::StorageUnavailable("pool timed out".to_string())));

        let store: Arc<dyn EntityStore> = Arc::new(store);
        let service = FriendshipService::new(store.clone(), FeedService::new(store));

        let err = assert_err!(service.request_friend(1, 2).await);
        assert!(matches!(err, AppError::StorageUnavailable(_)));
    }
}
