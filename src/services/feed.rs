use std::sync::Arc;

use crate::{
    db::{EntityStore, Mutation},
    error::AppResult,
    models::{EntityId, EventType, FeedEvent, NewFeedEvent, Operation},
};

/// Appends and reads the per-user activity feed.
///
/// Every social mutation goes through [`FeedService::record_with`], which
/// hands the state change and its event to the store as one atomic batch, so
/// an event exists if and only if its change was applied.
#[derive(Clone)]
pub struct FeedService {
    store: Arc<dyn EntityStore>,
}

impl FeedService {
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self { store }
    }

    /// Appends a standalone event
    pub async fn record(
        &self,
        user_id: EntityId,
        entity_id: EntityId,
        event_type: EventType,
        operation: Operation,
    ) -> AppResult<FeedEvent> {
        let event = self
            .store
            .append_feed_event(NewFeedEvent::new(user_id, entity_id, event_type, operation))
            .await?;
        log_recorded(&event);
        Ok(event)
    }

    /// Applies `mutations` and appends `event` atomically
    pub async fn record_with(
        &self,
        mutations: Vec<Mutation>,
        event: NewFeedEvent,
    ) -> AppResult<FeedEvent> {
        let event = self.store.commit(mutations, event).await?;
        log_recorded(&event);
        Ok(event)
    }

    /// Events caused by `user_id`, oldest first
    pub async fn find_feed(&self, user_id: EntityId) -> AppResult<Vec<FeedEvent>> {
        self.store.get_user(user_id).await?;
        let events = self.store.query_feed_events(user_id).await?;
        tracing::debug!(user_id, events = events.len(), "Feed loaded");
        Ok(events)
    }
}

fn log_recorded(event: &FeedEvent) {
    tracing::info!(
        event_id = event.event_id,
        user_id = event.user_id,
        entity_id = event.entity_id,
        event_type = %event.event_type,
        operation = %event.operation,
        "Feed event recorded"
    );
}
