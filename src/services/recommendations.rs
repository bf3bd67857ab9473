use std::collections::HashMap;
use std::sync::Arc;

use crate::{
    db::EntityStore,
    error::AppResult,
    models::{EntityId, Film},
};

/// Picks the neighbor with the largest overlap, smallest id on ties
pub fn best_neighbor(overlaps: &HashMap<EntityId, usize>) -> Option<(EntityId, usize)> {
    overlaps
        .iter()
        .filter(|(_, overlap)| **overlap > 0)
        .map(|(id, overlap)| (*id, *overlap))
        .max_by(|(id_a, overlap_a), (id_b, overlap_b)| {
            overlap_a.cmp(overlap_b).then(id_b.cmp(id_a))
        })
}

/// Generates personalized film suggestions from the like graph
///
/// Finds the single user whose likes overlap most with the requesting user's
/// and suggests the films that user liked which the requester has not.
#[derive(Clone)]
pub struct RecommendationService {
    store: Arc<dyn EntityStore>,
}

impl RecommendationService {
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self { store }
    }

    /// Films ordered by id; empty when nobody shares a liked film
    pub async fn recommend(&self, user_id: EntityId) -> AppResult<Vec<Film>> {
        self.store.get_user(user_id).await?;

        let liked = self.store.get_liked_film_ids(user_id).await?;

        let mut overlaps: HashMap<EntityId, usize> = HashMap::new();
        for film_id in &liked {
            for other in self.store.list_users_who_liked(*film_id).await? {
                if other != user_id {
                    *overlaps.entry(other).or_insert(0) += 1;
                }
            }
        }

        let Some((neighbor, overlap)) = best_neighbor(&overlaps) else {
            tracing::debug!(user_id, "No neighbors share a liked film");
            return Ok(Vec::new());
        };

        let neighbor_likes = self.store.get_liked_film_ids(neighbor).await?;

        let mut films = Vec::new();
        for film_id in neighbor_likes.difference(&liked) {
            films.push(self.store.get_film(*film_id).await?);
        }

        tracing::info!(
            user_id,
            neighbor,
            overlap,
            neighbors = overlaps.len(),
            recommended = films.len(),
            "Recommendations computed"
        );
        Ok(films)
    }
}
