use serde::{Deserialize, Serialize};

use super::EntityId;

pub const MIN_SCORE: i32 = 1;
pub const MAX_SCORE: i32 = 10;

/// A user's like of a film, optionally carrying a score.
/// At most one per (user_id, film_id); a repeated like overwrites.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Like {
    pub user_id: EntityId,
    pub film_id: EntityId,
    pub score: Option<i32>,
}

impl Like {
    pub fn score_in_range(score: i32) -> bool {
        (MIN_SCORE..=MAX_SCORE).contains(&score)
    }
}
