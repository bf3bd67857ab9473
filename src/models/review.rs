use serde::{Deserialize, Serialize};

use super::EntityId;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Review {
    pub id: EntityId,
    pub content: String,
    pub user_id: EntityId,
    pub film_id: EntityId,
    pub is_positive: bool,
    /// Likes minus dislikes cast by other users
    pub useful: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewReview {
    pub content: String,
    pub user_id: EntityId,
    pub film_id: EntityId,
    pub is_positive: bool,
}

impl NewReview {
    pub fn into_review(self, id: EntityId) -> Review {
        Review {
            id,
            content: self.content,
            user_id: self.user_id,
            film_id: self.film_id,
            is_positive: self.is_positive,
            useful: 0,
        }
    }
}

/// Polarity of a vote on a review
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ReviewVote {
    Useful,
    Useless,
}

impl ReviewVote {
    pub fn weight(self) -> i64 {
        match self {
            ReviewVote::Useful => 1,
            ReviewVote::Useless => -1,
        }
    }

    pub fn is_useful(self) -> bool {
        self == ReviewVote::Useful
    }
}
