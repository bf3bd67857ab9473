pub mod feed;
pub mod film;
pub mod friendship;
pub mod like;
pub mod review;
pub mod user;

pub use feed::{EventType, FeedEvent, NewFeedEvent, Operation};
pub use film::{Director, Film, Genre, Mpa, NewFilm};
pub use friendship::{EdgeChange, FriendshipState, FriendshipStatus};
pub use like::{Like, MAX_SCORE, MIN_SCORE};
pub use review::{NewReview, Review, ReviewVote};
pub use user::{NewUser, User};

/// Store-assigned numeric identity shared by every entity
pub type EntityId = i64;
