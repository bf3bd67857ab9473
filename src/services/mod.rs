pub mod catalog;
pub mod feed;
pub mod friendship;
pub mod likes;
pub mod ranking;
pub mod recommendations;
pub mod reference;
pub mod reviews;

pub use catalog::CatalogService;
pub use feed::FeedService;
pub use friendship::FriendshipService;
pub use likes::LikeService;
pub use ranking::{RankingQuery, RankingService};
pub use recommendations::RecommendationService;
pub use reference::ReferenceCache;
pub use reviews::ReviewService;
