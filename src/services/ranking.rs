//! Popularity ranking of films.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use serde::Deserialize;

use crate::{
    cached,
    db::{Cache, EntityStore},
    error::{AppError, AppResult},
    models::{EntityId, Film, Genre},
    services::reference::ReferenceCache,
};

/// Ordering applied to a ranking
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RankSort {
    /// Most liked first
    Likes,
    /// Oldest release first
    Year,
}

impl FromStr for RankSort {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "likes" => Ok(RankSort::Likes),
            "year" => Ok(RankSort::Year),
            other => Err(AppError::Validation(format!(
                "unknown sort parameter '{}', expected 'likes' or 'year'",
                other
            ))),
        }
    }
}

/// Raw ranking request as received from callers
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankingQuery {
    pub count: i64,
    pub genre_id: Option<i32>,
    pub year: Option<i32>,
    pub director_id: Option<EntityId>,
    pub sort_by: Option<String>,
}

/// A validated ranking request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RankingPlan {
    pub count: usize,
    pub genre: Option<Genre>,
    pub year: Option<i32>,
    pub director_id: Option<EntityId>,
    pub sort: RankSort,
}

impl RankingPlan {
    fn matches(&self, film: &Film) -> bool {
        self.genre.map_or(true, |genre| film.genres.contains(&genre))
            && self.year.map_or(true, |year| film.release_year() == year)
            && self
                .director_id
                .map_or(true, |director| film.has_director(director))
    }

    fn cache_fragment(&self) -> String {
        format!(
            "count={};genre={:?};year={:?};director={:?};sort={:?}",
            self.count,
            self.genre.map(Genre::id),
            self.year,
            self.director_id,
            self.sort
        )
    }
}

/// Orders films by like count descending, ties by ascending id
pub fn sort_by_likes(films: &mut [Film], like_counts: &HashMap<EntityId, i64>) {
    films.sort_by(|a, b| {
        let likes_a = like_counts.get(&a.id).copied().unwrap_or(0);
        let likes_b = like_counts.get(&b.id).copied().unwrap_or(0);
        likes_b.cmp(&likes_a).then(a.id.cmp(&b.id))
    });
}

/// Filters and orders `films` according to `plan`, keeping at most
/// `plan.count`. Films without likes count as zero.
pub fn rank(films: Vec<Film>, like_counts: &HashMap<EntityId, i64>, plan: &RankingPlan) -> Vec<Film> {
    let mut ranked: Vec<Film> = films.into_iter().filter(|film| plan.matches(film)).collect();

    match plan.sort {
        RankSort::Likes => sort_by_likes(&mut ranked, like_counts),
        RankSort::Year => ranked.sort_by(|a, b| {
            a.release_year()
                .cmp(&b.release_year())
                .then(a.id.cmp(&b.id))
        }),
    }

    ranked.truncate(plan.count);
    ranked
}

/// Computes popularity-ordered film lists. Read-only.
#[derive(Clone)]
pub struct RankingService {
    store: Arc<dyn EntityStore>,
    reference: ReferenceCache,
    cache: Option<Cache>,
    cache_ttl: u64,
}

impl RankingService {
    pub fn new(
        store: Arc<dyn EntityStore>,
        reference: ReferenceCache,
        cache: Option<Cache>,
        cache_ttl: u64,
    ) -> Self {
        Self {
            store,
            reference,
            cache,
            cache_ttl,
        }
    }

    /// Validates a request into a plan.
    ///
    /// A director filter requires an explicit sort key; without one the sort
    /// key is still checked but ordering stays by likes.
    pub async fn plan(&self, query: &RankingQuery) -> AppResult<RankingPlan> {
        if query.count <= 0 {
            return Err(AppError::Validation(format!(
                "count must be positive, got {}",
                query.count
            )));
        }
        let count = usize::try_from(query.count).unwrap_or(usize::MAX);

        let genre = query
            .genre_id
            .map(|id| {
                Genre::from_id(id).ok_or_else(|| AppError::NotFound(format!("genre {} not found", id)))
            })
            .transpose()?;

        let requested_sort = query
            .sort_by
            .as_deref()
            .map(RankSort::from_str)
            .transpose()?;

        let sort = match query.director_id {
            Some(director_id) => {
                self.reference.require_director(director_id).await?;
                requested_sort.ok_or_else(|| {
                    AppError::Validation("sort parameter required".to_string())
                })?
            }
            None => RankSort::Likes,
        };

        Ok(RankingPlan {
            count,
            genre,
            year: query.year,
            director_id: query.director_id,
            sort,
        })
    }

    /// Up to `count` films matching the filters, most liked first
    pub async fn rank_films(&self, query: &RankingQuery) -> AppResult<Vec<Film>> {
        let plan = self.plan(query).await?;

        match &self.cache {
            Some(cache) => {
                let key = cache.ranking_key(plan.cache_fragment());
                cached!(cache, key, self.cache_ttl, self.compute(&plan))
            }
            None => self.compute(&plan).await,
        }
    }

    async fn compute(&self, plan: &RankingPlan) -> AppResult<Vec<Film>> {
        let films = self.store.list_films().await?;
        let like_counts = self.store.get_like_counts().await?;
        let total = films.len();

        let ranked = rank(films, &like_counts, plan);
        tracing::debug!(
            candidates = total,
            returned = ranked.len(),
            sort = ?plan.sort,
            "Ranking computed"
        );
        Ok(ranked)
    }

    /// Films liked by both users, most liked first
    pub async fn common_films(
        &self,
        user_id: EntityId,
        friend_id: EntityId,
    ) -> AppResult<Vec<Film>> {
        self.store.get_user(user_id).await?;
        self.store.get_user(friend_id).await?;

        let mine = self.store.get_liked_film_ids(user_id).await?;
        let theirs = self.store.get_liked_film_ids(friend_id).await?;

        let mut films = Vec::new();
        for film_id in mine.intersection(&theirs) {
            films.push(self.store.get_film(*film_id).await?);
        }

        let like_counts = self.store.get_like_counts().await?;
        sort_by_likes(&mut films, &like_counts);
        Ok(films)
    }

    /// Drops cached rankings after a write to likes or films
    pub fn invalidate(&self) {
        if let Some(cache) = &self.cache {
            cache.invalidate_rankings();
        }
    }
}
