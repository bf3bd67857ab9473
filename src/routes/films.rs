use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;

use crate::{
    error::AppResult,
    models::{EntityId, FeedEvent, Film, NewFilm},
    services::RankingQuery,
};

use super::AppState;

const DEFAULT_COUNT: i64 = 10;

fn default_count() -> i64 {
    DEFAULT_COUNT
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PopularParams {
    #[serde(default = "default_count")]
    pub count: i64,
    pub genre_id: Option<i32>,
    pub year: Option<i32>,
    pub director_id: Option<EntityId>,
    pub sort_by: Option<String>,
}

impl From<PopularParams> for RankingQuery {
    fn from(params: PopularParams) -> Self {
        Self {
            count: params.count,
            genre_id: params.genre_id,
            year: params.year,
            director_id: params.director_id,
            sort_by: params.sort_by,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectorParams {
    #[serde(default = "default_count")]
    pub count: i64,
    pub sort_by: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommonParams {
    pub user_id: EntityId,
    pub friend_id: EntityId,
}

#[derive(Debug, Deserialize)]
pub struct LikeParams {
    pub score: Option<i32>,
}

pub async fn create_film(
    State(state): State<AppState>,
    Json(film): Json<NewFilm>,
) -> AppResult<(StatusCode, Json<Film>)> {
    let film = state.catalog.create_film(film).await?;
    Ok((StatusCode::CREATED, Json(film)))
}

pub async fn get_film(
    State(state): State<AppState>,
    Path(id): Path<EntityId>,
) -> AppResult<Json<Film>> {
    Ok(Json(state.catalog.get_film(id).await?))
}

pub async fn popular(
    State(state): State<AppState>,
    Query(params): Query<PopularParams>,
) -> AppResult<Json<Vec<Film>>> {
    let query = RankingQuery::from(params);
    Ok(Json(state.ranking.rank_films(&query).await?))
}

pub async fn by_director(
    State(state): State<AppState>,
    Path(director_id): Path<EntityId>,
    Query(params): Query<DirectorParams>,
) -> AppResult<Json<Vec<Film>>> {
    let query = RankingQuery {
        count: params.count,
        director_id: Some(director_id),
        sort_by: params.sort_by,
        ..Default::default()
    };
    Ok(Json(state.ranking.rank_films(&query).await?))
}

pub async fn common(
    State(state): State<AppState>,
    Query(params): Query<CommonParams>,
) -> AppResult<Json<Vec<Film>>> {
    Ok(Json(
        state
            .ranking
            .common_films(params.user_id, params.friend_id)
            .await?,
    ))
}

pub async fn add_like(
    State(state): State<AppState>,
    Path((id, user_id)): Path<(EntityId, EntityId)>,
    Query(params): Query<LikeParams>,
) -> AppResult<Json<FeedEvent>> {
    Ok(Json(state.likes.add_like(id, user_id, params.score).await?))
}

pub async fn remove_like(
    State(state): State<AppState>,
    Path((id, user_id)): Path<(EntityId, EntityId)>,
) -> AppResult<StatusCode> {
    state.likes.remove_like(id, user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
