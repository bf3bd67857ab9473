use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;

use crate::{
    error::AppResult,
    models::{EntityId, NewReview, Review, ReviewVote},
};

use super::AppState;

#[derive(Debug, Deserialize)]
pub struct UpdateReviewRequest {
    pub content: String,
    pub is_positive: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListParams {
    pub film_id: Option<EntityId>,
    pub count: Option<i64>,
}

pub async fn create_review(
    State(state): State<AppState>,
    Json(review): Json<NewReview>,
) -> AppResult<(StatusCode, Json<Review>)> {
    let review = state.reviews.create(review).await?;
    Ok((StatusCode::CREATED, Json(review)))
}

pub async fn get_review(
    State(state): State<AppState>,
    Path(id): Path<EntityId>,
) -> AppResult<Json<Review>> {
    Ok(Json(state.reviews.get(id).await?))
}

pub async fn update_review(
    State(state): State<AppState>,
    Path(id): Path<EntityId>,
    Json(request): Json<UpdateReviewRequest>,
) -> AppResult<Json<Review>> {
    Ok(Json(
        state
            .reviews
            .update(id, request.content, request.is_positive)
            .await?,
    ))
}

pub async fn delete_review(
    State(state): State<AppState>,
    Path(id): Path<EntityId>,
) -> AppResult<StatusCode> {
    state.reviews.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_reviews(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> AppResult<Json<Vec<Review>>> {
    Ok(Json(state.reviews.list(params.film_id, params.count).await?))
}

async fn cast(state: AppState, id: EntityId, user_id: EntityId, vote: ReviewVote) -> AppResult<StatusCode> {
    state.reviews.vote(id, user_id, vote).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn withdraw(state: AppState, id: EntityId, user_id: EntityId, vote: ReviewVote) -> AppResult<StatusCode> {
    state.reviews.remove_vote(id, user_id, vote).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn like(
    State(state): State<AppState>,
    Path((id, user_id)): Path<(EntityId, EntityId)>,
) -> AppResult<StatusCode> {
    cast(state, id, user_id, ReviewVote::Useful).await
}

pub async fn remove_like(
    State(state): State<AppState>,
    Path((id, user_id)): Path<(EntityId, EntityId)>,
) -> AppResult<StatusCode> {
    withdraw(state, id, user_id, ReviewVote::Useful).await
}

pub async fn dislike(
    State(state): State<AppState>,
    Path((id, user_id)): Path<(EntityId, EntityId)>,
) -> AppResult<StatusCode> {
    cast(state, id, user_id, ReviewVote::Useless).await
}

pub async fn remove_dislike(
    State(state): State<AppState>,
    Path((id, user_id)): Path<(EntityId, EntityId)>,
) -> AppResult<StatusCode> {
    withdraw(state, id, user_id, ReviewVote::Useless).await
}
