use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;

use crate::{
    error::AppResult,
    models::{EntityId, FeedEvent, Film, FriendshipState, NewUser, User},
};

use super::AppState;

#[derive(Debug, Serialize)]
pub struct FriendshipResponse {
    pub user_id: EntityId,
    pub friend_id: EntityId,
    pub confirmed: bool,
}

pub async fn create_user(
    State(state): State<AppState>,
    Json(user): Json<NewUser>,
) -> AppResult<(StatusCode, Json<User>)> {
    let user = state.catalog.create_user(user).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<EntityId>,
) -> AppResult<Json<User>> {
    Ok(Json(state.catalog.get_user(id).await?))
}

pub async fn add_friend(
    State(state): State<AppState>,
    Path((id, friend_id)): Path<(EntityId, EntityId)>,
) -> AppResult<Json<FriendshipResponse>> {
    let reached = state.friendship.request_friend(id, friend_id).await?;
    Ok(Json(FriendshipResponse {
        user_id: id,
        friend_id,
        confirmed: reached == FriendshipState::Mutual,
    }))
}

pub async fn remove_friend(
    State(state): State<AppState>,
    Path((id, friend_id)): Path<(EntityId, EntityId)>,
) -> AppResult<StatusCode> {
    state.friendship.remove_friend(id, friend_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_friends(
    State(state): State<AppState>,
    Path(id): Path<EntityId>,
) -> AppResult<Json<Vec<User>>> {
    let ids = state.friendship.list_friends(id).await?;
    Ok(Json(state.catalog.users_by_ids(&ids).await?))
}

pub async fn common_friends(
    State(state): State<AppState>,
    Path((id, other_id)): Path<(EntityId, EntityId)>,
) -> AppResult<Json<Vec<User>>> {
    let ids = state.friendship.list_common_friends(id, other_id).await?;
    Ok(Json(state.catalog.users_by_ids(&ids).await?))
}

pub async fn recommendations(
    State(state): State<AppState>,
    Path(id): Path<EntityId>,
) -> AppResult<Json<Vec<Film>>> {
    Ok(Json(state.recommendations.recommend(id).await?))
}

pub async fn feed(
    State(state): State<AppState>,
    Path(id): Path<EntityId>,
) -> AppResult<Json<Vec<FeedEvent>>> {
    Ok(Json(state.feed.find_feed(id).await?))
}
