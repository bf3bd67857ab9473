use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;

use crate::{
    error::AppResult,
    models::{Director, EntityId},
};

use super::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateDirectorRequest {
    pub name: String,
}

pub async fn list_directors(State(state): State<AppState>) -> AppResult<Json<Vec<Director>>> {
    Ok(Json(state.catalog.list_directors().await?))
}

pub async fn create_director(
    State(state): State<AppState>,
    Json(request): Json<CreateDirectorRequest>,
) -> AppResult<(StatusCode, Json<Director>)> {
    let director = state.catalog.create_director(request.name).await?;
    Ok((StatusCode::CREATED, Json(director)))
}

pub async fn delete_director(
    State(state): State<AppState>,
    Path(id): Path<EntityId>,
) -> AppResult<StatusCode> {
    state.catalog.delete_director(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
