use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::Response,
    routing::get,
};

use super::created;
use crate::{
    AppState,
    auth::AdminUser,
    crud::Crud,
    entities::genre,
    error::AppResult,
    models::{GenreCreation, GenreDto},
};

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/genres", get(list).post(create))
        .route("/api/genres/{id}", get(show).put(update).delete(remove))
}

fn genres(state: &AppState) -> Crud<'_, genre::ActiveModel> {
    Crud::new(&state.db)
}

async fn list(State(state): State<Arc<AppState>>) -> AppResult<Json<Vec<GenreDto>>> {
    genres(&state).list().await.map(Json)
}

async fn show(State(state): State<Arc<AppState>>, Path(id): Path<i32>) -> AppResult<Json<GenreDto>> {
    genres(&state).get(id).await.map(Json)
}

async fn create(
    State(state): State<Arc<AppState>>,
    Json(dto): Json<GenreCreation>,
) -> AppResult<Response> {
    let (id, genre): (i32, GenreDto) = genres(&state).create(dto).await?;
    Ok(created(format!("/api/genres/{id}"), Json(genre)))
}

async fn update(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
    Json(dto): Json<GenreCreation>,
) -> AppResult<StatusCode> {
    genres(&state).update(id, dto).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn remove(
    _admin: AdminUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> AppResult<StatusCode> {
    genres(&state).delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
