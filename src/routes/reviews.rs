use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    middleware,
    routing::{get, put},
};
use garde::Validate;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, IntoActiveModel, LoaderTrait,
    PaginatorTrait, QueryFilter, QueryOrder, Set, SqlErr,
};

use crate::{
    AppState,
    auth::AuthUser,
    entities::{review, user},
    error::{AppError, AppResult},
    guard::{self, Guards, MovieExists},
    mapping::ApplyTo,
    models::{ReviewCreation, ReviewDto},
    pagination::{Page, Pagination, paginate},
};

pub fn router(state: &Arc<AppState>) -> Router<Arc<AppState>> {
    let guards = Guards::new(state.db.clone(), vec![Arc::new(MovieExists)]);

    Router::new()
        .route("/api/movies/{movie_id}/reviews", get(list).post(create))
        .route("/api/movies/{movie_id}/reviews/{review_id}", put(update).delete(remove))
        .route_layer(middleware::from_fn_with_state(guards, guard::enforce))
}

async fn list(
    State(state): State<Arc<AppState>>,
    Path(movie_id): Path<i32>,
    Query(pagination): Query<Pagination>,
) -> AppResult<Page<ReviewDto>> {
    let select = review::Entity::find()
        .filter(review::Column::MovieId.eq(movie_id))
        .order_by_desc(review::Column::Id);
    let (reviews, total) = paginate(&state.db, select, pagination).await?;
    let authors = reviews.load_one(user::Entity, &state.db).await?;

    Ok(Page { items: reviews.into_iter().zip(authors).map(ReviewDto::from).collect(), total })
}

async fn create(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(movie_id): Path<i32>,
    Json(dto): Json<ReviewCreation>,
) -> AppResult<StatusCode> {
    dto.validate()?;

    let already_reviewed = review::Entity::find()
        .filter(review::Column::MovieId.eq(movie_id))
        .filter(review::Column::UserId.eq(user.id()))
        .count(&state.db)
        .await?
        > 0;
    if already_reviewed {
        return Err(already_reviewed_error());
    }

    let mut active = review::ActiveModel {
        movie_id: Set(movie_id),
        user_id: Set(user.id().to_string()),
        ..Default::default()
    };
    dto.apply_to(&mut active);
    let model = insert_review(&state.db, active).await?;

    tracing::info!(review_id = model.id, movie_id, "review created");
    Ok(StatusCode::NO_CONTENT)
}

fn already_reviewed_error() -> AppError {
    AppError::bad_request("this user has already reviewed the movie")
}

/// Insert that reports a lost race on the `(movie_id, user_id)` index like the upfront check.
async fn insert_review(db: &DatabaseConnection, active: review::ActiveModel) -> AppResult<review::Model> {
    active.insert(db).await.map_err(|err| match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(_)) => already_reviewed_error(),
        _ => err.into(),
    })
}

async fn find_in_movie(state: &AppState, movie_id: i32, review_id: i32) -> AppResult<review::Model> {
    review::Entity::find_by_id(review_id)
        .filter(review::Column::MovieId.eq(movie_id))
        .one(&state.db)
        .await?
        .ok_or(AppError::NotFound)
}

async fn update(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path((movie_id, review_id)): Path<(i32, i32)>,
    Json(dto): Json<ReviewCreation>,
) -> AppResult<StatusCode> {
    let model = find_in_movie(&state, movie_id, review_id).await?;
    if model.user_id != user.id() {
        return Err(AppError::Forbidden);
    }
    dto.validate()?;

    let mut active = model.into_active_model();
    dto.apply_to(&mut active);
    active.update(&state.db).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn remove(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path((movie_id, review_id)): Path<(i32, i32)>,
) -> AppResult<StatusCode> {
    let model = find_in_movie(&state, movie_id, review_id).await?;
    if model.user_id != user.id() {
        return Err(AppError::bad_request("only the author may delete this review"));
    }

    review::Entity::delete_by_id(model.id).exec(&state.db).await?;
    Ok(StatusCode::NO_CONTENT)
}
