use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    response::Response,
    routing::get,
};
use chrono::Utc;
use garde::Validate;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, IntoActiveModel,
    Order, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
    sea_query::Query as SubQuery,
};

use super::created;
use crate::{
    AppState,
    crud::Crud,
    entities::{actor, genre, movie, movie_actor, movie_genre},
    error::{AppError, AppResult},
    mapping::{self, ApplyTo},
    models::{MovieCreation, MovieDetail, MovieDto, MovieFilter, MoviesLanding},
    pagination::{Page, Pagination},
    storage::MOVIES_CONTAINER,
    upload::{self, MultipartForm, StagedFile},
};

const LANDING_SIZE: u64 = 5;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/movies", get(landing).post(create))
        .route("/api/movies/filtro", get(filter))
        .route("/api/movies/{movie_id}", get(show).put(update).delete(remove))
}

async fn landing(State(state): State<Arc<AppState>>) -> AppResult<Json<MoviesLanding>> {
    let today = Utc::now().date_naive();

    let upcoming = movie::Entity::find()
        .filter(movie::Column::ReleaseDate.gt(today))
        .order_by_asc(movie::Column::ReleaseDate)
        .limit(LANDING_SIZE)
        .all(&state.db)
        .await?;

    let in_theaters = movie::Entity::find()
        .filter(movie::Column::InTheaters.eq(true))
        .order_by_asc(movie::Column::Id)
        .limit(LANDING_SIZE)
        .all(&state.db)
        .await?;

    Ok(Json(MoviesLanding {
        upcoming: upcoming.into_iter().map(MovieDto::from).collect(),
        in_theaters: in_theaters.into_iter().map(MovieDto::from).collect(),
    }))
}

fn sort_column(field: &str) -> Option<movie::Column> {
    match field {
        "title" => Some(movie::Column::Title),
        "releaseDate" => Some(movie::Column::ReleaseDate),
        "inTheaters" => Some(movie::Column::InTheaters),
        "id" => Some(movie::Column::Id),
        _ => None,
    }
}

async fn filter(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<MovieFilter>,
    Query(pagination): Query<Pagination>,
) -> AppResult<Page<MovieDto>> {
    let mut select = movie::Entity::find();

    if let Some(title) = filter.title.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
        select = select.filter(movie::Column::Title.contains(title));
    }
    if filter.in_theaters {
        select = select.filter(movie::Column::InTheaters.eq(true));
    }
    if filter.upcoming {
        select = select.filter(movie::Column::ReleaseDate.gt(Utc::now().date_naive()));
    }
    if let Some(genre_id) = filter.genre_id.filter(|&id| id != 0) {
        select = select.filter(
            movie::Column::Id.in_subquery(
                SubQuery::select()
                    .column(movie_genre::Column::MovieId)
                    .from(movie_genre::Entity)
                    .and_where(movie_genre::Column::GenreId.eq(genre_id))
                    .to_owned(),
            ),
        );
    }
    if let Some(field) = filter.sort_field.as_deref().filter(|f| !f.is_empty()) {
        let order = if filter.sort_ascending.unwrap_or(true) { Order::Asc } else { Order::Desc };
        match sort_column(field) {
            Some(column) => select = select.order_by(column, order),
            None => tracing::warn!(sort_field = field, "ignoring unknown sort field"),
        }
    }
    select = select.order_by_asc(movie::Column::Id);

    Crud::<movie::ActiveModel>::new(&state.db).list_paged(select, pagination).await
}

async fn load_detail(db: &DatabaseConnection, id: i32) -> AppResult<MovieDetail> {
    let movie = movie::Entity::find_by_id(id).one(db).await?.ok_or(AppError::NotFound)?;

    let genres = movie_genre::Entity::find()
        .filter(movie_genre::Column::MovieId.eq(id))
        .find_also_related(genre::Entity)
        .order_by_asc(movie_genre::Column::GenreId)
        .all(db)
        .await?;

    let actors = movie_actor::Entity::find()
        .filter(movie_actor::Column::MovieId.eq(id))
        .find_also_related(actor::Entity)
        .order_by_asc(movie_actor::Column::SortOrder)
        .all(db)
        .await?;

    Ok(MovieDetail::from_parts(movie, genres, actors))
}

async fn show(State(state): State<Arc<AppState>>, Path(id): Path<i32>) -> AppResult<Json<MovieDetail>> {
    load_detail(&state.db, id).await.map(Json)
}

fn read_creation(form: &MultipartForm) -> AppResult<MovieCreation> {
    let dto = MovieCreation {
        title: form.required_text("title")?,
        in_theaters: form.parse_opt("inTheaters")?.unwrap_or(false),
        release_date: form.parse("releaseDate")?,
        genre_ids: form.json("genreIds")?.unwrap_or_default(),
        actors: form.json("actors")?.unwrap_or_default(),
    };
    dto.validate()?;
    Ok(dto)
}

/// Distinct genre ids, after checking that every genre and actor exists.
async fn check_references<C: ConnectionTrait>(conn: &C, dto: &MovieCreation) -> AppResult<Vec<i32>> {
    let mut genre_ids = dto.genre_ids.clone();
    genre_ids.sort_unstable();
    genre_ids.dedup();
    if !genre_ids.is_empty() {
        let found = genre::Entity::find()
            .filter(genre::Column::Id.is_in(genre_ids.clone()))
            .count(conn)
            .await?;
        if found != genre_ids.len() as u64 {
            return Err(AppError::invalid("genreIds", "unknown genre id"));
        }
    }

    let mut actor_ids: Vec<i32> = dto.actors.iter().map(|a| a.actor_id).collect();
    actor_ids.sort_unstable();
    actor_ids.dedup();
    if actor_ids.len() != dto.actors.len() {
        return Err(AppError::invalid("actors", "an actor may appear only once"));
    }
    if !actor_ids.is_empty() {
        let found = actor::Entity::find()
            .filter(actor::Column::Id.is_in(actor_ids.clone()))
            .count(conn)
            .await?;
        if found != actor_ids.len() as u64 {
            return Err(AppError::invalid("actors", "unknown actor id"));
        }
    }

    Ok(genre_ids)
}

/// Replaces the genre and cast rows of `movie_id`.
async fn write_links<C: ConnectionTrait>(conn: &C, movie_id: i32, dto: &MovieCreation) -> AppResult<()> {
    let genre_ids = check_references(conn, dto).await?;

    movie_genre::Entity::delete_many()
        .filter(movie_genre::Column::MovieId.eq(movie_id))
        .exec(conn)
        .await?;
    movie_actor::Entity::delete_many()
        .filter(movie_actor::Column::MovieId.eq(movie_id))
        .exec(conn)
        .await?;

    let genres = mapping::movie_genres(movie_id, &genre_ids);
    if !genres.is_empty() {
        movie_genre::Entity::insert_many(genres).exec_without_returning(conn).await?;
    }
    let cast = mapping::movie_actors(movie_id, &dto.actors);
    if !cast.is_empty() {
        movie_actor::Entity::insert_many(cast).exec_without_returning(conn).await?;
    }
    Ok(())
}

/// Inserts the movie and its links in one transaction.
async fn insert_movie(
    db: &DatabaseConnection,
    dto: &MovieCreation,
    poster: Option<&str>,
) -> AppResult<(movie::Model, Option<String>)> {
    let txn = db.begin().await?;
    let mut active = dto.into_active_model();
    active.poster = Set(poster.map(str::to_string));
    let model = active.insert(&txn).await?;
    write_links(&txn, model.id, dto).await?;
    txn.commit().await?;
    Ok((model, None))
}

/// Overwrites movie `id` and its links in one transaction. Returns the poster
/// URL that `poster` displaced.
async fn replace_movie(
    db: &DatabaseConnection,
    id: i32,
    dto: &MovieCreation,
    poster: Option<&str>,
) -> AppResult<((), Option<String>)> {
    let txn = db.begin().await?;
    let model = movie::Entity::find_by_id(id).one(&txn).await?.ok_or(AppError::NotFound)?;
    let previous = model.poster.clone();

    let mut active = model.into_active_model();
    dto.apply_to(&mut active);
    if let Some(url) = poster {
        active.poster = Set(Some(url.to_string()));
    }
    active.update(&txn).await?;
    write_links(&txn, id, dto).await?;
    txn.commit().await?;

    Ok(((), poster.and(previous)))
}

async fn create(State(state): State<Arc<AppState>>, multipart: Multipart) -> AppResult<Response> {
    let mut form = MultipartForm::read(multipart).await?;
    let poster = form.take_image("poster")?;
    let dto = read_creation(&form)?;

    let staged = upload::stage(poster, state.storage.as_ref(), MOVIES_CONTAINER).await?;
    let outcome = insert_movie(&state.db, &dto, staged.as_ref().map(StagedFile::url)).await;
    let model = upload::settle(staged, outcome).await?;

    tracing::info!(movie_id = model.id, "movie created");
    Ok(created(format!("/api/movies/{}", model.id), Json(MovieDto::from(model))))
}

async fn update(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
    multipart: Multipart,
) -> AppResult<StatusCode> {
    let mut form = MultipartForm::read(multipart).await?;
    let poster = form.take_image("poster")?;
    let dto = read_creation(&form)?;

    let staged = upload::stage(poster, state.storage.as_ref(), MOVIES_CONTAINER).await?;
    let outcome = replace_movie(&state.db, id, &dto, staged.as_ref().map(StagedFile::url)).await;
    upload::settle(staged, outcome).await?;

    Ok(StatusCode::NO_CONTENT)
}

async fn remove(State(state): State<Arc<AppState>>, Path(id): Path<i32>) -> AppResult<StatusCode> {
    let crud = Crud::<movie::ActiveModel>::new(&state.db);
    let poster = crud.find(id).await?.ok_or(AppError::NotFound)?.poster;
    crud.delete(id).await?;

    if let Some(url) = poster {
        if let Err(err) = state.storage.delete(&url, MOVIES_CONTAINER).await {
            tracing::warn!(error = %err, url, "could not remove movie poster");
        }
    }
    Ok(StatusCode::NO_CONTENT)
}
