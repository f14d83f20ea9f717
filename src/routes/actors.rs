use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    response::Response,
    routing::get,
};
use garde::Validate;
use json_patch::Patch;
use sea_orm::{ActiveModelTrait, EntityTrait, IntoActiveModel, QueryOrder, Set};

use super::created;
use crate::{
    AppState,
    crud::Crud,
    entities::actor,
    error::{AppError, AppResult},
    mapping::ApplyTo,
    models::{ActorCreation, ActorDto, ActorPatch},
    pagination::{Page, Pagination},
    storage::ACTORS_CONTAINER,
    upload::{self, MultipartForm},
};

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/actors", get(list).post(create))
        .route("/api/actors/{id}", get(show).put(update).patch(patch).delete(remove))
}

fn actors(state: &AppState) -> Crud<'_, actor::ActiveModel> {
    Crud::new(&state.db)
}

fn read_creation(form: &MultipartForm) -> AppResult<ActorCreation> {
    let dto = ActorCreation { name: form.required_text("name")?, birth_date: form.parse("birthDate")? };
    dto.validate()?;
    Ok(dto)
}

async fn list(
    State(state): State<Arc<AppState>>,
    Query(pagination): Query<Pagination>,
) -> AppResult<Page<ActorDto>> {
    let select = actor::Entity::find().order_by_asc(actor::Column::Name).order_by_asc(actor::Column::Id);
    actors(&state).list_paged(select, pagination).await
}

async fn show(State(state): State<Arc<AppState>>, Path(id): Path<i32>) -> AppResult<Json<ActorDto>> {
    actors(&state).get(id).await.map(Json)
}

async fn create(State(state): State<Arc<AppState>>, multipart: Multipart) -> AppResult<Response> {
    let mut form = MultipartForm::read(multipart).await?;
    let photo = form.take_image("photo")?;
    let dto = read_creation(&form)?;

    let staged = upload::stage(photo, state.storage.as_ref(), ACTORS_CONTAINER).await?;
    let mut active = dto.into_active_model();
    active.photo = Set(staged.as_ref().map(|s| s.url().to_string()));
    let outcome = active.insert(&state.db).await.map(|model| (model, None)).map_err(AppError::from);
    let model = upload::settle(staged, outcome).await?;

    tracing::info!(actor_id = model.id, "actor created");
    Ok(created(format!("/api/actors/{}", model.id), Json(ActorDto::from(model))))
}

async fn update(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
    multipart: Multipart,
) -> AppResult<StatusCode> {
    let mut form = MultipartForm::read(multipart).await?;
    let photo = form.take_image("photo")?;
    let dto = read_creation(&form)?;

    let model = actors(&state).find(id).await?.ok_or(AppError::NotFound)?;
    let previous = model.photo.clone();
    let mut active = model.into_active_model();
    dto.apply_to(&mut active);

    let staged = upload::stage(photo, state.storage.as_ref(), ACTORS_CONTAINER).await?;
    if let Some(staged) = &staged {
        active.photo = Set(Some(staged.url().to_string()));
    }
    let replaced = staged.as_ref().and(previous);
    let outcome = active.update(&state.db).await.map(|_| ((), replaced)).map_err(AppError::from);
    upload::settle(staged, outcome).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn patch(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
    body: Bytes,
) -> AppResult<StatusCode> {
    let document: Option<Patch> = if body.iter().all(u8::is_ascii_whitespace) {
        None
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| AppError::bad_request(format!("malformed patch document: {e}")))?
    };

    actors(&state).patch::<ActorPatch>(id, document).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn remove(State(state): State<Arc<AppState>>, Path(id): Path<i32>) -> AppResult<StatusCode> {
    let crud = actors(&state);
    let photo = crud.find(id).await?.ok_or(AppError::NotFound)?.photo;
    crud.delete(id).await?;

    if let Some(url) = photo {
        if let Err(err) = state.storage.delete(&url, ACTORS_CONTAINER).await {
            tracing::warn!(error = %err, url, "could not remove actor photo");
        }
    }
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use sea_orm::{ActiveModelTrait, Set};
    use serde_json::json;

    use crate::{
        entities::actor,
        pagination::TOTAL_COUNT_HEADER,
        test_support::{self, MultipartBody, TestApp},
    };

    async fn seed(app: &TestApp, name: &str) -> i32 {
        actor::ActiveModel {
            name: Set(name.into()),
            birth_date: Set(NaiveDate::from_ymd_opt(1980, 1, 1).unwrap()),
            ..Default::default()
        }
        .insert(app.db())
        .await
        .unwrap()
        .id
    }

    #[tokio::test]
    async fn list_pages_and_reports_total() {
        let app = TestApp::new().await;
        for i in 0..12 {
            seed(&app, &format!("Actor {i:02}")).await;
        }

        for (page, expected) in [(1, 5), (2, 5), (3, 2), (4, 0)] {
            let resp = app.send(test_support::get(&format!("/api/actors?page={page}&pageSize=5"), None)).await;
            assert_eq!(resp.status, 200);
            assert_eq!(resp.body.as_array().unwrap().len(), expected, "page {page}");
            assert_eq!(resp.headers[TOTAL_COUNT_HEADER], "12");
        }

        let resp = app.send(test_support::get("/api/actors", None)).await;
        assert_eq!(resp.body.as_array().unwrap().len(), 10);

        let resp = app.send(test_support::get("/api/actors?page=9223372036854775807&pageSize=10", None)).await;
        assert_eq!(resp.status, 200);
        assert_eq!(resp.body, serde_json::json!([]));
        assert_eq!(resp.headers[TOTAL_COUNT_HEADER], "12");
    }

    #[tokio::test]
    async fn create_with_photo_stores_the_file() {
        let app = TestApp::new().await;
        let form = MultipartBody::new()
            .text("name", "Penelope Cruz")
            .text("birthDate", "1974-04-28")
            .file("photo", "cruz.jpg", "image/jpeg", b"\xff\xd8\xff");

        let resp = app.send(test_support::multipart("POST", "/api/actors", None, form)).await;
        assert_eq!(resp.status, 201);
        let photo = resp.body["photo"].as_str().unwrap();
        assert!(photo.starts_with("http://localhost/uploads/actors/") && photo.ends_with(".jpg"));

        let file = photo.rsplit('/').next().unwrap();
        assert!(app.state.config.upload_dir.join("actors").join(file).exists());
    }

    #[tokio::test]
    async fn non_image_upload_is_a_validation_error() {
        let app = TestApp::new().await;
        let form = MultipartBody::new()
            .text("name", "Penelope Cruz")
            .text("birthDate", "1974-04-28")
            .file("photo", "notes.txt", "text/plain", b"hello");

        let resp = app.send(test_support::multipart("POST", "/api/actors", None, form)).await;
        assert_eq!(resp.status, 400);
        assert!(resp.body["errors"]["photo"].is_array());
    }

    #[tokio::test]
    async fn put_keeps_photo_when_none_uploaded() {
        let app = TestApp::new().await;
        let form = MultipartBody::new()
            .text("name", "Javier")
            .text("birthDate", "1969-03-01")
            .file("photo", "j.png", "image/png", b"png");
        let resp = app.send(test_support::multipart("POST", "/api/actors", None, form)).await;
        let uri = format!("/api/actors/{}", resp.body["id"]);
        let photo = resp.body["photo"].clone();

        let form = MultipartBody::new().text("name", "Javier Bardem").text("birthDate", "1969-03-01");
        let resp = app.send(test_support::multipart("PUT", &uri, None, form)).await;
        assert_eq!(resp.status, 204);

        let resp = app.send(test_support::get(&uri, None)).await;
        assert_eq!(resp.body["name"], "Javier Bardem");
        assert_eq!(resp.body["photo"], photo);

        let form = MultipartBody::new().text("name", "Nadie").text("birthDate", "1969-03-01");
        let resp = app.send(test_support::multipart("PUT", "/api/actors/999", None, form)).await;
        assert_eq!(resp.status, 404);
    }

    #[tokio::test]
    async fn patch_endpoint() {
        let app = TestApp::new().await;
        let id = seed(&app, "Ricardo Darin").await;
        let uri = format!("/api/actors/{id}");

        let resp = app.send(test_support::json("PATCH", &uri, None, json!(null))).await;
        assert_eq!(resp.status, 400);

        let op = json!([{ "op": "replace", "path": "/birthDate", "value": "1957-01-16" }]);
        let resp = app.send(test_support::json("PATCH", "/api/actors/999", None, op.clone())).await;
        assert_eq!(resp.status, 404);

        let resp = app.send(test_support::json("PATCH", &uri, None, op)).await;
        assert_eq!(resp.status, 204);
        let resp = app.send(test_support::get(&uri, None)).await;
        assert_eq!(resp.body["birthDate"], "1957-01-16");
        assert_eq!(resp.body["name"], "Ricardo Darin");

        let bad = json!([{ "op": "replace", "path": "/name", "value": "" }]);
        let resp = app.send(test_support::json("PATCH", &uri, None, bad)).await;
        assert_eq!(resp.status, 400);
        assert!(resp.body["errors"]["name"].is_array());
    }

    #[tokio::test]
    async fn delete_endpoint() {
        let app = TestApp::new().await;
        let id = seed(&app, "Gael").await;
        let uri = format!("/api/actors/{id}");

        assert_eq!(app.send(test_support::delete(&uri, None)).await.status, 204);
        assert_eq!(app.send(test_support::get(&uri, None)).await.status, 404);
        assert_eq!(app.send(test_support::delete(&uri, None)).await.status, 404);
    }
}
