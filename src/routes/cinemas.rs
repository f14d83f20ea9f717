use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::Response,
    routing::get,
};
use garde::Validate;

use super::created;
use crate::{
    AppState,
    crud::Crud,
    entities::cinema,
    error::AppResult,
    geo::{self, NearbyCinema, NearbyQuery},
    models::{CinemaCreation, CinemaDto},
};

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/cinemas", get(list).post(create))
        .route("/api/cinemas/nearby", get(nearby))
        .route("/api/cinemas/{id}", get(show).put(update).delete(remove))
}

fn cinemas(state: &AppState) -> Crud<'_, cinema::ActiveModel> {
    Crud::new(&state.db)
}

async fn list(State(state): State<Arc<AppState>>) -> AppResult<Json<Vec<CinemaDto>>> {
    cinemas(&state).list().await.map(Json)
}

async fn show(State(state): State<Arc<AppState>>, Path(id): Path<i32>) -> AppResult<Json<CinemaDto>> {
    cinemas(&state).get(id).await.map(Json)
}

async fn nearby(
    State(state): State<Arc<AppState>>,
    Query(query): Query<NearbyQuery>,
) -> AppResult<Json<Vec<NearbyCinema>>> {
    query.validate()?;
    geo::cinemas_near(&state.db, &query).await.map(Json)
}

async fn create(
    State(state): State<Arc<AppState>>,
    Json(dto): Json<CinemaCreation>,
) -> AppResult<Response> {
    let (id, cinema): (i32, CinemaDto) = cinemas(&state).create(dto).await?;
    Ok(created(format!("/api/cinemas/{id}"), Json(cinema)))
}

async fn update(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
    Json(dto): Json<CinemaCreation>,
) -> AppResult<StatusCode> {
    cinemas(&state).update(id, dto).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn remove(State(state): State<Arc<AppState>>, Path(id): Path<i32>) -> AppResult<StatusCode> {
    cinemas(&state).delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::test_support::{self, TestApp};

    async fn create(app: &TestApp, name: &str, latitude: f64, longitude: f64) -> String {
        let body = json!({ "name": name, "latitude": latitude, "longitude": longitude });
        let resp = app.send(test_support::json("POST", "/api/cinemas", None, body)).await;
        assert_eq!(resp.status, 201);
        resp.headers["location"].to_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn crud_round() {
        let app = TestApp::new().await;
        let uri = create(&app, "Agora", 18.4839233, -69.9388777).await;

        let resp = app.send(test_support::get(&uri, None)).await;
        assert_eq!(resp.body["latitude"], 18.4839233);
        assert_eq!(resp.body["longitude"], -69.9388777);

        let body = json!({ "name": "Agora Mall", "latitude": 18.48, "longitude": -69.93 });
        assert_eq!(app.send(test_support::json("PUT", &uri, None, body)).await.status, 204);
        assert_eq!(app.send(test_support::get(&uri, None)).await.body["name"], "Agora Mall");

        let resp = app.send(test_support::get("/api/cinemas", None)).await;
        assert_eq!(resp.body.as_array().unwrap().len(), 1);

        assert_eq!(app.send(test_support::delete(&uri, None)).await.status, 204);
        assert_eq!(app.send(test_support::get(&uri, None)).await.status, 404);
    }

    #[tokio::test]
    async fn out_of_range_coordinates_are_rejected() {
        let app = TestApp::new().await;
        let body = json!({ "name": "Polo", "latitude": 91.0, "longitude": 0.0 });
        let resp = app.send(test_support::json("POST", "/api/cinemas", None, body)).await;
        assert_eq!(resp.status, 400);
        assert!(resp.body["errors"]["latitude"].is_array());

        let resp = app.send(test_support::get("/api/cinemas/nearby?latitude=0&longitude=200", None)).await;
        assert_eq!(resp.status, 400);
    }

    #[tokio::test]
    async fn nearby_orders_by_distance_and_clamps_radius() {
        let app = TestApp::new().await;
        create(&app, "Sambil", 18.4823, -69.9118).await;
        create(&app, "Agora", 18.4839233, -69.9388777).await;
        // About 80 km away: outside even the capped radius.
        create(&app, "Santiago", 18.95, -70.40).await;

        let resp = app
            .send(test_support::get("/api/cinemas/nearby?latitude=18.481139&longitude=-69.938950&radiusKm=5", None))
            .await;
        assert_eq!(resp.status, 200);
        let names: Vec<_> = resp.body.as_array().unwrap().iter().map(|c| c["name"].as_str().unwrap()).collect();
        assert_eq!(names, ["Agora", "Sambil"]);
        assert!(resp.body[0]["distanceInMeters"].as_f64().unwrap() < 1_000.0);

        let resp = app
            .send(test_support::get("/api/cinemas/nearby?latitude=18.481139&longitude=-69.938950&radiusKm=100", None))
            .await;
        assert_eq!(resp.body.as_array().unwrap().len(), 2);
    }
}
