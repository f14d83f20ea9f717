use std::sync::Arc;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{HeaderValue, StatusCode, header::LOCATION},
    response::{IntoResponse, Response},
};

use crate::AppState;

mod accounts;
mod actors;
mod cinemas;
mod genres;
mod movies;
mod reviews;

/// Room for a 4 MB image plus the rest of the form.
const MAX_BODY_BYTES: usize = 8 * 1024 * 1024;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(genres::router())
        .merge(actors::router())
        .merge(movies::router())
        .merge(cinemas::router())
        .merge(reviews::router(&state))
        .merge(accounts::router())
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(state)
}

/// `201 Created` pointing at the new resource.
fn created<T: IntoResponse>(location: String, body: T) -> Response {
    let mut resp = (StatusCode::CREATED, body).into_response();
    if let Ok(value) = HeaderValue::from_str(&location) {
        resp.headers_mut().insert(LOCATION, value);
    }
    resp
}
