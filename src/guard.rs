//! Checks that run ahead of a handler and may end the request early.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use axum::{
    extract::{Path, Request, State, rejection::PathRejection},
    middleware::Next,
    response::{IntoResponse, Response},
};
use sea_orm::{DatabaseConnection, EntityTrait, PaginatorTrait};

use crate::{
    entities::movie,
    error::{AppError, AppResult},
};

pub type PathParams = HashMap<String, String>;

#[async_trait]
pub trait Precondition: Send + Sync {
    /// `Ok` lets the request through; an error becomes the response.
    async fn check(&self, db: &DatabaseConnection, params: &PathParams) -> AppResult<()>;
}

/// Rejects requests whose `movie_id` segment does not name a stored movie.
/// Routes without that segment pass untouched.
pub struct MovieExists;

#[async_trait]
impl Precondition for MovieExists {
    async fn check(&self, db: &DatabaseConnection, params: &PathParams) -> AppResult<()> {
        let Some(raw) = params.get("movie_id") else {
            return Ok(());
        };
        let id: i32 = raw.parse().map_err(|_| AppError::NotFound)?;

        if movie::Entity::find_by_id(id).count(db).await? == 0 {
            tracing::debug!(movie_id = id, "movie not found");
            return Err(AppError::NotFound);
        }
        Ok(())
    }
}

/// Ordered preconditions plus the connection they query.
#[derive(Clone)]
pub struct Guards {
    db: DatabaseConnection,
    checks: Arc<[Arc<dyn Precondition>]>,
}

impl Guards {
    pub fn new(db: DatabaseConnection, checks: Vec<Arc<dyn Precondition>>) -> Self {
        Self { db, checks: checks.into() }
    }

    pub async fn run(&self, params: &PathParams) -> AppResult<()> {
        for check in self.checks.iter() {
            check.check(&self.db, params).await?;
        }
        Ok(())
    }
}

/// Middleware entry point; mount with `middleware::from_fn_with_state`.
pub async fn enforce(
    State(guards): State<Guards>,
    params: Result<Path<PathParams>, PathRejection>,
    req: Request,
    next: Next,
) -> Response {
    let params = params.map(|Path(p)| p).unwrap_or_default();
    match guards.run(&params).await {
        Ok(()) => next.run(req).await,
        Err(err) => err.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use sea_orm::{ActiveModelTrait, Set};

    use super::*;
    use crate::test_support;

    fn params(pairs: &[(&str, &str)]) -> PathParams {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[tokio::test]
    async fn movie_exists_checks_the_segment() {
        let db = test_support::db().await;
        let id = movie::ActiveModel {
            title: Set("Pelicula".into()),
            in_theaters: Set(false),
            release_date: Set(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()),
            ..Default::default()
        }
        .insert(&db)
        .await
        .unwrap()
        .id;
        let guards = Guards::new(db, vec![Arc::new(MovieExists)]);

        guards.run(&params(&[("movie_id", &id.to_string())])).await.unwrap();
        guards.run(&params(&[])).await.unwrap();
        guards.run(&params(&[("review_id", "7")])).await.unwrap();

        let missing = guards.run(&params(&[("movie_id", "9999")])).await;
        assert!(matches!(missing, Err(AppError::NotFound)));
        let garbage = guards.run(&params(&[("movie_id", "abc")])).await;
        assert!(matches!(garbage, Err(AppError::NotFound)));
    }
}
