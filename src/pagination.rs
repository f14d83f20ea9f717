use axum::{
    Json,
    http::{HeaderName, HeaderValue},
    response::{IntoResponse, Response},
};
use sea_orm::{DatabaseConnection, EntityTrait, PaginatorTrait, QuerySelect, Select};
use serde::{Deserialize, Serialize};

use crate::error::AppResult;

pub const TOTAL_COUNT_HEADER: HeaderName = HeaderName::from_static("cantidadtotalregistros");

pub const DEFAULT_PAGE_SIZE: u64 = 10;
pub const MAX_PAGE_SIZE: u64 = 50;
/// SQLite binds OFFSET as a signed 64-bit integer.
const MAX_OFFSET: u64 = i64::MAX as u64;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPagination {
    page: Option<u64>,
    page_size: Option<u64>,
}

/// Page window requested by the client. Page is 1-based; page size stays within `1..=50`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(from = "RawPagination")]
pub struct Pagination {
    pub page: u64,
    pub page_size: u64,
}

impl Pagination {
    pub fn new(page: u64, page_size: u64) -> Self {
        Self { page: page.max(1), page_size: page_size.clamp(1, MAX_PAGE_SIZE) }
    }

    pub fn offset(&self) -> u64 {
        (self.page - 1).saturating_mul(self.page_size).min(MAX_OFFSET)
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self::new(1, DEFAULT_PAGE_SIZE)
    }
}

impl From<RawPagination> for Pagination {
    fn from(raw: RawPagination) -> Self {
        Self::new(raw.page.unwrap_or(1), raw.page_size.unwrap_or(DEFAULT_PAGE_SIZE))
    }
}

/// One window of results plus the size of the whole filtered set.
#[derive(Clone, Debug)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
}

impl<T> Page<T> {
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page { items: self.items.into_iter().map(f).collect(), total: self.total }
    }
}

impl<T: Serialize> IntoResponse for Page<T> {
    fn into_response(self) -> Response {
        let mut resp = Json(self.items).into_response();
        resp.headers_mut().insert(TOTAL_COUNT_HEADER, HeaderValue::from(self.total));
        resp
    }
}

/// Counts everything `select` matches, then fetches the requested window of it.
pub async fn paginate<E>(
    db: &DatabaseConnection,
    select: Select<E>,
    pagination: Pagination,
) -> AppResult<(Vec<E::Model>, u64)>
where
    E: EntityTrait,
    E::Model: Sync,
{
    let total = select.clone().count(db).await?;
    let items = select.offset(pagination.offset()).limit(pagination.page_size).all(db).await?;
    Ok((items, total))
}
