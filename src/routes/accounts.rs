use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
};
use garde::Validate;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set,
};

use crate::{
    AppState,
    auth::{self, AdminUser, AuthUser, Identity},
    entities::{role, user, user_claim},
    error::{AppError, AppResult},
    models::{AdminEdit, AuthResponse, RoleEdit, UserCredentials, UserDto},
    pagination::{Page, Pagination, paginate},
};

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/accounts/register", post(register))
        .route("/api/accounts/login", post(login))
        .route("/api/accounts/renew-token", get(renew_token))
        .route("/api/accounts/users", get(users))
        .route("/api/accounts/roles", get(roles))
        .route("/api/accounts/assign-role", post(assign_role))
        .route("/api/accounts/remove-role", post(remove_role))
        .route("/api/accounts/make-admin", post(make_admin))
        .route("/api/accounts/remove-admin", post(remove_admin))
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

async fn find_by_email(db: &DatabaseConnection, email: &str) -> AppResult<Option<user::Model>> {
    Ok(user::Entity::find()
        .filter(user::Column::Email.eq(normalize_email(email)))
        .one(db)
        .await?)
}

async fn register(
    State(state): State<Arc<AppState>>,
    Json(credentials): Json<UserCredentials>,
) -> AppResult<Json<AuthResponse>> {
    credentials.validate()?;
    if find_by_email(&state.db, &credentials.email).await?.is_some() {
        return Err(AppError::invalid("email", "is already registered"));
    }

    let model = user::ActiveModel {
        id: Set(uuid::Uuid::new_v4().to_string()),
        email: Set(normalize_email(&credentials.email)),
        password_hash: Set(auth::hash_password(&credentials.password)?),
    }
    .insert(&state.db)
    .await?;

    tracing::info!(user_id = %model.id, "user registered");
    let identity = Identity::load(&state.db, model).await?;
    state.tokens.issue(identity).map(Json)
}

async fn login(
    State(state): State<Arc<AppState>>,
    Json(credentials): Json<UserCredentials>,
) -> AppResult<Json<AuthResponse>> {
    let invalid = || AppError::Unauthorized("invalid login".to_string());

    let model = find_by_email(&state.db, &credentials.email).await?.ok_or_else(invalid)?;
    if !auth::verify_password(&credentials.password, &model.password_hash) {
        tracing::debug!(user_id = %model.id, "password mismatch");
        return Err(invalid());
    }

    let identity = Identity::load(&state.db, model).await?;
    state.tokens.issue(identity).map(Json)
}

async fn renew_token(
    AuthUser(claims): AuthUser,
    State(state): State<Arc<AppState>>,
) -> AppResult<Json<AuthResponse>> {
    state.tokens.issue(Identity::from(claims)).map(Json)
}

async fn users(
    _admin: AdminUser,
    State(state): State<Arc<AppState>>,
    Query(pagination): Query<Pagination>,
) -> AppResult<Page<UserDto>> {
    let select = user::Entity::find().order_by_asc(user::Column::Email);
    let (rows, total) = paginate(&state.db, select, pagination).await?;
    Ok(Page { items: rows, total }.map(UserDto::from))
}

async fn roles(_admin: AdminUser, State(state): State<Arc<AppState>>) -> AppResult<Json<Vec<String>>> {
    let names = role::Entity::find()
        .select_only()
        .column(role::Column::Name)
        .order_by_asc(role::Column::Name)
        .into_tuple::<String>()
        .all(&state.db)
        .await?;
    Ok(Json(names))
}

async fn claim_exists(db: &DatabaseConnection, user_id: &str, claim_type: &str, value: &str) -> AppResult<bool> {
    let count = user_claim::Entity::find()
        .filter(user_claim::Column::UserId.eq(user_id))
        .filter(user_claim::Column::ClaimType.eq(claim_type))
        .filter(user_claim::Column::ClaimValue.eq(value))
        .count(db)
        .await?;
    Ok(count > 0)
}

async fn add_claim(db: &DatabaseConnection, user_id: &str, claim_type: &str, value: &str) -> AppResult<()> {
    if claim_exists(db, user_id, claim_type, value).await? {
        return Ok(());
    }
    user_claim::ActiveModel {
        user_id: Set(user_id.to_string()),
        claim_type: Set(claim_type.to_string()),
        claim_value: Set(value.to_string()),
        ..Default::default()
    }
    .insert(db)
    .await?;
    Ok(())
}

async fn remove_claim(db: &DatabaseConnection, user_id: &str, claim_type: &str, value: &str) -> AppResult<()> {
    user_claim::Entity::delete_many()
        .filter(user_claim::Column::UserId.eq(user_id))
        .filter(user_claim::Column::ClaimType.eq(claim_type))
        .filter(user_claim::Column::ClaimValue.eq(value))
        .exec(db)
        .await?;
    Ok(())
}

async fn assign_role(
    admin: AdminUser,
    State(state): State<Arc<AppState>>,
    Json(edit): Json<RoleEdit>,
) -> AppResult<StatusCode> {
    edit.validate()?;
    let target = user::Entity::find_by_id(edit.user_id.as_str()).one(&state.db).await?.ok_or(AppError::NotFound)?;

    add_claim(&state.db, &target.id, user_claim::ROLE, &edit.role_name).await?;
    tracing::info!(by = %admin.0.sub, user_id = %target.id, role = %edit.role_name, "role assigned");
    Ok(StatusCode::NO_CONTENT)
}

async fn remove_role(
    admin: AdminUser,
    State(state): State<Arc<AppState>>,
    Json(edit): Json<RoleEdit>,
) -> AppResult<StatusCode> {
    edit.validate()?;
    let target = user::Entity::find_by_id(edit.user_id.as_str()).one(&state.db).await?.ok_or(AppError::NotFound)?;

    remove_claim(&state.db, &target.id, user_claim::ROLE, &edit.role_name).await?;
    tracing::info!(by = %admin.0.sub, user_id = %target.id, role = %edit.role_name, "role removed");
    Ok(StatusCode::NO_CONTENT)
}

const ADMIN_FLAG: &str = "1";

async fn make_admin(State(state): State<Arc<AppState>>, Json(edit): Json<AdminEdit>) -> AppResult<StatusCode> {
    edit.validate()?;
    let target = find_by_email(&state.db, &edit.email).await?.ok_or(AppError::NotFound)?;

    add_claim(&state.db, &target.id, user_claim::IS_ADMIN, ADMIN_FLAG).await?;
    tracing::info!(user_id = %target.id, "admin flag set");
    Ok(StatusCode::NO_CONTENT)
}

async fn remove_admin(State(state): State<Arc<AppState>>, Json(edit): Json<AdminEdit>) -> AppResult<StatusCode> {
    edit.validate()?;
    let target = find_by_email(&state.db, &edit.email).await?.ok_or(AppError::NotFound)?;

    remove_claim(&state.db, &target.id, user_claim::IS_ADMIN, ADMIN_FLAG).await?;
    tracing::info!(user_id = %target.id, "admin flag cleared");
    Ok(StatusCode::NO_CONTENT)
}
