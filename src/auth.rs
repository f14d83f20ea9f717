use std::sync::Arc;

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use axum::{
    extract::FromRequestParts,
    http::{HeaderMap, header::AUTHORIZATION, request::Parts},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use serde::{Deserialize, Serialize};

use crate::{
    AppState,
    entities::{user, user_claim},
    error::{AppError, AppResult},
    models::AuthResponse,
};

pub const ADMIN_ROLE: &str = "admin";

const TOKEN_LIFETIME_DAYS: i64 = 365;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// User id.
    pub sub: String,
    pub email: String,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(rename = "isAdmin", default)]
    pub is_admin: bool,
    pub iat: i64,
    pub exp: i64,
}

impl Claims {
    pub fn has_admin_rights(&self) -> bool {
        self.is_admin || self.roles.iter().any(|r| r == ADMIN_ROLE)
    }
}

/// Everything a token says about its bearer, minus the timestamps.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    pub email: String,
    pub roles: Vec<String>,
    pub is_admin: bool,
}

impl Identity {
    /// Collects the stored claims of `user`.
    pub async fn load(db: &DatabaseConnection, user: user::Model) -> AppResult<Self> {
        let claims = user_claim::Entity::find()
            .filter(user_claim::Column::UserId.eq(user.id.as_str()))
            .all(db)
            .await?;

        let mut identity = Self { user_id: user.id, email: user.email, roles: Vec::new(), is_admin: false };
        for claim in claims {
            match claim.claim_type.as_str() {
                user_claim::ROLE => identity.roles.push(claim.claim_value),
                user_claim::IS_ADMIN => identity.is_admin |= is_truthy(&claim.claim_value),
                other => tracing::debug!(claim_type = other, "ignoring unknown claim"),
            }
        }
        identity.roles.sort();
        identity.roles.dedup();
        Ok(identity)
    }
}

impl From<Claims> for Identity {
    fn from(c: Claims) -> Self {
        Self { user_id: c.sub, email: c.email, roles: c.roles, is_admin: c.is_admin }
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(value, "1" | "true" | "True")
}

/// Signs and verifies HS256 bearer tokens.
#[derive(Clone)]
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    lifetime: Duration,
}

impl TokenService {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            lifetime: Duration::days(TOKEN_LIFETIME_DAYS),
        }
    }

    pub fn issue(&self, identity: Identity) -> AppResult<AuthResponse> {
        let now = Utc::now();
        let expiration = now + self.lifetime;

        let claims = Claims {
            sub: identity.user_id,
            email: identity.email,
            roles: identity.roles,
            is_admin: identity.is_admin,
            iat: now.timestamp(),
            exp: expiration.timestamp(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AppError::Internal(anyhow::Error::new(e).context("sign token")))?;
        Ok(AuthResponse { token, expiration })
    }

    pub fn validate(&self, token: &str) -> AppResult<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!(error = %e, "rejected bearer token");
                AppError::Unauthorized("invalid token".to_string())
            })
    }
}

pub fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Internal(anyhow::anyhow!("hash password: {e}")))
}

/// False for a wrong password or an unreadable stored hash.
pub fn verify_password(password: &str, hash: &str) -> bool {
    PasswordHash::new(hash)
        .map(|parsed| Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok())
        .unwrap_or(false)
}

fn bearer_token(headers: &HeaderMap) -> AppResult<&str> {
    let header = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized("missing Authorization header".to_string()))?;

    header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::Unauthorized("invalid Authorization header format".to_string()))
}

/// Caller holding a valid bearer token.
#[derive(Clone, Debug)]
pub struct AuthUser(pub Claims);

impl AuthUser {
    pub fn id(&self) -> &str {
        &self.0.sub
    }
}

impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers)?;
        state.tokens.validate(token).map(Self)
    }
}

/// Caller holding a valid token with admin rights.
#[derive(Clone, Debug)]
pub struct AdminUser(pub Claims);

impl FromRequestParts<Arc<AppState>> for AdminUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        let AuthUser(claims) = AuthUser::from_request_parts(parts, state).await?;
        if !claims.has_admin_rights() {
            return Err(AppError::Forbidden);
        }
        Ok(Self(claims))
    }
}
