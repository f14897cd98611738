//! Gateway-owned user accounts and bearer-token auth.
//!
//! The conversational core (Session, Order, TranscriptRecord) only ever
//! sees an opaque user id; `User` and its store exist purely so this
//! process can mint and verify its own bearer tokens, mirroring the
//! original prototype where login and verification live in the same
//! backend (see DESIGN.md, Open Question 5).

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use axum::extract::State;
use axum::http::{Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use sa_domain::config::JwtAuthConfig;
use sa_domain::error::{Error, Result};

/// Role carried in the JWT payload: `1` = admin, `2` = customer, per the
/// external interface contract. Serializes to/from that literal integer,
/// not a string, so the wire shape matches the contract exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum UserRole {
    Admin,
    Customer,
}

impl UserRole {
    pub fn is_admin(self) -> bool {
        matches!(self, UserRole::Admin)
    }
}

impl From<UserRole> for u8 {
    fn from(role: UserRole) -> u8 {
        match role {
            UserRole::Admin => 1,
            UserRole::Customer => 2,
        }
    }
}

impl TryFrom<u8> for UserRole {
    type Error = String;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            1 => Ok(UserRole::Admin),
            2 => Ok(UserRole::Customer),
            other => Err(format!("unknown role code {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub role: UserRole,
    pub created_at: DateTime<Utc>,
}

/// JSON-file-backed user accounts, the same store idiom `SessionStore`
/// uses for its own state.
pub struct UserStore {
    path: PathBuf,
    by_id: RwLock<HashMap<String, User>>,
}

impl UserStore {
    pub fn new(state_path: &Path) -> Result<Self> {
        let path = state_path.join("users.json");
        let by_id = if path.exists() {
            let raw = std::fs::read_to_string(&path).map_err(Error::Io)?;
            serde_json::from_str(&raw).unwrap_or_default()
        } else {
            HashMap::new()
        };
        Ok(Self {
            path,
            by_id: RwLock::new(by_id),
        })
    }

    fn flush(&self) -> Result<()> {
        let snapshot = self.by_id.read();
        let raw = serde_json::to_string_pretty(&*snapshot)?;
        std::fs::write(&self.path, raw).map_err(Error::Io)
    }

    pub fn find_by_login(&self, username_or_email: &str) -> Option<User> {
        self.by_id
            .read()
            .values()
            .find(|u| u.username == username_or_email || u.email == username_or_email)
            .cloned()
    }

    /// Register a user with a hashed password. Returns `Error::Conflict` if
    /// the username or email is already taken.
    pub fn create(
        &self,
        username: &str,
        email: &str,
        password: &str,
        role: UserRole,
    ) -> Result<User> {
        if self.find_by_login(username).is_some() || self.find_by_login(email).is_some() {
            return Err(Error::Conflict(format!(
                "username or email already registered: {username}"
            )));
        }
        let password_hash = hash_password(password)?;
        let user = User {
            id: uuid::Uuid::new_v4().to_string(),
            username: username.to_owned(),
            email: email.to_owned(),
            password_hash,
            role,
            created_at: Utc::now(),
        };
        self.by_id.write().insert(user.id.clone(), user.clone());
        self.flush()?;
        Ok(user)
    }
}

fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| Error::Internal(format!("password hash: {e}")))
}

fn verify_password(password: &str, hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

// ── JWT mint/verify ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub id: String,
    pub username: String,
    pub role: UserRole,
    pub exp: i64,
}

/// Authenticated principal, inserted into request extensions by
/// [`require_auth`] once a bearer token verifies.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: String,
    pub username: String,
    pub role: UserRole,
}

pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl_seconds: u64,
}

impl JwtKeys {
    pub fn from_config(cfg: &JwtAuthConfig) -> Result<Self> {
        let secret = std::env::var(&cfg.secret_env).map_err(|_| {
            Error::Config(format!(
                "auth.secret_env names '{}', which is not set",
                cfg.secret_env
            ))
        })?;
        Ok(Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl_seconds: cfg.token_ttl_seconds,
        })
    }

    pub fn mint(&self, user: &User) -> Result<String> {
        let claims = Claims {
            id: user.id.clone(),
            username: user.username.clone(),
            role: user.role,
            exp: (Utc::now() + chrono::Duration::seconds(self.ttl_seconds as i64)).timestamp(),
        };
        jsonwebtoken::encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| Error::Auth(format!("token mint failed: {e}")))
    }

    pub fn verify(&self, token: &str) -> Result<Claims> {
        jsonwebtoken::decode::<Claims>(token, &self.decoding, &Validation::default())
            .map(|data| data.claims)
            .map_err(|e| Error::Auth(format!("token verify failed: {e}")))
    }
}

/// Axum middleware gating every route under it on a valid bearer token.
/// On success, inserts [`AuthUser`] into request extensions for handlers
/// to pull out via `Extension<AuthUser>`.
pub async fn require_auth(
    State(state): State<crate::state::AppState>,
    mut req: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let token = req
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    let Some(token) = token else {
        return unauthorized("missing bearer token");
    };

    match state.jwt.verify(token) {
        Ok(claims) => {
            req.extensions_mut().insert(AuthUser {
                id: claims.id,
                username: claims.username,
                role: claims.role,
            });
            next.run(req).await
        }
        Err(_) => unauthorized("invalid or expired token"),
    }
}

fn unauthorized(message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(serde_json::json!({ "error": message })),
    )
        .into_response()
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username_or_email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub user_id: String,
    pub username: String,
    pub role: UserRole,
}

pub async fn login(
    State(state): State<crate::state::AppState>,
    Json(req): Json<LoginRequest>,
) -> Response {
    let Some(user) = state.users.find_by_login(&req.username_or_email) else {
        return unauthorized("invalid credentials");
    };
    if !verify_password(&req.password, &user.password_hash) {
        return unauthorized("invalid credentials");
    }
    match state.jwt.mint(&user) {
        Ok(token) => Json(LoginResponse {
            token,
            user_id: user.id,
            username: user.username,
            role: user.role,
        })
        .into_response(),
        Err(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "error": "token mint failed" })),
        )
            .into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_hash_round_trips() {
        let hash = hash_password("s3cret!").unwrap();
        assert!(verify_password("s3cret!", &hash));
        assert!(!verify_password("wrong", &hash));
    }

    #[test]
    fn user_store_rejects_duplicate_username() {
        let dir = tempfile::tempdir().unwrap();
        let store = UserStore::new(dir.path()).unwrap();
        store
            .create("ana", "ana@example.com", "pw123456", UserRole::Customer)
            .unwrap();
        let err = store
            .create("ana", "other@example.com", "pw123456", UserRole::Customer)
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[test]
    fn jwt_round_trips_claims() {
        std::env::set_var("SA_TEST_JWT_SECRET", "unit-test-secret-value");
        let cfg = JwtAuthConfig {
            secret_env: "SA_TEST_JWT_SECRET".into(),
            token_ttl_seconds: 3600,
        };
        let keys = JwtKeys::from_config(&cfg).unwrap();
        let user = User {
            id: "u1".into(),
            username: "ana".into(),
            email: "ana@example.com".into(),
            password_hash: String::new(),
            role: UserRole::Admin,
            created_at: Utc::now(),
        };
        let token = keys.mint(&user).unwrap();
        let claims = keys.verify(&token).unwrap();
        assert_eq!(claims.id, "u1");
        assert_eq!(claims.role, UserRole::Admin);
    }
}
