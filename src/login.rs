#![cfg(feature = "web")]

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use axum::{
    Json,
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{Html, IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, SystemTime};
use thiserror::Error;
use uuid::Uuid;

use crate::config::{AdminSecret, MAX_SESSION_TTL_HOURS};

/// Name of the cookie carrying the session token
pub const AUTH_COOKIE: &str = "auth_token";

const MAX_SESSION_TTL: Duration = Duration::from_secs(MAX_SESSION_TTL_HOURS * 60 * 60);

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("password hashing failed: {0}")]
    Hashing(argon2::password_hash::Error),
    #[error("ADMIN_PASSWORD_HASH is not a valid PHC string: {0}")]
    InvalidHash(argon2::password_hash::Error),
}

/// The administrator password, kept only as an argon2 hash
#[derive(Debug, Clone)]
pub struct AdminCredentials {
    password_hash: String,
}

impl AdminCredentials {
    /// Hash a plain password
    ///
    /// # Arguments
    /// * `password` - The plaintext password to hash
    ///
    /// # Returns
    /// * `Result<AdminCredentials, AuthError>` - Credentials holding the hash, or an error
    pub fn from_password(password: &str) -> Result<Self, AuthError> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map_err(AuthError::Hashing)?;
        Ok(Self {
            password_hash: hash.to_string(),
        })
    }

    /// Use a pre-computed argon2 hash
    pub fn from_hash(phc: &str) -> Result<Self, AuthError> {
        PasswordHash::new(phc).map_err(AuthError::InvalidHash)?;
        Ok(Self {
            password_hash: phc.to_string(),
        })
    }

    pub fn from_secret(secret: &AdminSecret) -> Result<Self, AuthError> {
        match secret {
            AdminSecret::Password(plain) => Self::from_password(plain),
            AdminSecret::Hash(phc) => Self::from_hash(phc),
        }
    }

    /// Check a login attempt against the stored hash
    pub fn verify(&self, password: &str) -> bool {
        match PasswordHash::new(&self.password_hash) {
            Ok(parsed) => Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok(),
            Err(_) => false,
        }
    }
}

/// In-memory administrator sessions keyed by token
pub struct SessionStore {
    sessions: RwLock<HashMap<String, SystemTime>>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Open a new session
    ///
    /// # Returns
    /// * `String` - A unique session token
    pub fn create(&self) -> String {
        let token = Uuid::new_v4().to_string();
        let now = SystemTime::now();
        let expires_at = now.checked_add(self.ttl).unwrap_or(now + MAX_SESSION_TTL);
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(token.clone(), expires_at);
        token
    }

    /// Whether `token` names a live session
    pub fn validate(&self, token: &str) -> bool {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(token)
            .is_some_and(|expires_at| *expires_at > SystemTime::now())
    }

    pub fn revoke(&self, token: &str) {
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(token);
    }

    /// Drop expired sessions, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        let now = SystemTime::now();
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        let before = sessions.len();
        sessions.retain(|_, expires_at| *expires_at > now);
        before - sessions.len()
    }

    /// Whether the request's cookie jar carries a live session
    pub fn is_authenticated(&self, jar: &CookieJar) -> bool {
        jar.get(AUTH_COOKIE)
            .is_some_and(|cookie| self.validate(cookie.value()))
    }
}

/// Authentication state shared by the login handlers and the guard
#[derive(Clone)]
pub struct Auth {
    pub credentials: Arc<AdminCredentials>,
    pub sessions: Arc<SessionStore>,
}

impl Auth {
    pub fn new(credentials: AdminCredentials, sessions: SessionStore) -> Self {
        Self {
            credentials: Arc::new(credentials),
            sessions: Arc::new(sessions),
        }
    }

    fn session_cookie(&self, token: String) -> Cookie<'static> {
        let seconds = self.sessions.ttl().min(MAX_SESSION_TTL).as_secs();
        let max_age = time::Duration::seconds(seconds as i64);
        Cookie::build((AUTH_COOKIE, token))
            .path("/")
            .http_only(true)
            .max_age(max_age)
            .build()
    }
}

/// Login form payload
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub password: String,
}

/// Outcome of a login or logout call
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub success: bool,
    pub message: String,
}

/// Serve the login page
pub async fn serve_login_page() -> Html<&'static str> {
    Html(include_str!("./static/login.html"))
}

/// Handle an administrator login
///
/// On success a session is opened and its token is set as an HttpOnly
/// cookie.
///
/// # Arguments
/// * `auth` - Credentials and session store
/// * `jar` - Cookie jar for storing the session cookie
/// * `body` - JSON body with the submitted password
///
/// # Returns
/// * `Response` - 200 with the cookie, or 401 when the password is wrong
pub async fn handle_login(
    State(auth): State<Auth>,
    jar: CookieJar,
    Json(body): Json<LoginRequest>,
) -> Response {
    if !auth.credentials.verify(&body.password) {
        warn!("rejected administrator login");
        return (
            StatusCode::UNAUTHORIZED,
            Json(AuthResponse {
                success: false,
                message: "Senha inválida".to_string(),
            }),
        )
            .into_response();
    }

    let purged = auth.sessions.purge_expired();
    let token = auth.sessions.create();
    info!("administrator logged in ({} expired sessions purged)", purged);

    (
        jar.add(auth.session_cookie(token)),
        Json(AuthResponse {
            success: true,
            message: "Login realizado com sucesso".to_string(),
        }),
    )
        .into_response()
}

/// Handle logout
///
/// Revokes the session named by the cookie, if any, and clears the cookie.
pub async fn handle_logout(State(auth): State<Auth>, jar: CookieJar) -> (CookieJar, Json<AuthResponse>) {
    if let Some(cookie) = jar.get(AUTH_COOKIE) {
        auth.sessions.revoke(cookie.value());
    }
    let jar = jar.remove(Cookie::build(AUTH_COOKIE).path("/").build());
    (
        jar,
        Json(AuthResponse {
            success: true,
            message: "Sessão encerrada".to_string(),
        }),
    )
}

/// Authentication middleware for admin pages
///
/// Passes the request through when the cookie holds a live session and
/// redirects to the login page otherwise.
///
/// # Arguments
/// * `auth` - Session store to check against
/// * `jar` - Cookie jar containing session information
/// * `request` - The incoming request
/// * `next` - Next middleware in the chain
pub async fn require_admin(
    State(auth): State<Auth>,
    jar: CookieJar,
    request: Request,
    next: Next,
) -> Response {
    if auth.sessions.is_authenticated(&jar) {
        return next.run(request).await;
    }
    Redirect::to("/admin/login").into_response()
}
