use chrono::{DateTime, Utc};
use gateway::SharedDatabase;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use shared::{
    domain::{SessionStatus, UserId},
    error::{ApiError, ApiResult, ErrorCode},
    model::{AuthUser, UserProfile},
    validation::{normalize_email, validate_password},
};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{info, warn};

mod password;
mod token;

pub use password::{hash_password, verify_password};
pub use token::{
    mint_session_token, verify_session_token, SessionClaims, SessionConfig,
    DEFAULT_SESSION_TTL_SECONDS,
};

pub const AVATAR_COLORS: [&str; 8] = [
    "bg-purple-500",
    "bg-blue-500",
    "bg-green-500",
    "bg-orange-500",
    "bg-red-500",
    "bg-pink-500",
    "bg-indigo-500",
    "bg-teal-500",
];

const FALLBACK_NICKNAME: &str = "User";

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("password hashing failed: {0}")]
    Hash(String),
    #[error("session token rejected: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),
}

impl From<argon2::password_hash::Error> for IdentityError {
    fn from(value: argon2::password_hash::Error) -> Self {
        Self::Hash(value.to_string())
    }
}

impl From<IdentityError> for ApiError {
    fn from(value: IdentityError) -> Self {
        match value {
            IdentityError::Hash(_) => ApiError::internal(value.to_string()),
            IdentityError::Token(_) => ApiError::new(ErrorCode::Unauthorized, value.to_string()),
        }
    }
}

/// The signed-in user as seen by the rest of the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUser {
    pub id: UserId,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub user: SessionUser,
    pub token: String,
    pub expires_at: Option<DateTime<Utc>>,
}

/// A user vouched for by an external provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FederatedIdentity {
    pub subject: String,
    pub email: Option<String>,
    pub name: Option<String>,
}

impl FederatedIdentity {
    /// Display name, else the e-mail local part, else `User`.
    pub fn nickname(&self) -> String {
        if let Some(name) = self.name.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
            return name.to_string();
        }
        self.email
            .as_deref()
            .and_then(|email| email.split('@').next())
            .filter(|local| !local.is_empty())
            .unwrap_or(FALLBACK_NICKNAME)
            .to_string()
    }
}

pub fn random_avatar_color() -> String {
    AVATAR_COLORS
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(AVATAR_COLORS[0])
        .to_string()
}

pub fn new_profile(user_id: &UserId, email: &str, nickname: &str) -> UserProfile {
    UserProfile {
        user_id: user_id.clone(),
        email: email.to_string(),
        nickname: nickname.to_string(),
        avatar_color: random_avatar_color(),
        photo_url: None,
        created_at: Utc::now(),
        updated_at: None,
    }
}

struct SessionState {
    status: SessionStatus,
    session: Option<Session>,
}

pub struct IdentityService {
    db: SharedDatabase,
    config: SessionConfig,
    state: RwLock<SessionState>,
}

impl IdentityService {
    pub fn new(db: SharedDatabase, config: SessionConfig) -> Self {
        Self {
            db,
            config,
            state: RwLock::new(SessionState {
                status: SessionStatus::Unauthenticated,
                session: None,
            }),
        }
    }

    pub async fn register(&self, name: &str, email: &str, password: &str) -> ApiResult<SessionUser> {
        let name = name.trim();
        if name.is_empty() || email.trim().is_empty() || password.is_empty() {
            return Err(ApiError::validation("All fields are required"));
        }
        validate_password(password)?;

        let email = normalize_email(email);
        if self.db.auth_user_by_email(&email).await?.is_some() {
            return Err(ApiError::new(ErrorCode::Conflict, "Email already registered"));
        }

        let password_hash = hash_password(password).map_err(IdentityError::from)?;
        let user = AuthUser {
            id: UserId::generate(),
            email: email.clone(),
            password_hash,
            created_at: Utc::now(),
            last_login: None,
        };
        self.db.create_auth_user(&user).await?;
        if let Err(error) = self
            .db
            .create_profile(&new_profile(&user.id, &email, name))
            .await
        {
            warn!(user_id = %user.id, %error, "profile setup failed; account kept");
        }

        info!(user_id = %user.id, "user registered");
        Ok(SessionUser { id: user.id, email })
    }

    pub async fn sign_in_with_credentials(&self, email: &str, password: &str) -> ApiResult<Session> {
        self.begin_sign_in().await;
        let outcome = self.check_credentials(email, password).await;
        self.finish_sign_in(outcome).await
    }

    async fn check_credentials(&self, email: &str, password: &str) -> ApiResult<Session> {
        let invalid = || ApiError::new(ErrorCode::Unauthorized, "Invalid email or password");
        let email = normalize_email(email);
        let Some(user) = self.db.auth_user_by_email(&email).await? else {
            return Err(invalid());
        };
        if !verify_password(password, &user.password_hash) {
            return Err(invalid());
        }
        self.db.record_login(&user.id, Utc::now()).await?;
        self.issue_session(&user.id, &user.email)
    }

    pub async fn sign_in_federated(&self, identity: &FederatedIdentity) -> ApiResult<Session> {
        self.begin_sign_in().await;
        let user_id = UserId::new(identity.subject.clone());
        let email = identity
            .email
            .as_deref()
            .map(normalize_email)
            .unwrap_or_default();

        if let Err(error) = self.ensure_federated_profile(&user_id, &email, identity).await {
            warn!(%user_id, %error, "federated profile setup failed; continuing sign-in");
        }

        let outcome = self.issue_session(&user_id, &email);
        self.finish_sign_in(outcome).await
    }

    async fn ensure_federated_profile(
        &self,
        user_id: &UserId,
        email: &str,
        identity: &FederatedIdentity,
    ) -> ApiResult<()> {
        if self.db.get_profile(user_id).await?.is_some() {
            return Ok(());
        }
        self.db
            .create_profile(&new_profile(user_id, email, &identity.nickname()))
            .await
    }

    /// Re-establishes a session from a previously issued token.
    pub async fn resume(&self, token: &str) -> ApiResult<Session> {
        let claims = self.verify_token(token)?;
        let session = Session {
            user: SessionUser {
                id: claims.user_id(),
                email: claims.email.clone(),
            },
            token: token.to_string(),
            expires_at: claims.expires_at(),
        };
        let mut state = self.state.write().await;
        state.status = SessionStatus::Authenticated;
        state.session = Some(session.clone());
        Ok(session)
    }

    pub fn verify_token(&self, token: &str) -> ApiResult<SessionClaims> {
        Ok(verify_session_token(&self.config, token).map_err(IdentityError::from)?)
    }

    pub async fn status(&self) -> SessionStatus {
        self.state.read().await.status
    }

    pub async fn current_user(&self) -> Option<SessionUser> {
        self.state
            .read()
            .await
            .session
            .as_ref()
            .map(|session| session.user.clone())
    }

    pub async fn current_session(&self) -> Option<Session> {
        self.state.read().await.session.clone()
    }

    pub async fn sign_out(&self) {
        let mut state = self.state.write().await;
        if let Some(session) = state.session.take() {
            info!(user_id = %session.user.id, "signed out");
        }
        state.status = SessionStatus::Unauthenticated;
    }

    fn issue_session(&self, user_id: &UserId, email: &str) -> ApiResult<Session> {
        let (token, claims) =
            mint_session_token(&self.config, user_id, email).map_err(IdentityError::from)?;
        Ok(Session {
            user: SessionUser {
                id: user_id.clone(),
                email: email.to_string(),
            },
            token,
            expires_at: claims.expires_at(),
        })
    }

    async fn begin_sign_in(&self) {
        self.state.write().await.status = SessionStatus::Loading;
    }

    async fn finish_sign_in(&self, outcome: ApiResult<Session>) -> ApiResult<Session> {
        let mut state = self.state.write().await;
        match &outcome {
            Ok(session) => {
                info!(user_id = %session.user.id, "signed in");
                state.status = SessionStatus::Authenticated;
                state.session = Some(session.clone());
            }
            Err(error) => {
                warn!(%error, "sign-in failed");
                state.status = SessionStatus::Unauthenticated;
                state.session = None;
            }
        }
        outcome
    }
}

#[cfg(test)]
#[path = "tests/service_tests.rs"]
mod tests;
