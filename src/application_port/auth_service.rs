use crate::domain_model::{ProviderProfile, UserId};
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("token malformed")]
    TokenMalformed,
    #[error("token expired")]
    TokenExpired,
    #[error("token revoked or unknown")]
    TokenRevoked,
    #[error("user not found")]
    UserNotFound,
    #[error("identity already linked")]
    DuplicateIdentity,
    #[error("provider error: {0}")]
    Provider(String),
    #[error("store error: {0}")]
    Store(String),
    #[error("internal error: {0}")]
    InternalError(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct AccessToken(pub String);

#[derive(Debug, Clone, Serialize)]
pub struct RefreshToken(pub String);

#[derive(Debug, Clone, Serialize)]
pub struct AuthTokens {
    pub access_token: AccessToken,
    pub refresh_token: RefreshToken,
    pub access_token_expires_at: DateTime<Utc>,
    pub refresh_token_expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct LoginResult {
    pub user_id: UserId,
    pub tokens: AuthTokens,
}

#[derive(Debug, Clone)]
pub struct TokenVerifyResult {
    pub user_id: UserId,
    pub jti: Option<String>,
}

/// Signs and checks the service's own tokens. Access and refresh tokens are
/// signed under distinct secrets so one class can never stand in for the
/// other.
#[async_trait::async_trait]
pub trait TokenCodec: Send + Sync {
    async fn issue_access_token(
        &self,
        user: UserId,
        jti: Option<String>,
    ) -> Result<(AccessToken, DateTime<Utc>), AuthError>;
    async fn issue_refresh_token(
        &self,
        user: UserId,
        jti: String,
    ) -> Result<(RefreshToken, DateTime<Utc>), AuthError>;
    async fn verify_access_token(
        &self,
        token: &AccessToken,
    ) -> Result<TokenVerifyResult, AuthError>;
    async fn verify_refresh_token(
        &self,
        token: &RefreshToken,
    ) -> Result<TokenVerifyResult, AuthError>;
}

#[async_trait::async_trait]
pub trait AuthService: Send + Sync {
    /// Complete a provider login: resolve the profile to a local user and
    /// issue a fresh access/refresh pair. The refresh record is stored
    /// before the pair is returned.
    async fn login(&self, profile: ProviderProfile) -> Result<LoginResult, AuthError>;
    /// Check an access token and return the user it asserts. Pure signature
    /// and expiry verification, no store round-trip.
    async fn verify_token(&self, token: &str) -> Result<UserId, AuthError>;
    /// Exchange a refresh token for a new pair, rotating the stored record.
    /// A superseded or revoked token fails with `TokenRevoked`.
    async fn refresh_token(&self, refresh_token: &str) -> Result<AuthTokens, AuthError>;
    /// Best-effort session teardown. Never fails: an absent, expired or
    /// garbage token is treated as already logged out.
    async fn logout(&self, access_token: Option<&str>) -> Result<(), AuthError>;
}
