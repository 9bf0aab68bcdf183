use crate::application_port::*;
use crate::domain_model::{ProviderProfile, UserId};
use chrono::{Duration, Utc};

#[derive(Debug)]
pub struct FakeAuthService;

impl FakeAuthService {
    pub fn new() -> Self {
        Self
    }
}

// Minimal fake implementation for basic use only.
// Extend to simulate more error cases and configurable responses when needed.
#[async_trait::async_trait]
impl AuthService for FakeAuthService {
    async fn login(&self, profile: ProviderProfile) -> Result<LoginResult, AuthError> {
        Ok(LoginResult {
            user_id: get_fake_id(&profile.subject),
            tokens: get_fake_tokens(&profile.subject),
        })
    }

    async fn verify_token(&self, token: &str) -> Result<UserId, AuthError> {
        if let Some(subject) = token.strip_prefix("fake-access-token:") {
            Ok(get_fake_id(subject))
        } else {
            Err(AuthError::TokenMalformed)
        }
    }

    async fn refresh_token(&self, refresh_token: &str) -> Result<AuthTokens, AuthError> {
        if let Some(subject) = refresh_token.strip_prefix("fake-refresh-token:") {
            Ok(get_fake_tokens(subject))
        } else {
            Err(AuthError::TokenMalformed)
        }
    }

    async fn logout(&self, _access_token: Option<&str>) -> Result<(), AuthError> {
        Ok(())
    }
}

fn get_fake_id(subject: &str) -> UserId {
    UserId(uuid::Uuid::new_v5(
        &uuid::Uuid::NAMESPACE_OID,
        subject.as_bytes(),
    ))
}

fn get_fake_tokens(subject: &str) -> AuthTokens {
    let now = Utc::now();
    AuthTokens {
        access_token: AccessToken(format!("fake-access-token:{}", subject)),
        access_token_expires_at: now + Duration::minutes(15),
        refresh_token: RefreshToken(format!("fake-refresh-token:{}", subject)),
        refresh_token_expires_at: now + Duration::days(7),
    }
}
