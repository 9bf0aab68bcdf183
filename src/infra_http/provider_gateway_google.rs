use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::*;
use chrono::{Duration, Utc};
use serde::Deserialize;

const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const GOOGLE_USERINFO_URL: &str = "https://openidconnect.googleapis.com/v1/userinfo";
const GOOGLE_SCOPES: &str = "openid email profile";

pub struct GoogleProviderGateway {
    http: reqwest::Client,
    client_id: String,
    client_secret: String,
    redirect_url: String,
}

/// Token endpoint response for the authorization-code grant.
#[derive(Debug, Deserialize)]
struct TokenGrant {
    access_token: String,
    expires_in: Option<i64>,
    refresh_token: Option<String>,
    id_token: Option<String>,
}

/// OpenID Connect userinfo document. Only `sub` is guaranteed.
#[derive(Debug, Deserialize)]
struct UserInfo {
    sub: String,
    email: Option<String>,
    name: Option<String>,
    given_name: Option<String>,
    family_name: Option<String>,
    picture: Option<String>,
    locale: Option<String>,
}

impl GoogleProviderGateway {
    pub fn new(client_id: String, client_secret: String, redirect_url: String) -> Self {
        GoogleProviderGateway {
            http: reqwest::Client::new(),
            client_id,
            client_secret,
            redirect_url,
        }
    }
}

#[async_trait::async_trait]
impl ProviderGateway for GoogleProviderGateway {
    fn provider(&self) -> &str {
        "google"
    }

    fn authorize_url(&self, state: &str) -> Result<String, AuthError> {
        let url = reqwest::Url::parse_with_params(
            GOOGLE_AUTH_URL,
            &[
                ("client_id", self.client_id.as_str()),
                ("redirect_uri", self.redirect_url.as_str()),
                ("response_type", "code"),
                ("scope", GOOGLE_SCOPES),
                ("state", state),
            ],
        )
        .map_err(|e| AuthError::InternalError(e.to_string()))?;
        Ok(url.to_string())
    }

    async fn exchange_code(&self, code: &str) -> Result<ProviderProfile, AuthError> {
        let response = self
            .http
            .post(GOOGLE_TOKEN_URL)
            .form(&[
                ("code", code),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("redirect_uri", self.redirect_url.as_str()),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await
            .map_err(|e| AuthError::Provider(e.to_string()))?;
        if !response.status().is_success() {
            return Err(AuthError::Provider(format!(
                "token endpoint returned {}",
                response.status()
            )));
        }
        let grant: TokenGrant = response
            .json()
            .await
            .map_err(|e| AuthError::Provider(e.to_string()))?;

        let response = self
            .http
            .get(GOOGLE_USERINFO_URL)
            .bearer_auth(&grant.access_token)
            .send()
            .await
            .map_err(|e| AuthError::Provider(e.to_string()))?;
        if !response.status().is_success() {
            return Err(AuthError::Provider(format!(
                "userinfo endpoint returned {}",
                response.status()
            )));
        }
        let info: UserInfo = response
            .json()
            .await
            .map_err(|e| AuthError::Provider(e.to_string()))?;

        Ok(ProviderProfile {
            provider: self.provider().to_string(),
            subject: info.sub,
            email: info.email.unwrap_or_default(),
            name: info.name.unwrap_or_default(),
            first_name: info.given_name.unwrap_or_default(),
            last_name: info.family_name.unwrap_or_default(),
            nickname: String::new(),
            description: String::new(),
            avatar_url: info.picture.unwrap_or_default(),
            location: info.locale.unwrap_or_default(),
            tokens: ProviderTokens {
                access_token: grant.access_token,
                refresh_token: grant.refresh_token,
                expires_at: grant.expires_in.map(|secs| Utc::now() + Duration::seconds(secs)),
                id_token: grant.id_token,
            },
        })
    }
}
