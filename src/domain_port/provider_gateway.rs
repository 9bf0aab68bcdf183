use crate::application_port::*;
use crate::domain_model::*;

/// The identity-provider handshake, kept behind a narrow seam: build the
/// authorize redirect, then turn a returned authorization code into a
/// normalized profile. Everything the protocol involves beyond these two
/// steps (token endpoint, userinfo fetch) is the implementation's business.
#[async_trait::async_trait]
pub trait ProviderGateway: Send + Sync {
    /// Provider name as it appears in login URLs, e.g. "google".
    fn provider(&self) -> &str;

    /// Authorization URL the client is redirected to, carrying our CSRF
    /// state.
    fn authorize_url(&self, state: &str) -> Result<String, AuthError>;

    /// Exchange the callback code for the provider's tokens and fetch the
    /// user's profile.
    async fn exchange_code(&self, code: &str) -> Result<ProviderProfile, AuthError>;
}
