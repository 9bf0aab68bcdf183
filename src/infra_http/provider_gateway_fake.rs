use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::*;

/// Loopback gateway: the "authorize URL" points straight back at our own
/// callback, and the code encodes the subject it will resolve to.
// Minimal fake implementation for basic use only.
// Extend to simulate more error cases and configurable responses when needed.
pub struct FakeProviderGateway {
    redirect_url: String,
}

impl FakeProviderGateway {
    pub fn new(redirect_url: String) -> Self {
        FakeProviderGateway { redirect_url }
    }
}

#[async_trait::async_trait]
impl ProviderGateway for FakeProviderGateway {
    fn provider(&self) -> &str {
        "google"
    }

    fn authorize_url(&self, state: &str) -> Result<String, AuthError> {
        Ok(format!(
            "{}?code=fake-code:{}&state={}",
            self.redirect_url, state, state
        ))
    }

    async fn exchange_code(&self, code: &str) -> Result<ProviderProfile, AuthError> {
        let Some(subject) = code.strip_prefix("fake-code:") else {
            return Err(AuthError::Provider("unknown code".to_string()));
        };

        Ok(ProviderProfile {
            provider: self.provider().to_string(),
            subject: subject.to_string(),
            email: format!("{}@example.com", subject),
            name: format!("Fake {}", subject),
            first_name: "Fake".to_string(),
            last_name: subject.to_string(),
            nickname: String::new(),
            description: String::new(),
            avatar_url: String::new(),
            location: String::new(),
            tokens: ProviderTokens::default(),
        })
    }
}
