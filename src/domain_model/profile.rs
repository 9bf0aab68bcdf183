use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Normalized profile delivered by an identity provider after a completed
/// authorization. The subject is the provider's stable id for the user;
/// everything else is display data the provider is authoritative for.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderProfile {
    pub provider: String,
    pub subject: String,
    pub email: String,
    pub name: String,
    pub first_name: String,
    pub last_name: String,
    pub nickname: String,
    pub description: String,
    pub avatar_url: String,
    pub location: String,
    pub tokens: ProviderTokens,
}

/// The provider's own credentials for this grant. Stored on the identity
/// row for audit only; nothing in this service reads them back.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderTokens {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub id_token: Option<String>,
}
