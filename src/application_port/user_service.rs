use crate::application_port::AuthError;
use crate::domain_model::UserId;
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct UserProfile {
    pub user_id: UserId,
    pub email: String,
    pub name: String,
    pub first_name: String,
    pub last_name: String,
    pub nickname: String,
    pub description: String,
    pub avatar_url: String,
    pub location: String,
    pub created_at: DateTime<Utc>,
}

#[async_trait::async_trait]
pub trait UserService: Send + Sync {
    async fn get_profile(&self, user_id: UserId) -> Result<UserProfile, AuthError>;
}
