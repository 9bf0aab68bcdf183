use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::repo_tx::StorageTx;
use chrono::{DateTime, Utc};

#[derive(Debug, Clone)]
pub struct UserRecord {
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

/// Users and their provider identities. A (provider, subject) pair is unique
/// and links to exactly one user; the backing store enforces the constraint.
#[async_trait::async_trait]
pub trait IdentityRepo: Send + Sync {
    async fn find_user_by_identity(
        &self,
        provider: &str,
        subject: &str,
    ) -> Result<Option<UserId>, AuthError>;

    async fn create_user_in_tx<'t>(
        &self,
        tx: &mut dyn StorageTx<'t>,
        user_id: UserId,
        profile: &ProviderProfile,
    ) -> Result<(), AuthError>;

    /// Insert the (provider, subject) -> user link. A concurrent first login
    /// for the same subject loses the unique-constraint race and gets
    /// `AuthError::DuplicateIdentity`.
    async fn link_identity_in_tx<'t>(
        &self,
        tx: &mut dyn StorageTx<'t>,
        user_id: UserId,
        profile: &ProviderProfile,
    ) -> Result<(), AuthError>;

    /// Overwrite the user's profile fields and the identity's provider token
    /// audit columns. Last write wins; the provider is authoritative.
    async fn update_profile(
        &self,
        user_id: UserId,
        profile: &ProviderProfile,
    ) -> Result<(), AuthError>;

    async fn get_user(&self, user_id: UserId) -> Result<Option<UserRecord>, AuthError>;
}
