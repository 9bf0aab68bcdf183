use crate::application_port::*;
use crate::domain_model::*;
use chrono::{DateTime, Utc};

/// The live refresh record per user: at most one token id is valid at any
/// time. `put` is the rotation primitive (it replaces whatever was there);
/// `revoke` and expiry both make the record non-live.
#[async_trait::async_trait]
pub trait RefreshStore: Send + Sync {
    /// Upsert the user's record, replacing any prior token id.
    async fn put(
        &self,
        user_id: UserId,
        token_id: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), AuthError>;

    /// Whether the presented token id is the user's current live one.
    /// No record for the user is `false`, not an error.
    async fn is_live(&self, user_id: UserId, token_id: &str) -> Result<bool, AuthError>;

    /// Atomically take the record if (and only if) the presented token id is
    /// the live one. Of two concurrent calls with the same stale id exactly
    /// one observes `true`; refresh tokens are single-use through this.
    async fn consume(&self, user_id: UserId, token_id: &str) -> Result<bool, AuthError>;

    /// Drop the user's record unconditionally.
    async fn revoke(&self, user_id: UserId) -> Result<(), AuthError>;
}
