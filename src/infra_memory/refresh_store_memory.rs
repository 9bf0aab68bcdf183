use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::*;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

/// In-process refresh records. The map's shard locks make `consume` an
/// atomic compare-and-delete, which is all the single-use guarantee needs.
pub struct MemoryRefreshStore {
    records: DashMap<UserId, (String, DateTime<Utc>)>,
}

impl MemoryRefreshStore {
    pub fn new() -> Self {
        MemoryRefreshStore {
            records: DashMap::new(),
        }
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }
}

impl Default for MemoryRefreshStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl RefreshStore for MemoryRefreshStore {
    async fn put(
        &self,
        user_id: UserId,
        token_id: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), AuthError> {
        self.records
            .insert(user_id, (token_id.to_string(), expires_at));
        Ok(())
    }

    async fn is_live(&self, user_id: UserId, token_id: &str) -> Result<bool, AuthError> {
        // expiry exactly now counts as dead
        Ok(self
            .records
            .get(&user_id)
            .map(|r| r.0 == token_id && r.1 > Utc::now())
            .unwrap_or(false))
    }

    async fn consume(&self, user_id: UserId, token_id: &str) -> Result<bool, AuthError> {
        let taken = self
            .records
            .remove_if(&user_id, |_, (live_id, expires_at)| {
                live_id == token_id && *expires_at > Utc::now()
            });
        Ok(taken.is_some())
    }

    async fn revoke(&self, user_id: UserId) -> Result<(), AuthError> {
        self.records.remove(&user_id);
        Ok(())
    }
}
