use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::*;
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};

const REFRESH_CONSUME: &str = include_str!("refresh_consume.lua");

/// One key per user, value = the live token id, lifetime = the record's
/// expiry. Rotation is a plain SET (replace); the single-use check runs as a
/// server-side script so concurrent refreshes against the same stale id
/// cannot both win.
pub struct RedisRefreshStore {
    conn: ConnectionManager,
    prefix: String,
}

impl RedisRefreshStore {
    pub fn new(conn: ConnectionManager, prefix: impl Into<String>) -> Self {
        RedisRefreshStore {
            conn,
            prefix: prefix.into(),
        }
    }

    fn key(&self, user_id: UserId) -> String {
        format!("{}:{}", self.prefix, user_id)
    }

    fn ttl_secs(until: DateTime<Utc>) -> u64 {
        let secs = (until - Utc::now()).num_seconds();
        if secs <= 0 { 1 } else { secs as u64 }
    }
}

#[async_trait::async_trait]
impl RefreshStore for RedisRefreshStore {
    async fn put(
        &self,
        user_id: UserId,
        token_id: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), AuthError> {
        let key = self.key(user_id);
        let mut conn = self.conn.clone();
        let _: () = conn
            .set_ex(&key, token_id, Self::ttl_secs(expires_at))
            .await
            .map_err(|e| AuthError::Store(e.to_string()))?;
        Ok(())
    }

    async fn is_live(&self, user_id: UserId, token_id: &str) -> Result<bool, AuthError> {
        let key = self.key(user_id);
        let mut conn = self.conn.clone();
        let live: Option<String> = conn
            .get(&key)
            .await
            .map_err(|e| AuthError::Store(e.to_string()))?;
        Ok(live.as_deref() == Some(token_id))
    }

    async fn consume(&self, user_id: UserId, token_id: &str) -> Result<bool, AuthError> {
        let key = self.key(user_id);
        let mut conn = self.conn.clone();
        let taken: i64 = Script::new(REFRESH_CONSUME)
            .key(&key)
            .arg(token_id)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| AuthError::Store(e.to_string()))?;
        Ok(taken == 1)
    }

    async fn revoke(&self, user_id: UserId) -> Result<(), AuthError> {
        let key = self.key(user_id);
        let mut conn = self.conn.clone();
        let _: () = conn
            .del(&key)
            .await
            .map_err(|e| AuthError::Store(e.to_string()))?;
        Ok(())
    }
}
