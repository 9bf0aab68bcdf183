use super::util::{downcast, is_dup_key};
use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::*;
use chrono::{DateTime, Utc};
use sqlx::mysql::MySqlRow;
use sqlx::{MySqlPool, Row};

pub struct MySqlIdentityRepo {
    pool: MySqlPool,
}

impl MySqlIdentityRepo {
    pub fn new(pool: MySqlPool) -> Self {
        MySqlIdentityRepo { pool }
    }

    fn row_to_record(row: MySqlRow) -> Result<UserRecord, AuthError> {
        let user_id: UserId = row
            .try_get("user_id")
            .map_err(|e| AuthError::Store(e.to_string()))?;
        let email: String = row
            .try_get("email")
            .map_err(|e| AuthError::Store(e.to_string()))?;
        let name: String = row
            .try_get("name")
            .map_err(|e| AuthError::Store(e.to_string()))?;
        let first_name: String = row
            .try_get("first_name")
            .map_err(|e| AuthError::Store(e.to_string()))?;
        let last_name: String = row
            .try_get("last_name")
            .map_err(|e| AuthError::Store(e.to_string()))?;
        let nickname: String = row
            .try_get("nickname")
            .map_err(|e| AuthError::Store(e.to_string()))?;
        let description: String = row
            .try_get("description")
            .map_err(|e| AuthError::Store(e.to_string()))?;
        let avatar_url: String = row
            .try_get("avatar_url")
            .map_err(|e| AuthError::Store(e.to_string()))?;
        let location: String = row
            .try_get("location")
            .map_err(|e| AuthError::Store(e.to_string()))?;
        let created_at: DateTime<Utc> = row
            .try_get("created_at")
            .map_err(|e| AuthError::Store(e.to_string()))?;

        Ok(UserRecord {
            user_id,
            email,
            name,
            first_name,
            last_name,
            nickname,
            description,
            avatar_url,
            location,
            created_at,
        })
    }
}

#[async_trait::async_trait]
impl IdentityRepo for MySqlIdentityRepo {
    async fn find_user_by_identity(
        &self,
        provider: &str,
        subject: &str,
    ) -> Result<Option<UserId>, AuthError> {
        let row_opt = sqlx::query(
            r#"
SELECT user_id FROM provider_identity
WHERE provider = ? AND subject = ?
"#,
        )
        .bind(provider)
        .bind(subject)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AuthError::Store(e.to_string()))?;

        row_opt
            .map(|row| {
                row.try_get::<UserId, _>("user_id")
                    .map_err(|e| AuthError::Store(e.to_string()))
            })
            .transpose()
    }

    async fn create_user_in_tx<'t>(
        &self,
        tx: &mut dyn StorageTx<'t>,
        user_id: UserId,
        profile: &ProviderProfile,
    ) -> Result<(), AuthError> {
        let tx = downcast(tx);

        sqlx::query(
            r#"
INSERT INTO user (user_id, email, name, first_name, last_name, nickname, description, avatar_url, location)
VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
"#,
        )
        .bind(user_id)
        .bind(&profile.email)
        .bind(&profile.name)
        .bind(&profile.first_name)
        .bind(&profile.last_name)
        .bind(&profile.nickname)
        .bind(&profile.description)
        .bind(&profile.avatar_url)
        .bind(&profile.location)
        .execute(tx.conn())
        .await
        .map_err(|e| {
            // email collision behaves like the identity race: re-read wins
            if is_dup_key(&e) {
                AuthError::DuplicateIdentity
            } else {
                AuthError::Store(e.to_string())
            }
        })?;

        Ok(())
    }

    async fn link_identity_in_tx<'t>(
        &self,
        tx: &mut dyn StorageTx<'t>,
        user_id: UserId,
        profile: &ProviderProfile,
    ) -> Result<(), AuthError> {
        let tx = downcast(tx);

        sqlx::query(
            r#"
INSERT INTO provider_identity (provider, subject, user_id, provider_access_token, provider_refresh_token, provider_expires_at, id_token)
VALUES (?, ?, ?, ?, ?, ?, ?)
"#,
        )
        .bind(&profile.provider)
        .bind(&profile.subject)
        .bind(user_id)
        .bind(&profile.tokens.access_token)
        .bind(&profile.tokens.refresh_token)
        .bind(profile.tokens.expires_at)
        .bind(&profile.tokens.id_token)
        .execute(tx.conn())
        .await
        .map_err(|e| {
            if is_dup_key(&e) {
                AuthError::DuplicateIdentity
            } else {
                AuthError::Store(e.to_string())
            }
        })?;

        Ok(())
    }

    async fn update_profile(
        &self,
        user_id: UserId,
        profile: &ProviderProfile,
    ) -> Result<(), AuthError> {
        sqlx::query(
            r#"
UPDATE user
SET email = ?, name = ?, first_name = ?, last_name = ?, nickname = ?, description = ?, avatar_url = ?, location = ?
WHERE user_id = ?
"#,
        )
        .bind(&profile.email)
        .bind(&profile.name)
        .bind(&profile.first_name)
        .bind(&profile.last_name)
        .bind(&profile.nickname)
        .bind(&profile.description)
        .bind(&profile.avatar_url)
        .bind(&profile.location)
        .bind(user_id)
        .execute(&self.pool)
        .await
        .map_err(|e| AuthError::Store(e.to_string()))?;

        sqlx::query(
            r#"
UPDATE provider_identity
SET provider_access_token = ?, provider_refresh_token = ?, provider_expires_at = ?, id_token = ?
WHERE provider = ? AND subject = ?
"#,
        )
        .bind(&profile.tokens.access_token)
        .bind(&profile.tokens.refresh_token)
        .bind(profile.tokens.expires_at)
        .bind(&profile.tokens.id_token)
        .bind(&profile.provider)
        .bind(&profile.subject)
        .execute(&self.pool)
        .await
        .map_err(|e| AuthError::Store(e.to_string()))?;

        Ok(())
    }

    async fn get_user(&self, user_id: UserId) -> Result<Option<UserRecord>, AuthError> {
        let row_opt = sqlx::query(
            r#"
SELECT user_id, email, name, first_name, last_name, nickname, description, avatar_url, location, created_at
FROM user
WHERE user_id = ?
"#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AuthError::Store(e.to_string()))?;

        row_opt.map(Self::row_to_record).transpose()
    }
}
