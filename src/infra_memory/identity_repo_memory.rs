use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::*;
use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

pub struct MemoryIdentityRepo {
    identities: DashMap<(String, String), UserId>,
    users: DashMap<UserId, UserRecord>,
}

impl MemoryIdentityRepo {
    pub fn new() -> Self {
        MemoryIdentityRepo {
            identities: DashMap::new(),
            users: DashMap::new(),
        }
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    fn record_from(user_id: UserId, profile: &ProviderProfile) -> UserRecord {
        UserRecord {
            user_id,
            email: profile.email.clone(),
            name: profile.name.clone(),
            first_name: profile.first_name.clone(),
            last_name: profile.last_name.clone(),
            nickname: profile.nickname.clone(),
            description: profile.description.clone(),
            avatar_url: profile.avatar_url.clone(),
            location: profile.location.clone(),
            created_at: Utc::now(),
        }
    }
}

impl Default for MemoryIdentityRepo {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl IdentityRepo for MemoryIdentityRepo {
    async fn find_user_by_identity(
        &self,
        provider: &str,
        subject: &str,
    ) -> Result<Option<UserId>, AuthError> {
        Ok(self
            .identities
            .get(&(provider.to_string(), subject.to_string()))
            .map(|entry| *entry))
    }

    async fn create_user_in_tx<'t>(
        &self,
        _tx: &mut dyn StorageTx<'t>,
        user_id: UserId,
        profile: &ProviderProfile,
    ) -> Result<(), AuthError> {
        self.users.insert(user_id, Self::record_from(user_id, profile));
        Ok(())
    }

    async fn link_identity_in_tx<'t>(
        &self,
        _tx: &mut dyn StorageTx<'t>,
        user_id: UserId,
        profile: &ProviderProfile,
    ) -> Result<(), AuthError> {
        let key = (profile.provider.clone(), profile.subject.clone());
        match self.identities.entry(key) {
            Entry::Occupied(_) => {
                // conflict loser: drop the provisional user row; the sql
                // backend gets the same effect from its tx rollback
                self.users.remove(&user_id);
                Err(AuthError::DuplicateIdentity)
            }
            Entry::Vacant(vacant) => {
                vacant.insert(user_id);
                Ok(())
            }
        }
    }

    async fn update_profile(
        &self,
        user_id: UserId,
        profile: &ProviderProfile,
    ) -> Result<(), AuthError> {
        let Some(mut record) = self.users.get_mut(&user_id) else {
            return Err(AuthError::UserNotFound);
        };
        record.email = profile.email.clone();
        record.name = profile.name.clone();
        record.first_name = profile.first_name.clone();
        record.last_name = profile.last_name.clone();
        record.nickname = profile.nickname.clone();
        record.description = profile.description.clone();
        record.avatar_url = profile.avatar_url.clone();
        record.location = profile.location.clone();
        Ok(())
    }

    async fn get_user(&self, user_id: UserId) -> Result<Option<UserRecord>, AuthError> {
        Ok(self.users.get(&user_id).map(|entry| entry.value().clone()))
    }
}
