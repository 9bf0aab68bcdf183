use crate::application_port::{AuthError, UserProfile, UserService};
use crate::domain_model::UserId;
use crate::domain_port::IdentityRepo;
use std::sync::Arc;

pub struct RealUserService {
    identity_repo: Arc<dyn IdentityRepo>,
}

impl RealUserService {
    pub fn new(identity_repo: Arc<dyn IdentityRepo>) -> RealUserService {
        RealUserService { identity_repo }
    }
}

#[async_trait::async_trait]
impl UserService for RealUserService {
    async fn get_profile(&self, user_id: UserId) -> Result<UserProfile, AuthError> {
        let record = self
            .identity_repo
            .get_user(user_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        Ok(UserProfile {
            user_id: record.user_id,
            email: record.email,
            name: record.name,
            first_name: record.first_name,
            last_name: record.last_name,
            nickname: record.nickname,
            description: record.description,
            avatar_url: record.avatar_url,
            location: record.location,
            created_at: record.created_at,
        })
    }
}
