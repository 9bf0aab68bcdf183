use crate::application_port::{
    AccessToken, AuthError, AuthService, AuthTokens, LoginResult, RefreshToken, TokenCodec,
    TokenVerifyResult,
};
use crate::domain_model::{ProviderProfile, UserId};
use crate::domain_port::{IdentityRepo, RefreshStore, TxManager};
use crate::logger::*;
use chrono::{DateTime, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub issuer: String,
    pub audience: String,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
    /// Distinct per token class: a leaked access secret must not let anyone
    /// mint refresh tokens, and vice versa.
    pub access_key: Vec<u8>,
    pub refresh_key: Vec<u8>,
}

#[derive(Debug, Serialize, Deserialize)]
struct AccessClaims {
    sub: String, // user id as string
    exp: i64,
    iat: i64,
    iss: String,
    aud: String,
    jti: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct RefreshClaims {
    sub: String, // user id as string
    exp: i64,
    iat: i64,
    iss: String,
    aud: String,
    jti: String, // must match the live refresh record
}

fn encode_access(
    uid: UserId,
    jti: String,
    cfg: &JwtConfig,
) -> Result<(String, DateTime<Utc>), AuthError> {
    let iat_dt = Utc::now();
    let exp_dt = iat_dt + cfg.access_ttl;
    let claims = AccessClaims {
        sub: uid.0.to_string(),
        exp: exp_dt.timestamp(),
        iat: iat_dt.timestamp(),
        iss: cfg.issuer.clone(),
        aud: cfg.audience.clone(),
        jti,
    };
    let token = encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(&cfg.access_key),
    )
    .map_err(|e| AuthError::InternalError(e.to_string()))?;
    Ok((token, exp_dt))
}

fn encode_refresh(
    uid: UserId,
    jti: String,
    cfg: &JwtConfig,
) -> Result<(String, DateTime<Utc>), AuthError> {
    let iat_dt = Utc::now();
    let exp_dt = iat_dt + cfg.refresh_ttl;
    let claims = RefreshClaims {
        sub: uid.0.to_string(),
        exp: exp_dt.timestamp(),
        iat: iat_dt.timestamp(),
        iss: cfg.issuer.clone(),
        aud: cfg.audience.clone(),
        jti,
    };
    let token = encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(&cfg.refresh_key),
    )
    .map_err(|e| AuthError::InternalError(e.to_string()))?;
    Ok((token, exp_dt))
}

fn validation(cfg: &JwtConfig) -> Validation {
    let mut v = Validation::new(Algorithm::HS256);
    v.validate_exp = true;
    v.leeway = 0;
    v.set_audience(&[cfg.audience.clone()]);
    v.set_issuer(&[cfg.issuer.clone()]);
    v
}

fn decode_access(token: &str, cfg: &JwtConfig) -> Result<AccessClaims, AuthError> {
    let data = decode::<AccessClaims>(
        token,
        &DecodingKey::from_secret(&cfg.access_key),
        &validation(cfg),
    )
    .map_err(|e| match e.kind() {
        ErrorKind::ExpiredSignature => AuthError::TokenExpired,
        _ => AuthError::TokenMalformed,
    })?;
    // exp == now is already expired; the library only rejects exp < now
    if data.claims.exp <= Utc::now().timestamp() {
        return Err(AuthError::TokenExpired);
    }
    Ok(data.claims)
}

fn decode_refresh(token: &str, cfg: &JwtConfig) -> Result<RefreshClaims, AuthError> {
    let data = decode::<RefreshClaims>(
        token,
        &DecodingKey::from_secret(&cfg.refresh_key),
        &validation(cfg),
    )
    .map_err(|e| match e.kind() {
        ErrorKind::ExpiredSignature => AuthError::TokenExpired,
        _ => AuthError::TokenMalformed,
    })?;
    if data.claims.exp <= Utc::now().timestamp() {
        return Err(AuthError::TokenExpired);
    }
    Ok(data.claims)
}

pub struct JwtHs256Codec {
    cfg: JwtConfig,
}

impl JwtHs256Codec {
    pub fn new(cfg: JwtConfig) -> Self {
        JwtHs256Codec { cfg }
    }

    #[inline]
    fn gen_jti() -> String {
        Uuid::new_v4().to_string()
    }

    #[inline]
    fn parse_user_id(sub: &str) -> Result<UserId, AuthError> {
        let id = sub.parse::<UserId>().map_err(|_| AuthError::TokenMalformed)?;
        Ok(id)
    }
}

#[async_trait::async_trait]
impl TokenCodec for JwtHs256Codec {
    async fn issue_access_token(
        &self,
        user: UserId,
        jti: Option<String>,
    ) -> Result<(AccessToken, DateTime<Utc>), AuthError> {
        let jti = jti.unwrap_or_else(Self::gen_jti);
        let (token, exp_dt) = encode_access(user, jti, &self.cfg)?;
        Ok((AccessToken(token), exp_dt))
    }

    async fn issue_refresh_token(
        &self,
        user: UserId,
        jti: String,
    ) -> Result<(RefreshToken, DateTime<Utc>), AuthError> {
        let (token, exp_dt) = encode_refresh(user, jti, &self.cfg)?;
        Ok((RefreshToken(token), exp_dt))
    }

    async fn verify_access_token(
        &self,
        token: &AccessToken,
    ) -> Result<TokenVerifyResult, AuthError> {
        let claims = decode_access(&token.0, &self.cfg)?;
        let user_id = Self::parse_user_id(&claims.sub)?;
        Ok(TokenVerifyResult {
            user_id,
            jti: Some(claims.jti),
        })
    }

    async fn verify_refresh_token(
        &self,
        token: &RefreshToken,
    ) -> Result<TokenVerifyResult, AuthError> {
        let claims = decode_refresh(&token.0, &self.cfg)?;
        let user_id = Self::parse_user_id(&claims.sub)?;
        Ok(TokenVerifyResult {
            user_id,
            jti: Some(claims.jti),
        })
    }
}

pub struct RealAuthService {
    identity_repo: Arc<dyn IdentityRepo>,
    refresh_store: Arc<dyn RefreshStore>,
    token_codec: Arc<dyn TokenCodec>,
    tx_manager: Arc<dyn TxManager>,
}

impl RealAuthService {
    pub fn new(
        identity_repo: Arc<dyn IdentityRepo>,
        refresh_store: Arc<dyn RefreshStore>,
        token_codec: Arc<dyn TokenCodec>,
        tx_manager: Arc<dyn TxManager>,
    ) -> Self {
        Self {
            identity_repo,
            refresh_store,
            token_codec,
            tx_manager,
        }
    }

    #[inline]
    fn new_user_id() -> UserId {
        UserId(Uuid::new_v4())
    }

    #[inline]
    fn new_jti() -> String {
        Uuid::new_v4().to_string()
    }

    /// Find-or-create the local user for a provider profile. One logical
    /// transaction: a concurrent duplicate callback for the same subject
    /// must not create two users.
    async fn resolve(&self, profile: &ProviderProfile) -> Result<UserId, AuthError> {
        if let Some(user_id) = self
            .identity_repo
            .find_user_by_identity(&profile.provider, &profile.subject)
            .await?
        {
            self.identity_repo.update_profile(user_id, profile).await?;
            return Ok(user_id);
        }

        let mut tx = self
            .tx_manager
            .begin()
            .await
            .map_err(|e| AuthError::Store(e.to_string()))?;
        let user_id = Self::new_user_id();

        let linked = match self
            .identity_repo
            .create_user_in_tx(tx.as_mut(), user_id, profile)
            .await
        {
            Ok(()) => {
                self.identity_repo
                    .link_identity_in_tx(tx.as_mut(), user_id, profile)
                    .await
            }
            Err(e) => Err(e),
        };

        match linked {
            Ok(()) => {
                tx.commit()
                    .await
                    .map_err(|e| AuthError::Store(e.to_string()))?;
                Ok(user_id)
            }
            Err(AuthError::DuplicateIdentity) => {
                // Lost the first-login race; the winner's link is committed.
                // Re-read once instead of failing a legitimate login.
                drop(tx);
                match self
                    .identity_repo
                    .find_user_by_identity(&profile.provider, &profile.subject)
                    .await?
                {
                    Some(winner) => Ok(winner),
                    None => Err(AuthError::Store(
                        "identity missing after duplicate-key conflict".to_string(),
                    )),
                }
            }
            Err(e) => Err(e),
        }
    }

    async fn issue_pair(&self, user_id: UserId) -> Result<AuthTokens, AuthError> {
        let jti = Self::new_jti();

        let (access_token, access_exp) = self
            .token_codec
            .issue_access_token(user_id, Some(jti.clone()))
            .await?;
        let (refresh_token, refresh_exp) = self
            .token_codec
            .issue_refresh_token(user_id, jti.clone())
            .await?;

        // If this write fails the pair is discarded: a token the store
        // cannot validate later must never reach the client.
        self.refresh_store.put(user_id, &jti, refresh_exp).await?;

        Ok(AuthTokens {
            access_token,
            refresh_token,
            access_token_expires_at: access_exp,
            refresh_token_expires_at: refresh_exp,
        })
    }
}

#[async_trait::async_trait]
impl AuthService for RealAuthService {
    async fn login(&self, profile: ProviderProfile) -> Result<LoginResult, AuthError> {
        if profile.subject.is_empty() {
            return Err(AuthError::Provider("empty subject id".to_string()));
        }

        let user_id = self.resolve(&profile).await?;
        let tokens = self.issue_pair(user_id).await?;

        Ok(LoginResult { user_id, tokens })
    }

    async fn verify_token(&self, token: &str) -> Result<UserId, AuthError> {
        let verify_result = self
            .token_codec
            .verify_access_token(&AccessToken(token.to_string()))
            .await?;

        Ok(verify_result.user_id)
    }

    async fn refresh_token(&self, refresh_token: &str) -> Result<AuthTokens, AuthError> {
        let verify_result = self
            .token_codec
            .verify_refresh_token(&RefreshToken(refresh_token.to_string()))
            .await?;

        let user_id = verify_result.user_id;
        let jti = verify_result.jti.ok_or(AuthError::TokenMalformed)?;

        if !self.refresh_store.is_live(user_id, &jti).await? {
            return Err(AuthError::TokenRevoked);
        }

        // Rotation: exactly one concurrent presenter of this jti gets past
        // the consume; everyone else sees a revoked token even if they
        // passed the liveness read a moment ago.
        if !self.refresh_store.consume(user_id, &jti).await? {
            return Err(AuthError::TokenRevoked);
        }

        self.issue_pair(user_id).await
    }

    async fn logout(&self, access_token: Option<&str>) -> Result<(), AuthError> {
        let Some(token) = access_token else {
            return Ok(());
        };

        // Expired or garbage token: nothing to revoke, already logged out.
        let Ok(verify_result) = self
            .token_codec
            .verify_access_token(&AccessToken(token.to_string()))
            .await
        else {
            return Ok(());
        };

        if let Err(e) = self.refresh_store.revoke(verify_result.user_id).await {
            warn!("logout: revoke failed for {}: {}", verify_result.user_id, e);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain_model::ProviderTokens;
    use crate::domain_port::StorageTx;
    use crate::infra_memory::{MemoryIdentityRepo, MemoryRefreshStore, MemoryTxManager};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn test_config(access_ttl: Duration) -> JwtConfig {
        JwtConfig {
            issuer: "gatehouse.test".to_string(),
            audience: "test-client".to_string(),
            access_ttl,
            refresh_ttl: Duration::from_secs(7 * 24 * 60 * 60),
            access_key: b"access-test-key".to_vec(),
            refresh_key: b"refresh-test-key".to_vec(),
        }
    }

    fn test_profile(subject: &str, email: &str) -> ProviderProfile {
        ProviderProfile {
            provider: "google".to_string(),
            subject: subject.to_string(),
            email: email.to_string(),
            name: "Test User".to_string(),
            first_name: "Test".to_string(),
            last_name: "User".to_string(),
            nickname: String::new(),
            description: String::new(),
            avatar_url: String::new(),
            location: String::new(),
            tokens: ProviderTokens::default(),
        }
    }

    fn test_service() -> (
        RealAuthService,
        Arc<MemoryIdentityRepo>,
        Arc<MemoryRefreshStore>,
    ) {
        let identity_repo = Arc::new(MemoryIdentityRepo::new());
        let refresh_store = Arc::new(MemoryRefreshStore::new());
        let codec = Arc::new(JwtHs256Codec::new(test_config(Duration::from_secs(900))));
        let service = RealAuthService::new(
            identity_repo.clone(),
            refresh_store.clone(),
            codec,
            Arc::new(MemoryTxManager),
        );
        (service, identity_repo, refresh_store)
    }

    #[tokio::test]
    async fn access_token_round_trip() {
        let codec = JwtHs256Codec::new(test_config(Duration::from_secs(900)));
        let user = UserId(Uuid::new_v4());

        let (token, _) = codec.issue_access_token(user, None).await.unwrap();
        let result = codec.verify_access_token(&token).await.unwrap();

        assert_eq!(result.user_id, user);
    }

    #[tokio::test]
    async fn access_token_is_not_a_refresh_token() {
        let codec = JwtHs256Codec::new(test_config(Duration::from_secs(900)));
        let user = UserId(Uuid::new_v4());

        let (token, _) = codec.issue_access_token(user, None).await.unwrap();
        let err = codec
            .verify_refresh_token(&RefreshToken(token.0))
            .await
            .unwrap_err();

        assert!(matches!(err, AuthError::TokenMalformed));
    }

    #[tokio::test]
    async fn expiry_boundary_fails_closed() {
        let codec = JwtHs256Codec::new(test_config(Duration::ZERO));
        let user = UserId(Uuid::new_v4());

        let (token, _) = codec.issue_access_token(user, None).await.unwrap();
        let err = codec.verify_access_token(&token).await.unwrap_err();

        assert!(matches!(err, AuthError::TokenExpired));
    }

    #[tokio::test]
    async fn tampered_token_is_malformed() {
        let codec = JwtHs256Codec::new(test_config(Duration::from_secs(900)));
        let user = UserId(Uuid::new_v4());

        let (token, _) = codec.issue_access_token(user, None).await.unwrap();
        let mut tampered = token.0;
        tampered.pop();
        let err = codec
            .verify_access_token(&AccessToken(tampered))
            .await
            .unwrap_err();

        assert!(matches!(err, AuthError::TokenMalformed));
    }

    #[tokio::test]
    async fn login_issues_pair_and_stores_record() {
        let (service, _, store) = test_service();

        let result = service.login(test_profile("g-123", "a@example.com")).await.unwrap();

        let verified = service
            .verify_token(&result.tokens.access_token.0)
            .await
            .unwrap();
        assert_eq!(verified, result.user_id);
        assert!(store.record_count() == 1);
    }

    #[tokio::test]
    async fn login_rejects_empty_subject() {
        let (service, _, _) = test_service();

        let err = service.login(test_profile("", "a@example.com")).await.unwrap_err();

        assert!(matches!(err, AuthError::Provider(_)));
    }

    #[tokio::test]
    async fn refresh_rotates_and_old_token_dies() {
        let (service, _, _) = test_service();
        let login = service.login(test_profile("g-123", "a@example.com")).await.unwrap();
        let old = login.tokens.refresh_token.0;

        let rotated = service.refresh_token(&old).await.unwrap();
        assert_ne!(rotated.refresh_token.0, old);

        let err = service.refresh_token(&old).await.unwrap_err();
        assert!(matches!(err, AuthError::TokenRevoked));

        // the replacement is still good
        service.refresh_token(&rotated.refresh_token.0).await.unwrap();
    }

    #[tokio::test]
    async fn concurrent_refresh_has_single_winner() {
        let (service, _, _) = test_service();
        let login = service.login(test_profile("g-123", "a@example.com")).await.unwrap();
        let stale = login.tokens.refresh_token.0;

        let (a, b) = tokio::join!(service.refresh_token(&stale), service.refresh_token(&stale));

        let winners = [&a, &b].iter().filter(|r| r.is_ok()).count();
        assert_eq!(winners, 1);
        let loser = if a.is_ok() { b } else { a };
        assert!(matches!(loser.unwrap_err(), AuthError::TokenRevoked));
    }

    #[tokio::test]
    async fn logout_is_idempotent_and_kills_refresh() {
        let (service, _, _) = test_service();
        let login = service.login(test_profile("g-123", "a@example.com")).await.unwrap();
        let access = login.tokens.access_token.0.clone();
        let refresh = login.tokens.refresh_token.0.clone();

        service.logout(Some(&access)).await.unwrap();
        service.logout(Some(&access)).await.unwrap();
        service.logout(None).await.unwrap();
        service.logout(Some("not-a-token")).await.unwrap();

        let err = service.refresh_token(&refresh).await.unwrap_err();
        assert!(matches!(err, AuthError::TokenRevoked));
    }

    #[tokio::test]
    async fn resolver_reuses_user_for_same_subject() {
        let (service, repo, _) = test_service();

        let first = service.login(test_profile("g-123", "a@example.com")).await.unwrap();
        let second = service.login(test_profile("g-123", "a@example.com")).await.unwrap();

        assert_eq!(first.user_id, second.user_id);
        assert_eq!(repo.user_count(), 1);
    }

    #[tokio::test]
    async fn resolver_refreshes_profile_on_relogin() {
        let (service, repo, _) = test_service();

        let first = service.login(test_profile("g-123", "a@example.com")).await.unwrap();
        let mut updated = test_profile("g-123", "a@example.com");
        updated.name = "Renamed".to_string();
        service.login(updated).await.unwrap();

        let record = repo.get_user(first.user_id).await.unwrap().unwrap();
        assert_eq!(record.name, "Renamed");
    }

    /// Repo stub that loses the unique-constraint race on link: the first
    /// lookup misses, the link conflicts, the second lookup finds the
    /// winner's row.
    struct RacedIdentityRepo {
        winner: UserId,
        finds: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl IdentityRepo for RacedIdentityRepo {
        async fn find_user_by_identity(
            &self,
            _provider: &str,
            _subject: &str,
        ) -> Result<Option<UserId>, AuthError> {
            if self.finds.fetch_add(1, Ordering::SeqCst) == 0 {
                Ok(None)
            } else {
                Ok(Some(self.winner))
            }
        }

        async fn create_user_in_tx<'t>(
            &self,
            _tx: &mut dyn StorageTx<'t>,
            _user_id: UserId,
            _profile: &ProviderProfile,
        ) -> Result<(), AuthError> {
            Ok(())
        }

        async fn link_identity_in_tx<'t>(
            &self,
            _tx: &mut dyn StorageTx<'t>,
            _user_id: UserId,
            _profile: &ProviderProfile,
        ) -> Result<(), AuthError> {
            Err(AuthError::DuplicateIdentity)
        }

        async fn update_profile(
            &self,
            _user_id: UserId,
            _profile: &ProviderProfile,
        ) -> Result<(), AuthError> {
            Ok(())
        }

        async fn get_user(
            &self,
            _user_id: UserId,
        ) -> Result<Option<crate::domain_port::UserRecord>, AuthError> {
            Ok(None)
        }
    }

    #[tokio::test]
    async fn resolver_rereads_once_after_duplicate_conflict() {
        let winner = UserId(Uuid::new_v4());
        let repo = Arc::new(RacedIdentityRepo {
            winner,
            finds: AtomicUsize::new(0),
        });
        let codec = Arc::new(JwtHs256Codec::new(test_config(Duration::from_secs(900))));
        let service = RealAuthService::new(
            repo.clone(),
            Arc::new(MemoryRefreshStore::new()),
            codec,
            Arc::new(MemoryTxManager),
        );

        let result = service.login(test_profile("g-123", "a@example.com")).await.unwrap();

        assert_eq!(result.user_id, winner);
        assert_eq!(repo.finds.load(Ordering::SeqCst), 2);
    }
}
