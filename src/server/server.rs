use crate::application_impl::*;
use crate::application_port::*;
use crate::domain_port::*;
use crate::infra_http::*;
use crate::infra_memory::*;
use crate::infra_mysql::*;
use crate::infra_redis::*;
use crate::logger::*;
use crate::settings::Settings;
use sqlx::{MySql, Pool};
use std::sync::Arc;
use std::time::Duration;

/// How outgoing cookies are shaped: `secure` follows the deployment, the
/// frontend origin is where completed logins land.
#[derive(Debug, Clone)]
pub struct CookieConfig {
    pub secure: bool,
    pub frontend_origin: String,
}

pub struct Server {
    pub auth_service: Arc<dyn AuthService>,
    pub user_service: Arc<dyn UserService>,
    pub provider_gateway: Arc<dyn ProviderGateway>,
    pub login_flow: Arc<LoginFlow>,
    pub cookies: Arc<CookieConfig>,
    pool: Option<Pool<MySql>>,
}

impl Server {
    pub async fn try_new(settings: &Settings) -> anyhow::Result<Self> {
        let access_key = std::env::var("GATEHOUSE_ACCESS_TOKEN_KEY")
            .unwrap_or_else(|_| "dev-access-token-key".to_string())
            .into_bytes();
        let refresh_key = std::env::var("GATEHOUSE_REFRESH_TOKEN_KEY")
            .unwrap_or_else(|_| "dev-refresh-token-key".to_string())
            .into_bytes();
        let flow_key = std::env::var("GATEHOUSE_FLOW_KEY")
            .unwrap_or_else(|_| "dev-flow-key".to_string())
            .into_bytes();

        let token_codec: Arc<dyn TokenCodec> = Arc::new(JwtHs256Codec::new(JwtConfig {
            issuer: settings.auth.issuer.clone(),
            audience: settings.auth.audience.clone(),
            access_ttl: Duration::from_secs(settings.auth.access_ttl_secs),
            refresh_ttl: Duration::from_secs(settings.auth.refresh_ttl_secs),
            access_key,
            refresh_key,
        }));
        let login_flow = Arc::new(LoginFlow::new(flow_key));

        let (identity_repo, refresh_store, tx_manager, pool): (
            Arc<dyn IdentityRepo>,
            Arc<dyn RefreshStore>,
            Arc<dyn TxManager>,
            Option<Pool<MySql>>,
        ) = match settings.store.backend.as_str() {
            "memory" => (
                Arc::new(MemoryIdentityRepo::new()),
                Arc::new(MemoryRefreshStore::new()),
                Arc::new(MemoryTxManager),
                None,
            ),
            "real" => {
                let redis_client = redis::Client::open(settings.store.redis_dsn.as_str())?;
                let redis_manager = redis_client.get_connection_manager().await?;
                let refresh_store = RedisRefreshStore::new(redis_manager, "auth:refresh");

                let pool = Pool::<MySql>::connect(&settings.store.mysql_dsn).await?;
                (
                    Arc::new(MySqlIdentityRepo::new(pool.clone())),
                    Arc::new(refresh_store),
                    Arc::new(MySqlTxManager::new(pool.clone())),
                    Some(pool),
                )
            }
            other => return Err(anyhow::anyhow!("Unknown store backend: {}", other)),
        };

        let provider_gateway: Arc<dyn ProviderGateway> = match settings.provider.backend.as_str() {
            "fake" => Arc::new(FakeProviderGateway::new(
                settings.provider.redirect_url.clone(),
            )),
            "google" => Arc::new(GoogleProviderGateway::new(
                settings.provider.client_id.clone(),
                settings.provider.client_secret.clone(),
                settings.provider.redirect_url.clone(),
            )),
            other => return Err(anyhow::anyhow!("Unknown provider backend: {}", other)),
        };

        let auth_service: Arc<dyn AuthService> = match settings.auth.backend.as_str() {
            "fake" => Arc::new(FakeAuthService::new()),
            "real" => Arc::new(RealAuthService::new(
                identity_repo.clone(),
                refresh_store.clone(),
                token_codec,
                tx_manager.clone(),
            )),
            other => return Err(anyhow::anyhow!("Unknown auth backend: {}", other)),
        };

        let user_service: Arc<dyn UserService> =
            Arc::new(RealUserService::new(identity_repo.clone()));

        let cookies = Arc::new(CookieConfig {
            secure: settings.http.secure_cookies,
            frontend_origin: settings.provider.frontend_origin.clone(),
        });

        info!("server started");

        Ok(Self {
            auth_service,
            user_service,
            provider_gateway,
            login_flow,
            cookies,
            pool,
        })
    }

    pub async fn shutdown(&self) {
        info!("server shutting down...");

        if let Some(pool) = &self.pool {
            pool.close().await;
        }
    }
}
