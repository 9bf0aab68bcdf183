use super::error::*;
use super::handler;
use super::handler::{REFRESH_COOKIE, STATE_COOKIE};
use crate::application_port::AuthService;
use crate::domain_model::UserId;
use crate::server::*;
use std::convert::Infallible;
use std::sync::Arc;
use warp::{Filter, reject};

pub fn routes(
    server: Arc<Server>,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    let login = warp::get()
        .and(warp::path("login"))
        .and(warp::path::end())
        .and(warp::query::<handler::LoginQuery>())
        .and(with(server.provider_gateway.clone()))
        .and(with(server.login_flow.clone()))
        .and(with(server.cookies.clone()))
        .and_then(handler::login);

    let auth_callback = warp::get()
        .and(warp::path("auth"))
        .and(warp::path("callback"))
        .and(warp::path::end())
        .and(warp::query::<handler::CallbackQuery>())
        .and(warp::cookie::optional::<String>(STATE_COOKIE))
        .and(with(server.provider_gateway.clone()))
        .and(with(server.auth_service.clone()))
        .and(with(server.login_flow.clone()))
        .and(with(server.cookies.clone()))
        .and_then(handler::auth_callback);

    let refresh = warp::get()
        .and(warp::path("auth"))
        .and(warp::path("refresh"))
        .and(warp::path::end())
        .and(warp::cookie::optional::<String>(REFRESH_COOKIE))
        .and(with(server.auth_service.clone()))
        .and(with(server.cookies.clone()))
        .and_then(handler::refresh);

    let me = warp::get()
        .and(warp::path("me"))
        .and(warp::path::end())
        .and(with_verification(server.auth_service.clone()))
        .and(with(server.user_service.clone()))
        .and_then(handler::me);

    let logout = warp::post()
        .and(warp::path("logout"))
        .and(warp::path::end())
        .and(warp::header::optional::<String>("authorization"))
        .and(with(server.auth_service.clone()))
        .and(with(server.cookies.clone()))
        .and_then(handler::logout);

    login.or(auth_callback).or(refresh).or(me).or(logout)
}

fn with<ServiceType>(
    service: Arc<ServiceType>,
) -> impl Filter<Extract = (Arc<ServiceType>,), Error = Infallible> + Clone
where
    ServiceType: Send + Sync + ?Sized,
{
    warp::any().map(move || service.clone())
}

/// Bearer-token gate for protected routes. The verified user id is handed to
/// the handler as a typed argument; handlers never fish it back out of any
/// request context.
fn with_verification(
    auth_service: Arc<dyn AuthService>,
) -> impl Filter<Extract = (UserId,), Error = warp::Rejection> + Clone {
    warp::header::optional::<String>("authorization").and_then(move |header: Option<String>| {
        let auth_service = auth_service.clone();
        async move {
            let Some(header) = header else {
                return Err(reject::custom(ApiErrorCode::NoToken));
            };
            let Some(token) = header.strip_prefix("Bearer ") else {
                return Err(reject::custom(ApiErrorCode::InvalidToken));
            };
            auth_service
                .verify_token(token)
                .await
                .map_err(ApiErrorCode::from)
                .map_err(reject::custom)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::{Auth, Http, Log, Provider, Settings, Store};
    use serde_json::Value;
    use warp::http::StatusCode;
    use warp::http::header::SET_COOKIE;

    fn test_settings() -> Settings {
        Settings {
            auth: Auth {
                backend: "real".to_string(),
                issuer: "gatehouse.test".to_string(),
                audience: "test-client".to_string(),
                access_ttl_secs: 900,
                refresh_ttl_secs: 7 * 24 * 60 * 60,
            },
            provider: Provider {
                backend: "fake".to_string(),
                client_id: String::new(),
                client_secret: String::new(),
                redirect_url: "https://localhost:8443/api/v1/auth/callback".to_string(),
                frontend_origin: "https://app.localhost:5173".to_string(),
            },
            store: Store {
                backend: "memory".to_string(),
                mysql_dsn: String::new(),
                redis_dsn: String::new(),
            },
            http: Http {
                cert_path: String::new(),
                key_path: String::new(),
                address: String::new(),
                secure_cookies: false,
            },
            log: Log {
                filter: "info".to_string(),
            },
        }
    }

    async fn test_server() -> Arc<Server> {
        Arc::new(Server::try_new(&test_settings()).await.unwrap())
    }

    fn api_filter(
        server: Arc<Server>,
    ) -> impl Filter<Extract = (impl warp::Reply,), Error = Infallible> + Clone {
        warp::path("api")
            .and(warp::path("v1"))
            .and(routes(server))
            .recover(recover_error)
    }

    fn cookie_value<T>(res: &warp::http::Response<T>, name: &str) -> String {
        let prefix = format!("{}=", name);
        res.headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|h| h.to_str().ok())
            .find(|c| c.starts_with(&prefix))
            .and_then(|c| c.split(';').next())
            .and_then(|kv| kv.split_once('='))
            .map(|(_, v)| v.to_string())
            .unwrap_or_default()
    }

    async fn login_through_callback(server: Arc<Server>, subject: &str) -> (String, String) {
        let api = api_filter(server);
        let api = &api;
        let res = warp::test::request()
            .method("GET")
            .path("/api/v1/login?provider=google")
            .reply(api)
            .await;
        assert_eq!(res.status(), StatusCode::FOUND);
        let state_cookie = cookie_value(&res, STATE_COOKIE);
        let state = state_cookie.split('.').next().unwrap().to_string();

        let res = warp::test::request()
            .method("GET")
            .path(&format!(
                "/api/v1/auth/callback?code=fake-code:{}&state={}",
                subject, state
            ))
            .header("cookie", format!("{}={}", STATE_COOKIE, state_cookie))
            .reply(api)
            .await;
        assert_eq!(res.status(), StatusCode::FOUND);
        let refresh = cookie_value(&res, REFRESH_COOKIE);
        assert!(!refresh.is_empty());

        // exchange the cookie for a bearer token the way the frontend does
        let res = warp::test::request()
            .method("GET")
            .path("/api/v1/auth/refresh")
            .header("cookie", format!("{}={}", REFRESH_COOKIE, refresh))
            .reply(api)
            .await;
        assert_eq!(res.status(), StatusCode::OK);
        let body: Value = serde_json::from_slice(res.body()).unwrap();
        let access = body["access_token"].as_str().unwrap().to_string();
        assert!(body["expires_in"].as_i64().unwrap() > 0);
        let rotated = cookie_value(&res, REFRESH_COOKIE);

        (access, rotated)
    }

    #[tokio::test]
    async fn login_redirects_to_provider_with_state_cookie() {
        let api = api_filter(test_server().await);

        let res = warp::test::request()
            .method("GET")
            .path("/api/v1/login?provider=google")
            .reply(&api)
            .await;

        assert_eq!(res.status(), StatusCode::FOUND);
        assert!(res.headers().contains_key("location"));
        assert!(!cookie_value(&res, STATE_COOKIE).is_empty());
    }

    #[tokio::test]
    async fn login_with_unknown_provider_is_rejected() {
        let api = api_filter(test_server().await);

        let res = warp::test::request()
            .method("GET")
            .path("/api/v1/login?provider=myspace")
            .reply(&api)
            .await;

        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn callback_without_matching_state_is_rejected() {
        let api = api_filter(test_server().await);

        // no state cookie at all
        let res = warp::test::request()
            .method("GET")
            .path("/api/v1/auth/callback?code=fake-code:g-123&state=whatever")
            .reply(&api)
            .await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);

        // cookie present but the provider echoed someone else's state
        let login_res = warp::test::request()
            .method("GET")
            .path("/api/v1/login?provider=google")
            .reply(&api)
            .await;
        let state_cookie = cookie_value(&login_res, STATE_COOKIE);
        let res = warp::test::request()
            .method("GET")
            .path("/api/v1/auth/callback?code=fake-code:g-123&state=not-that-state")
            .header("cookie", format!("{}={}", STATE_COOKIE, state_cookie))
            .reply(&api)
            .await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn me_requires_a_token() {
        let api = api_filter(test_server().await);

        let res = warp::test::request()
            .method("GET")
            .path("/api/v1/me")
            .reply(&api)
            .await;
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        let body: Value = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(body["error"]["code"], "NoToken");

        let res = warp::test::request()
            .method("GET")
            .path("/api/v1/me")
            .header("authorization", "Bearer garbage")
            .reply(&api)
            .await;
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        let body: Value = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(body["error"]["code"], "InvalidToken");
    }

    #[tokio::test]
    async fn refresh_requires_the_cookie_not_a_bearer() {
        let server = test_server().await;
        let (access, _) = login_through_callback(server.clone(), "g-123").await;
        let api = api_filter(server);

        let res = warp::test::request()
            .method("GET")
            .path("/api/v1/auth/refresh")
            .header("authorization", format!("Bearer {}", access))
            .reply(&api)
            .await;

        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn full_session_lifecycle() {
        let server = test_server().await;
        let (access, refresh) = login_through_callback(server.clone(), "g-123").await;
        let api = api_filter(server);

        // the bearer token opens /me
        let res = warp::test::request()
            .method("GET")
            .path("/api/v1/me")
            .header("authorization", format!("Bearer {}", access))
            .reply(&api)
            .await;
        assert_eq!(res.status(), StatusCode::OK);
        let body: Value = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(body["email"], "g-123@example.com");

        // rotate
        let res = warp::test::request()
            .method("GET")
            .path("/api/v1/auth/refresh")
            .header("cookie", format!("{}={}", REFRESH_COOKIE, refresh))
            .reply(&api)
            .await;
        assert_eq!(res.status(), StatusCode::OK);
        let access2: Value = serde_json::from_slice(res.body()).unwrap();
        let access2 = access2["access_token"].as_str().unwrap().to_string();
        let refresh2 = cookie_value(&res, REFRESH_COOKIE);

        // the superseded cookie is dead
        let res = warp::test::request()
            .method("GET")
            .path("/api/v1/auth/refresh")
            .header("cookie", format!("{}={}", REFRESH_COOKIE, refresh))
            .reply(&api)
            .await;
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        let body: Value = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(body["error"]["code"], "RevokedToken");

        // logout revokes the live record and clears the cookie
        let res = warp::test::request()
            .method("POST")
            .path("/api/v1/logout")
            .header("authorization", format!("Bearer {}", access2))
            .reply(&api)
            .await;
        assert_eq!(res.status(), StatusCode::OK);
        assert!(cookie_value(&res, REFRESH_COOKIE).is_empty());

        let res = warp::test::request()
            .method("GET")
            .path("/api/v1/auth/refresh")
            .header("cookie", format!("{}={}", REFRESH_COOKIE, refresh2))
            .reply(&api)
            .await;
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn logout_succeeds_without_a_session() {
        let api = api_filter(test_server().await);

        let res = warp::test::request()
            .method("POST")
            .path("/api/v1/logout")
            .reply(&api)
            .await;
        assert_eq!(res.status(), StatusCode::OK);

        let res = warp::test::request()
            .method("POST")
            .path("/api/v1/logout")
            .header("authorization", "Bearer long-gone")
            .reply(&api)
            .await;
        assert_eq!(res.status(), StatusCode::OK);
        let body: Value = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(body["success"], true);
    }

    #[tokio::test]
    async fn relogin_keeps_the_same_user() {
        let server = test_server().await;

        let (access_a, _) = login_through_callback(server.clone(), "g-123").await;
        let (access_b, _) = login_through_callback(server.clone(), "g-123").await;
        let api = api_filter(server);

        let mut ids = Vec::new();
        for access in [access_a, access_b] {
            let res = warp::test::request()
                .method("GET")
                .path("/api/v1/me")
                .header("authorization", format!("Bearer {}", access))
                .reply(&api)
                .await;
            assert_eq!(res.status(), StatusCode::OK);
            let body: Value = serde_json::from_slice(res.body()).unwrap();
            ids.push(body["user_id"].as_str().unwrap().to_string());
        }
        assert_eq!(ids[0], ids[1]);
    }
}
