use super::error::*;
use crate::application_port::{AuthService, UserService};
use crate::application_impl::LoginFlow;
use crate::domain_model::UserId;
use crate::domain_port::ProviderGateway;
use crate::logger::*;
use crate::server::CookieConfig;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use warp::http::{StatusCode, header};
use warp::{self, reject};

pub const REFRESH_COOKIE: &str = "refresh_token";
pub const STATE_COOKIE: &str = "oauth_state";

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<ApiError>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        ApiResponse {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(code: ApiErrorCode, message: impl Into<String>) -> Self {
        ApiResponse {
            success: false,
            data: None,
            error: Some(ApiError {
                code,
                message: message.into(),
            }),
        }
    }
}

fn state_cookie(value: &str, secure: bool) -> String {
    format!(
        "{}={}; Max-Age=600; Path=/; HttpOnly{}",
        STATE_COOKIE,
        value,
        if secure { "; Secure" } else { "" }
    )
}

fn clear_state_cookie() -> String {
    format!("{}=; Max-Age=0; Path=/; HttpOnly", STATE_COOKIE)
}

fn refresh_cookie(value: &str, expires_at: DateTime<Utc>, secure: bool) -> String {
    format!(
        "{}={}; Expires={}; Path=/; HttpOnly; SameSite=None{}",
        REFRESH_COOKIE,
        value,
        expires_at.format("%a, %d %b %Y %H:%M:%S GMT"),
        if secure { "; Secure" } else { "" }
    )
}

fn clear_refresh_cookie(secure: bool) -> String {
    format!(
        "{}=; Max-Age=0; Path=/; HttpOnly; SameSite=None{}",
        REFRESH_COOKIE,
        if secure { "; Secure" } else { "" }
    )
}

#[derive(Debug, Deserialize)]
pub struct LoginQuery {
    pub provider: String,
}

pub async fn login(
    query: LoginQuery,
    provider_gateway: Arc<dyn ProviderGateway>,
    login_flow: Arc<LoginFlow>,
    cookies: Arc<CookieConfig>,
) -> Result<impl warp::Reply, warp::Rejection> {
    if query.provider != provider_gateway.provider() {
        return Err(reject::custom(ApiErrorCode::UnknownProvider));
    }

    let ticket = login_flow
        .begin()
        .map_err(ApiErrorCode::from)
        .map_err(reject::custom)?;
    let authorize_url = provider_gateway
        .authorize_url(&ticket.state)
        .map_err(ApiErrorCode::from)
        .map_err(reject::custom)?;

    warp::http::Response::builder()
        .status(StatusCode::FOUND)
        .header(header::LOCATION, authorize_url)
        .header(
            header::SET_COOKIE,
            state_cookie(&ticket.cookie_value, cookies.secure),
        )
        .body(String::new())
        .map_err(ApiErrorCode::internal)
        .map_err(reject::custom)
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub code: String,
    pub state: String,
}

pub async fn auth_callback(
    query: CallbackQuery,
    state_cookie_value: Option<String>,
    provider_gateway: Arc<dyn ProviderGateway>,
    auth_service: Arc<dyn AuthService>,
    login_flow: Arc<LoginFlow>,
    cookies: Arc<CookieConfig>,
) -> Result<impl warp::Reply, warp::Rejection> {
    let cookie_value =
        state_cookie_value.ok_or_else(|| reject::custom(ApiErrorCode::InvalidState))?;
    login_flow
        .verify(&cookie_value, &query.state)
        .map_err(ApiErrorCode::from)
        .map_err(reject::custom)?;

    let profile = provider_gateway
        .exchange_code(&query.code)
        .await
        .map_err(ApiErrorCode::from)
        .map_err(reject::custom)?;

    let login_result = auth_service
        .login(profile)
        .await
        .map_err(ApiErrorCode::from)
        .map_err(reject::custom)?;
    info!("user {} logged in", login_result.user_id);

    let tokens = login_result.tokens;
    warp::http::Response::builder()
        .status(StatusCode::FOUND)
        .header(header::LOCATION, cookies.frontend_origin.clone())
        .header(
            header::SET_COOKIE,
            refresh_cookie(
                &tokens.refresh_token.0,
                tokens.refresh_token_expires_at,
                cookies.secure,
            ),
        )
        .header(header::SET_COOKIE, clear_state_cookie())
        .body(String::new())
        .map_err(ApiErrorCode::internal)
        .map_err(reject::custom)
}

#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    pub access_token: String,
    pub expires_in: i64,
}

pub async fn refresh(
    refresh_cookie_value: Option<String>,
    auth_service: Arc<dyn AuthService>,
    cookies: Arc<CookieConfig>,
) -> Result<impl warp::Reply, warp::Rejection> {
    // cookie only: a bearer header is never accepted here, so an access
    // token can never stand in for a refresh token
    let presented = refresh_cookie_value.ok_or_else(|| reject::custom(ApiErrorCode::NoToken))?;

    let tokens = auth_service
        .refresh_token(&presented)
        .await
        .map_err(ApiErrorCode::from)
        .map_err(reject::custom)?;

    let expires_in = (tokens.access_token_expires_at - Utc::now()).num_seconds();
    let json = warp::reply::json(&RefreshResponse {
        access_token: tokens.access_token.0,
        expires_in,
    });
    Ok(warp::reply::with_header(
        json,
        header::SET_COOKIE,
        refresh_cookie(
            &tokens.refresh_token.0,
            tokens.refresh_token_expires_at,
            cookies.secure,
        ),
    ))
}

pub async fn me(
    user_id: UserId,
    user_service: Arc<dyn UserService>,
) -> Result<impl warp::Reply, warp::Rejection> {
    let profile = user_service
        .get_profile(user_id)
        .await
        .map_err(ApiErrorCode::from)
        .map_err(reject::custom)?;

    Ok(warp::reply::json(&profile))
}

#[derive(Debug, Serialize)]
pub struct LogoutResponse;

pub async fn logout(
    authorization: Option<String>,
    auth_service: Arc<dyn AuthService>,
    cookies: Arc<CookieConfig>,
) -> Result<impl warp::Reply, warp::Rejection> {
    let token = authorization
        .as_deref()
        .and_then(|header| header.strip_prefix("Bearer "));

    // never fails the caller: whether a session existed is not leaked
    if let Err(e) = auth_service.logout(token).await {
        warn!("logout: {}", e);
    }

    let json = warp::reply::json(&ApiResponse::ok(LogoutResponse));
    Ok(warp::reply::with_header(
        json,
        header::SET_COOKIE,
        clear_refresh_cookie(cookies.secure),
    ))
}
