use crate::api::v1::handler::ApiResponse;
use crate::application_impl::LoginFlowError;
use crate::application_port::*;
use serde::Serialize;
use std::convert::Infallible;
use thiserror::Error;
use tracing::warn;
use warp::http::StatusCode;
use warp::{Rejection, reject};

pub async fn recover_error(err: Rejection) -> Result<impl warp::Reply, Infallible> {
    if let Some(err) = err.find::<ApiErrorCode>() {
        let json = warp::reply::json(&ApiResponse::<()>::err(err.clone(), err.to_string()));
        Ok(warp::reply::with_status(json, err.status()))
    } else {
        let json = warp::reply::json(&ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(ApiError {
                code: ApiErrorCode::InternalError,
                message: format!("Unhandled error: {:?}", err),
            }),
        });
        Ok(warp::reply::with_status(
            json,
            StatusCode::INTERNAL_SERVER_ERROR,
        ))
    }
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub code: ApiErrorCode,
    pub message: String,
}

#[derive(Debug, Clone, Error, Serialize)]
pub enum ApiErrorCode {
    #[error("No token presented")]
    NoToken,
    #[error("Token is not valid")]
    InvalidToken,
    #[error("Token has expired")]
    ExpiredToken,
    #[error("Token has been revoked")]
    RevokedToken,
    #[error("Login state missing or mismatched")]
    InvalidState,
    #[error("Unknown provider")]
    UnknownProvider,
    #[error("Internal error")]
    InternalError,
}

impl ApiErrorCode {
    pub fn internal<E: std::fmt::Display>(error: E) -> ApiErrorCode {
        warn!("Internal error: {}", error);
        ApiErrorCode::InternalError
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiErrorCode::NoToken
            | ApiErrorCode::InvalidToken
            | ApiErrorCode::ExpiredToken
            | ApiErrorCode::RevokedToken => StatusCode::UNAUTHORIZED,
            ApiErrorCode::InvalidState | ApiErrorCode::UnknownProvider => StatusCode::BAD_REQUEST,
            ApiErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl reject::Reject for ApiErrorCode {}

impl From<AuthError> for ApiErrorCode {
    fn from(error: AuthError) -> Self {
        match error {
            // the client gets the coarse class only, never which check failed
            AuthError::TokenMalformed | AuthError::UserNotFound => ApiErrorCode::InvalidToken,
            AuthError::TokenExpired => ApiErrorCode::ExpiredToken,
            AuthError::TokenRevoked => ApiErrorCode::RevokedToken,
            AuthError::Provider(e) => ApiErrorCode::internal(e),
            AuthError::DuplicateIdentity => ApiErrorCode::internal("unresolved identity race"),
            AuthError::Store(e) => ApiErrorCode::internal(e),
            AuthError::InternalError(e) => ApiErrorCode::internal(e),
        }
    }
}

impl From<LoginFlowError> for ApiErrorCode {
    fn from(error: LoginFlowError) -> Self {
        match error {
            LoginFlowError::Malformed | LoginFlowError::Mismatch => ApiErrorCode::InvalidState,
            LoginFlowError::InternalError(e) => ApiErrorCode::internal(e),
        }
    }
}
