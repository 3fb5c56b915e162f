use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;

use crate::fleet::Fleet;

use super::api::error::ErrorResponse;
use super::config::{Config, Permission};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub fleet: Fleet,
}

/// Who sent the request.
#[derive(Debug, Clone)]
pub enum Caller {
    /// The service runs without API keys; everything is allowed.
    Open,
    Key {
        name: String,
        permissions: HashSet<Permission>,
    },
}

impl Caller {
    pub fn name(&self) -> &str {
        match self {
            Caller::Open => "anonymous",
            Caller::Key { name, .. } => name,
        }
    }

    pub fn may(&self, permission: Permission) -> bool {
        match self {
            Caller::Open => true,
            Caller::Key { permissions, .. } => permissions.contains(&permission),
        }
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing Authorization header")]
    MissingCredentials,
    #[error("expected `Authorization: Bearer <key>`")]
    MalformedCredentials,
    #[error("unknown API key")]
    UnknownKey,
}

impl AuthError {
    fn code(&self) -> &'static str {
        match self {
            AuthError::MissingCredentials => "missing_credentials",
            AuthError::MalformedCredentials => "malformed_credentials",
            AuthError::UnknownKey => "unknown_api_key",
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let body = ErrorResponse::with_message(self.code(), &self.to_string());
        (StatusCode::UNAUTHORIZED, Json(body)).into_response()
    }
}

/// The caller is known but may not perform the operation.
#[derive(Debug, Error)]
#[error("{caller} lacks the {permission} permission")]
pub struct PermissionError {
    caller: String,
    permission: &'static str,
}

impl IntoResponse for PermissionError {
    fn into_response(self) -> Response {
        let body = ErrorResponse::with_message("forbidden", &self.to_string());
        (StatusCode::FORBIDDEN, Json(body)).into_response()
    }
}

fn bearer_key(parts: &Parts) -> Result<&str, AuthError> {
    let value = parts
        .headers
        .get(header::AUTHORIZATION)
        .ok_or(AuthError::MissingCredentials)?
        .to_str()
        .map_err(|_| AuthError::MalformedCredentials)?;
    value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|key| !key.is_empty())
        .ok_or(AuthError::MalformedCredentials)
}

impl FromRequestParts<AppState> for Caller {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        if !state.config.auth_enabled() {
            return Ok(Caller::Open);
        }

        let key = bearer_key(parts).inspect_err(|e| log::debug!("Rejected request: {}", e))?;
        let api_key = state.config.find_api_key(key).ok_or_else(|| {
            log::warn!("Request with unknown API key");
            AuthError::UnknownKey
        })?;

        Ok(Caller::Key {
            name: api_key.name.clone(),
            permissions: api_key.permissions.clone(),
        })
    }
}

pub fn require_permission(caller: &Caller, permission: Permission) -> Result<(), PermissionError> {
    if caller.may(permission) {
        return Ok(());
    }
    let err = PermissionError {
        caller: caller.name().to_string(),
        permission: permission.as_str(),
    };
    log::warn!("{}", err);
    Err(err)
}
