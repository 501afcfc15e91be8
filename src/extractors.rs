use crate::{
    errors::AppError,
    identity::{bearer_token, AuthError},
    AppState,
};
use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use std::convert::Infallible;
use std::sync::Arc;

fn authenticate(parts: &Parts, state: &AppState) -> Result<String, AuthError> {
    let header = parts
        .headers
        .get(AUTHORIZATION)
        .map(|value| value.to_str().map_err(|_| AuthError::MissingCredentials))
        .transpose()?;
    let token = bearer_token(header)?;
    state.identity.authenticate(token)
}

/// Username of a caller with a valid bearer token. Rejects with 401/403.
#[derive(Debug, Clone)]
pub struct AuthUser(pub String);

impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        Ok(AuthUser(authenticate(parts, state)?))
    }
}

/// Username of the caller if a valid token was sent; anything else is anonymous.
#[derive(Debug, Clone)]
pub struct MaybeAuthUser(pub Option<String>);

impl FromRequestParts<Arc<AppState>> for MaybeAuthUser {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        match authenticate(parts, state) {
            Ok(username) => Ok(MaybeAuthUser(Some(username))),
            Err(AuthError::MissingCredentials) => Ok(MaybeAuthUser(None)),
            Err(err) => {
                tracing::debug!(error = %err, "Treating caller with unusable token as anonymous");
                Ok(MaybeAuthUser(None))
            }
        }
    }
}
