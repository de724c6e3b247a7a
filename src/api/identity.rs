use async_trait::async_trait;
use axum::{extract::FromRequestParts, http::request::Parts};

use crate::error::AppError;

/// Header the authentication gateway stamps on every forwarded request
pub const USER_ID_HEADER: &str = "x-user-id";

/// Id of the user the request acts for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthenticatedUser(pub i64);

#[async_trait]
impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(USER_ID_HEADER)
            .ok_or(AppError::Unauthorized)?;

        // the gateway set a header we cannot read, that's on us
        let user_id = value
            .to_str()
            .ok()
            .and_then(|raw| raw.trim().parse::<i64>().ok())
            .ok_or_else(|| AppError::Internal(format!("malformed {} header", USER_ID_HEADER)))?;

        Ok(AuthenticatedUser(user_id))
    }
}
