use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};

use crate::{auth::repo_types::User, error::AppError, state::AppState};

pub const TOKEN_REQUIRED: &str = "Access token required";

/// Resolves `Authorization: Bearer <token>` to the live user record.
pub struct AuthUser(pub User);

/// Pulls the token out of an `Authorization` header value.
pub(crate) fn bearer_token(header: Option<&str>) -> Option<&str> {
    let value = header?.trim();
    let token = value
        .strip_prefix("Bearer ")
        .or_else(|| value.strip_prefix("bearer "))?
        .trim();
    (!token.is_empty()).then_some(token)
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|h| h.to_str().ok());
        let token = bearer_token(header).ok_or_else(|| AppError::unauthorized(TOKEN_REQUIRED))?;

        let user = state.auth.resolve_token(token).await?;
        Ok(AuthUser(user))
    }
}
