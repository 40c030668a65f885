use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::instrument;

use crate::{
    auth::{
        dto::{
            ApiResponse, AuthPayload, LoginRequest, PublicUser, RegisterRequest,
            UpdateProfileRequest, UserPayload,
        },
        extractors::AuthUser,
    },
    error::AppResult,
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
}

pub fn me_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/profile", get(get_profile).put(update_profile))
        .route("/auth/verify", get(verify))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> AppResult<(StatusCode, Json<ApiResponse<AuthPayload>>)> {
    let Json(payload) = payload?;
    let out = state.auth.register(payload).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok("User registered successfully", out)),
    ))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> AppResult<Json<ApiResponse<AuthPayload>>> {
    let Json(payload) = payload?;
    let out = state.auth.login(payload).await?;
    Ok(Json(ApiResponse::ok("Login successful", out)))
}

#[instrument(skip_all)]
pub async fn get_profile(AuthUser(user): AuthUser) -> Json<ApiResponse<UserPayload>> {
    Json(ApiResponse::ok(
        "Profile retrieved successfully",
        UserPayload { user: user.into() },
    ))
}

#[instrument(skip_all)]
pub async fn update_profile(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    payload: Result<Json<UpdateProfileRequest>, JsonRejection>,
) -> AppResult<Json<ApiResponse<UserPayload>>> {
    let Json(payload) = payload?;
    let user: PublicUser = state.auth.update_profile(&user, payload).await?;
    Ok(Json(ApiResponse::ok(
        "Profile updated successfully",
        UserPayload { user },
    )))
}

#[instrument(skip_all)]
pub async fn logout(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Json<ApiResponse<()>> {
    state.auth.logout(&user);
    Json(ApiResponse::message("Logout successful"))
}

#[instrument(skip_all)]
pub async fn verify(AuthUser(user): AuthUser) -> Json<ApiResponse<UserPayload>> {
    Json(ApiResponse::ok(
        "Token is valid",
        UserPayload { user: user.into() },
    ))
}
