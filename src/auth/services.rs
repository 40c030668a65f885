use std::sync::Arc;

use anyhow::Context;
use tokio::sync::OnceCell;
use tracing::{info, instrument, warn};

use crate::{
    auth::{
        dto::{AuthPayload, LoginRequest, PublicUser, RegisterRequest, UpdateProfileRequest},
        jwt::{JwtKeys, TokenError},
        password::{hash_password, verify_password},
        repo::UserStore,
        repo_types::User,
        validation::{self, today},
    },
    error::{AppError, AppResult},
};

pub const INVALID_CREDENTIALS: &str = "Invalid email or password";
pub const EMAIL_TAKEN: &str = "User with this email already exists";
pub const NOTHING_TO_UPDATE: &str = "No valid fields provided for update";

/// Hash checked against when the email is unknown, so both login failures do
/// the same argon2 work.
static DUMMY_HASH: OnceCell<String> = OnceCell::const_new();

/// Register, login, token resolution and profile updates over a `UserStore`.
#[derive(Clone)]
pub struct AuthService {
    store: Arc<dyn UserStore>,
    keys: JwtKeys,
}

async fn hash_blocking(plain: String) -> anyhow::Result<String> {
    tokio::task::spawn_blocking(move || hash_password(&plain))
        .await
        .context("password hashing task failed")?
}

async fn verify_blocking(plain: String, hash: String) -> anyhow::Result<bool> {
    tokio::task::spawn_blocking(move || verify_password(&plain, &hash))
        .await
        .context("password verification task failed")?
}

impl AuthService {
    pub fn new(store: Arc<dyn UserStore>, keys: JwtKeys) -> Self {
        Self { store, keys }
    }

    #[cfg(test)]
    pub fn keys(&self) -> &JwtKeys {
        &self.keys
    }

    #[instrument(skip_all)]
    pub async fn register(&self, req: RegisterRequest) -> AppResult<AuthPayload> {
        let mut reg = validation::registration(req, today()).map_err(AppError::Validation)?;

        if self.store.find_by_email(&reg.email).await?.is_some() {
            warn!(email = %reg.email, "email already registered");
            return Err(AppError::Conflict(EMAIL_TAKEN.into()));
        }

        let hash = hash_blocking(std::mem::take(&mut reg.password)).await?;
        // A concurrent insert of the same email surfaces here as EmailTaken -> Conflict.
        let user = self.store.create(reg.into_new_user(hash)).await?;
        let token = self.keys.sign(user.id, &user.email)?;

        info!(user_id = user.id, email = %user.email, "user registered");
        Ok(AuthPayload {
            user: user.into(),
            token,
        })
    }

    #[instrument(skip_all)]
    pub async fn login(&self, req: LoginRequest) -> AppResult<AuthPayload> {
        let req = validation::login(req).map_err(AppError::Validation)?;

        let Some(user) = self.store.find_by_email(&req.email).await? else {
            let dummy = DUMMY_HASH
                .get_or_try_init(|| hash_blocking("dummy-password".into()))
                .await?;
            verify_blocking(req.password, dummy.clone()).await?;
            warn!(email = %req.email, "login unknown email");
            return Err(AppError::unauthorized(INVALID_CREDENTIALS));
        };

        if !verify_blocking(req.password, user.password_hash.clone()).await? {
            warn!(user_id = user.id, "login invalid password");
            return Err(AppError::unauthorized(INVALID_CREDENTIALS));
        }

        let token = self.keys.sign(user.id, &user.email)?;
        info!(user_id = user.id, "user logged in");
        Ok(AuthPayload {
            user: user.into(),
            token,
        })
    }

    /// Verifies a bearer token and loads the live record it names.
    pub async fn resolve_token(&self, token: &str) -> AppResult<User> {
        let claims = self.keys.verify(token).map_err(|e| {
            warn!(error = %e, "rejected token");
            match e {
                TokenError::Expired => AppError::unauthorized("Token expired"),
                TokenError::MalformedOrBadSignature => AppError::unauthorized("Invalid token"),
            }
        })?;

        match self.store.find_by_id(claims.user_id).await? {
            Some(user) => Ok(user),
            None => {
                warn!(user_id = claims.user_id, "token for missing user");
                Err(AppError::unauthorized("Invalid token - user not found"))
            }
        }
    }

    #[instrument(skip_all, fields(user_id = user.id))]
    pub async fn update_profile(
        &self,
        user: &User,
        req: UpdateProfileRequest,
    ) -> AppResult<PublicUser> {
        let changes = validation::profile_changes(req, today()).map_err(AppError::Validation)?;
        if changes.is_empty() {
            return Err(AppError::BadRequest(NOTHING_TO_UPDATE.into()));
        }

        let updated = self.store.update(user.id, changes).await?;
        info!("profile updated");
        Ok(updated.into())
    }

    /// Tokens are stateless; the client discards its copy.
    pub fn logout(&self, user: &User) {
        info!(user_id = user.id, "user logged out");
    }
}
