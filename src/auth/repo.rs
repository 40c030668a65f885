use std::sync::Mutex;

use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;

use crate::{
    auth::{
        repo_types::{NewUser, ProfileChanges, User},
        validation::{check_changes, check_new_user, today},
    },
    error::FieldError,
};

const USER_COLUMNS: &str = "id, first_name, last_name, email, password_hash, phone, \
                            date_of_birth, created_at, updated_at";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("invalid user fields")]
    Invalid(Vec<FieldError>),
    #[error("email already registered")]
    EmailTaken,
    #[error("user not found")]
    NotFound,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Persistence for user records. Implementations re-validate every row they
/// write, so callers that skip the service layer still cannot store bad data.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn create(&self, user: NewUser) -> StoreResult<User>;
    async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>>;
    async fn find_by_id(&self, id: i64) -> StoreResult<Option<User>>;
    async fn update(&self, id: i64, changes: ProfileChanges) -> StoreResult<User>;
}

#[derive(Clone)]
pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.code().as_deref() == Some("23505"))
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn create(&self, user: NewUser) -> StoreResult<User> {
        check_new_user(&user, today()).map_err(StoreError::Invalid)?;

        let sql = format!(
            r#"
            INSERT INTO users (first_name, last_name, email, password_hash, phone, date_of_birth)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {USER_COLUMNS}
            "#
        );
        sqlx::query_as::<_, User>(&sql)
            .bind(&user.first_name)
            .bind(&user.last_name)
            .bind(&user.email)
            .bind(&user.password_hash)
            .bind(&user.phone)
            .bind(user.date_of_birth)
            .fetch_one(&self.db)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    StoreError::EmailTaken
                } else {
                    StoreError::Database(e)
                }
            })
    }

    async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(email)
            .fetch_optional(&self.db)
            .await?;
        Ok(user)
    }

    async fn find_by_id(&self, id: i64) -> StoreResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        Ok(user)
    }

    async fn update(&self, id: i64, changes: ProfileChanges) -> StoreResult<User> {
        check_changes(&changes, today()).map_err(StoreError::Invalid)?;

        // COALESCE keeps the stored value for every field left as NULL.
        let sql = format!(
            r#"
            UPDATE users
               SET first_name    = COALESCE($2, first_name),
                   last_name     = COALESCE($3, last_name),
                   phone         = COALESCE($4, phone),
                   date_of_birth = COALESCE($5, date_of_birth),
                   updated_at    = now()
             WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        );
        sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .bind(&changes.first_name)
            .bind(&changes.last_name)
            .bind(&changes.phone)
            .bind(changes.date_of_birth)
            .fetch_optional(&self.db)
            .await?
            .ok_or(StoreError::NotFound)
    }
}

/// In-process store for tests and `STORE_BACKEND=memory`.
#[derive(Default)]
pub struct MemoryUserStore {
    users: Mutex<Vec<User>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn user_count(&self) -> usize {
        self.lock().len()
    }

    #[cfg(test)]
    pub fn count_by_email(&self, email: &str) -> usize {
        self.lock().iter().filter(|u| u.email == email).count()
    }

    #[cfg(test)]
    /// Removes a record; lets tests simulate a user deleted behind a live token.
    pub fn remove(&self, id: i64) -> bool {
        let mut users = self.lock();
        let before = users.len();
        users.retain(|u| u.id != id);
        users.len() != before
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<User>> {
        // A poisoned lock only means another test thread panicked mid-write.
        self.users.lock().unwrap_or_else(|p| p.into_inner())
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn create(&self, user: NewUser) -> StoreResult<User> {
        check_new_user(&user, today()).map_err(StoreError::Invalid)?;

        let mut users = self.lock();
        if users.iter().any(|u| u.email == user.email) {
            return Err(StoreError::EmailTaken);
        }
        let now = OffsetDateTime::now_utc();
        let record = User {
            id: users.iter().map(|u| u.id).max().unwrap_or(0) + 1,
            first_name: user.first_name,
            last_name: user.last_name,
            email: user.email,
            password_hash: user.password_hash,
            phone: user.phone,
            date_of_birth: user.date_of_birth,
            created_at: now,
            updated_at: now,
        };
        users.push(record.clone());
        Ok(record)
    }

    async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        Ok(self.lock().iter().find(|u| u.email == email).cloned())
    }

    async fn find_by_id(&self, id: i64) -> StoreResult<Option<User>> {
        Ok(self.lock().iter().find(|u| u.id == id).cloned())
    }

    async fn update(&self, id: i64, changes: ProfileChanges) -> StoreResult<User> {
        check_changes(&changes, today()).map_err(StoreError::Invalid)?;

        let mut users = self.lock();
        let user = users
            .iter_mut()
            .find(|u| u.id == id)
            .ok_or(StoreError::NotFound)?;
        if let Some(v) = changes.first_name {
            user.first_name = v;
        }
        if let Some(v) = changes.last_name {
            user.last_name = v;
        }
        if let Some(v) = changes.phone {
            user.phone = Some(v);
        }
        if let Some(v) = changes.date_of_birth {
            user.date_of_birth = Some(v);
        }
        user.updated_at = OffsetDateTime::now_utc();
        Ok(user.clone())
    }
}
