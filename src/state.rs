use std::sync::Arc;

use anyhow::Context;

use crate::{
    auth::{
        jwt::JwtKeys,
        repo::{MemoryUserStore, PgUserStore, UserStore},
        services::AuthService,
    },
    config::{AppConfig, StoreBackend},
    db,
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub auth: AuthService,
}

impl AppState {
    pub async fn init(config: AppConfig) -> anyhow::Result<Self> {
        let store: Arc<dyn UserStore> = match config.store {
            StoreBackend::Postgres => {
                let url = config
                    .database_url
                    .as_deref()
                    .context("DATABASE_URL not configured")?;
                Arc::new(PgUserStore::new(db::connect(url).await?))
            }
            StoreBackend::Memory => {
                tracing::warn!("using in-memory user store; data is lost on restart");
                Arc::new(MemoryUserStore::new())
            }
        };
        Ok(Self::from_parts(Arc::new(config), store))
    }

    pub fn from_parts(config: Arc<AppConfig>, store: Arc<dyn UserStore>) -> Self {
        let keys = JwtKeys::from_config(&config.jwt);
        Self {
            auth: AuthService::new(store, keys),
            config,
        }
    }

    #[cfg(test)]
    pub fn fake() -> (Self, Arc<MemoryUserStore>) {
        let config = Arc::new(AppConfig {
            store: StoreBackend::Memory,
            database_url: None,
            jwt: crate::config::JwtConfig {
                secret: "test".into(),
                ttl_seconds: 24 * 60 * 60,
            },
            host: "127.0.0.1".into(),
            port: 0,
            frontend_url: axum::http::HeaderValue::from_static("http://localhost:3000"),
        });
        let store = Arc::new(MemoryUserStore::new());
        (Self::from_parts(config, store.clone()), store)
    }
}
