use std::sync::Arc;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use tracing::warn;

use crate::{
    auth::repo::{PgUserStore, UserStore},
    config::AppConfig,
    mail::{LogMailer, Mailer, SmtpMailer},
    storage::{PhotoStorage, S3Storage},
    stores::repo::{PgStoreRepo, StoreRepo},
    web::SessionKeys,
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub sessions: SessionKeys,
    pub users: Arc<dyn UserStore>,
    pub stores: Arc<dyn StoreRepo>,
    pub storage: Arc<dyn PhotoStorage>,
    pub mailer: Arc<dyn Mailer>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let db = PgPoolOptions::new()
            .max_connections(10)
            .connect(&config.database_url)
            .await
            .context("connect to database")?;

        if let Err(e) = sqlx::migrate!("./migrations").run(&db).await {
            warn!(error = %e, "migration failed; continuing");
        }

        let storage = Arc::new(S3Storage::from_config(&config).await?) as Arc<dyn PhotoStorage>;

        let mailer: Arc<dyn Mailer> = match &config.smtp {
            Some(smtp) => Arc::new(SmtpMailer::new(smtp)?),
            None => {
                warn!("SMTP_HOST not set; reset emails will only be logged");
                Arc::new(LogMailer)
            }
        };

        Ok(Self::from_parts(
            config,
            Arc::new(PgUserStore::new(db.clone())),
            Arc::new(PgStoreRepo::new(db)),
            storage,
            mailer,
        ))
    }

    pub fn from_parts(
        config: Arc<AppConfig>,
        users: Arc<dyn UserStore>,
        stores: Arc<dyn StoreRepo>,
        storage: Arc<dyn PhotoStorage>,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        Self {
            sessions: SessionKeys::from_config(&config.session),
            config,
            users,
            stores,
            storage,
            mailer,
        }
    }
}
