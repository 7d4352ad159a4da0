use std::sync::Arc;

use tracing::warn;

use crate::auth::recovery::RecoverySessions;
use crate::config::AppConfig;
use crate::mailer::{Mailer, NoopMailer, SmtpMailer};
use crate::store::UserStore;

#[derive(Clone)]
pub struct AppState {
    pub store: UserStore,
    pub config: Arc<AppConfig>,
    pub mailer: Arc<dyn Mailer>,
    pub recovery: RecoverySessions,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);
        let store = UserStore::load(&config.data_file).await;
        let mailer: Arc<dyn Mailer> = match &config.smtp {
            Some(smtp) => Arc::new(SmtpMailer::new(smtp)?),
            None => {
                warn!("SMTP_HOST not set, password recovery mails will not be delivered");
                Arc::new(NoopMailer)
            }
        };
        Ok(Self::from_parts(store, config, mailer))
    }

    pub fn from_parts(store: UserStore, config: Arc<AppConfig>, mailer: Arc<dyn Mailer>) -> Self {
        Self {
            store,
            config,
            mailer,
            recovery: RecoverySessions::default(),
        }
    }
}
