//! Application state shared across handlers.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use sqlx::PgPool;

use voice_confirm_core::{ShopDomain, UserId};

use crate::config::AppConfig;
use crate::db::Repositories;
use crate::services::auth::TokenIssuer;
use crate::services::calls::CallWorkflow;
use crate::services::shopify::{CommercePlatform, ShopifyClient};
use crate::services::telephony::{Ivr, Telephony, TwilioClient};

/// How long an issued OAuth `state` stays valid.
const INSTALL_STATE_TTL: Duration = Duration::from_secs(600);

/// An install started by `/shopify/auth`, keyed by its `state` token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingInstall {
    pub shop: ShopDomain,
    pub user_id: UserId,
}

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc`. Adapters are injected as
/// trait objects so tests can swap in doubles.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: AppConfig,
    repos: Repositories,
    commerce: Arc<dyn CommercePlatform>,
    telephony: Arc<dyn Telephony>,
    ivr: Ivr,
    tokens: TokenIssuer,
    pending_installs: Cache<String, PendingInstall>,
}

impl AppState {
    /// Create application state from explicit parts.
    #[must_use]
    pub fn new(
        config: AppConfig,
        repos: Repositories,
        commerce: Arc<dyn CommercePlatform>,
        telephony: Arc<dyn Telephony>,
    ) -> Self {
        let ivr = Ivr::new(config.twilio.support_number.clone());
        let tokens = TokenIssuer::new(&config.auth);
        let pending_installs = Cache::builder()
            .max_capacity(10_000)
            .time_to_live(INSTALL_STATE_TTL)
            .build();

        Self {
            inner: Arc::new(AppStateInner {
                config,
                repos,
                commerce,
                telephony,
                ivr,
                tokens,
                pending_installs,
            }),
        }
    }

    /// Production state: `PostgreSQL` repositories, Shopify and Twilio clients.
    #[must_use]
    pub fn with_postgres(config: AppConfig, pool: &PgPool) -> Self {
        let repos = Repositories::postgres(pool);
        let commerce = Arc::new(ShopifyClient::new(&config.shopify));
        let telephony = Arc::new(TwilioClient::new(&config.twilio, config.api_url("")));
        Self::new(config, repos, commerce, telephony)
    }

    #[must_use]
    pub fn config(&self) -> &AppConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn repos(&self) -> &Repositories {
        &self.inner.repos
    }

    #[must_use]
    pub fn commerce(&self) -> &dyn CommercePlatform {
        self.inner.commerce.as_ref()
    }

    #[must_use]
    pub fn telephony(&self) -> &dyn Telephony {
        self.inner.telephony.as_ref()
    }

    #[must_use]
    pub fn ivr(&self) -> &Ivr {
        &self.inner.ivr
    }

    #[must_use]
    pub fn tokens(&self) -> &TokenIssuer {
        &self.inner.tokens
    }

    /// The order-call state machine over this state's repositories.
    #[must_use]
    pub fn workflow(&self) -> CallWorkflow<'_> {
        CallWorkflow::new(&self.inner.repos, self.inner.telephony.as_ref())
    }

    /// Remember an install until its callback arrives.
    pub async fn remember_install(&self, state: String, install: PendingInstall) {
        self.inner.pending_installs.insert(state, install).await;
    }

    /// Consume an install `state`; each token is accepted once.
    pub async fn take_install(&self, state: &str) -> Option<PendingInstall> {
        self.inner.pending_installs.remove(state).await
    }
}
