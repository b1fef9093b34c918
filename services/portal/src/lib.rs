//! Kubex portal client core
//!
//! Authenticated access to the Kubex backend, polling data hooks with
//! cancellation, a health aggregator, the auth context and a client-side
//! router. The `kubex-portal` binary drives all of it headlessly.

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod health;
pub mod http;
pub mod poll;
pub mod resources;
pub mod router;
pub mod session;
pub mod storage;

#[cfg(test)]
mod testing;

pub use api::{ApiClient, Fetched, RequestOptions};
pub use auth::{AuthContext, AuthSession, UserSummary};
pub use config::{load_config, Config, RuntimeConfig};
pub use error::{PortalError, Result};
pub use poll::{ApiHook, PollData, PollOptions, PollState, TokenGated};

use std::sync::Arc;

use crate::health::HealthMonitor;
use crate::http::{HttpClient, ReqwestHttpClient};
use crate::resources::{ProvidersResponse, ScorecardResponse};
use crate::router::{History, MemoryHistory, Page, Router};
use crate::session::SessionService;
use crate::storage::BrowserStorage;

/// Everything a portal front end needs, wired together
#[derive(Debug, Clone)]
pub struct Portal {
    config: Config,
    client: ApiClient,
    router: Router,
    session: SessionService,
}

impl Portal {
    /// Production wiring: reqwest transport, storage from the config file,
    /// runtime config resolved once for the process.
    pub fn new(config: Config) -> Result<Self> {
        let runtime = config::init_runtime_config(config.runtime.clone()).clone();
        let storage = BrowserStorage::open(
            config.storage.session_path.as_deref(),
            config.storage.local_path.as_deref(),
        )?;
        let http: Arc<dyn HttpClient> = Arc::new(ReqwestHttpClient::new()?);
        let history: Arc<dyn History> = Arc::new(MemoryHistory::new(Page::Landing.to_path()));
        Ok(Self::with_parts(config, runtime, http, storage, history))
    }

    pub fn with_parts(
        config: Config,
        runtime: RuntimeConfig,
        http: Arc<dyn HttpClient>,
        storage: BrowserStorage,
        history: Arc<dyn History>,
    ) -> Self {
        let auth = AuthContext::load(storage);
        let client = ApiClient::new(http, runtime, auth);
        let router = Router::new(history);
        let session = SessionService::new(client.clone(), router.clone());
        Self {
            config,
            client,
            router,
            session,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    pub fn auth(&self) -> &AuthContext {
        self.client.auth()
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn session(&self) -> &SessionService {
        &self.session
    }

    /// Health aggregator polling at the configured interval
    pub fn health_monitor(&self) -> HealthMonitor {
        HealthMonitor::new(
            self.client.clone(),
            Some(self.config.polling.health_interval),
        )
    }

    pub fn providers(&self) -> TokenGated<ProvidersResponse> {
        resources::providers_status(&self.client, self.config.polling.providers_interval)
    }

    pub fn scorecard(&self, limit: Option<u32>) -> TokenGated<ScorecardResponse> {
        resources::scorecard(
            &self.client,
            limit.unwrap_or(self.config.polling.scorecard_limit),
            None,
        )
    }
}
