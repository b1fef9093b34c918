//! BDD test world for the portal client

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use cucumber::World;
use kubex_portal::config::{PartialRuntimeConfig, RuntimeOverrides};
use kubex_portal::health::HealthMonitor;
use kubex_portal::http::{HttpClient, HttpRequest, HttpResponse, Method};
use kubex_portal::router::MemoryHistory;
use kubex_portal::session::UsersOutcome;
use kubex_portal::storage::BrowserStorage;
use kubex_portal::{ApiHook, Config, PollState, Portal, PortalError, RuntimeConfig};
use serde_json::Value;
use tokio::sync::watch;

/// Canned backend: one response per method and path, every request recorded
#[derive(Default)]
pub struct FakeBackend {
    routes: Mutex<HashMap<(Method, String), (Duration, u16, String)>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl FakeBackend {
    pub fn respond(&self, method: Method, path: &str, status: u16, body: &str) {
        self.respond_after(method, path, Duration::ZERO, status, body);
    }

    pub fn respond_after(
        &self,
        method: Method,
        path: &str,
        delay: Duration,
        status: u16,
        body: &str,
    ) {
        self.routes.lock().unwrap().insert(
            (method, path.to_string()),
            (delay, status, body.to_string()),
        );
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn requests_to(&self, path: &str) -> Vec<HttpRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.url == path)
            .collect()
    }
}

#[async_trait::async_trait]
impl HttpClient for FakeBackend {
    async fn send(&self, request: HttpRequest) -> kubex_portal::Result<HttpResponse> {
        let route = self
            .routes
            .lock()
            .unwrap()
            .get(&(request.method, request.url.clone()))
            .cloned();
        self.requests.lock().unwrap().push(request);

        let (delay, status, body) = route.unwrap_or((Duration::ZERO, 404, "{}".to_string()));
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        Ok(HttpResponse {
            status,
            content_type: Some("application/json".to_string()),
            body,
        })
    }
}

#[derive(Default, World)]
pub struct PortalWorld {
    pub backend: Arc<FakeBackend>,
    pub storage: Option<BrowserStorage>,
    pub portal: Option<Portal>,

    // Session testing
    pub sign_in_error: Option<PortalError>,
    pub users_outcome: Option<UsersOutcome>,

    // Health testing
    pub health: Option<HealthMonitor>,

    // Polling testing
    pub hook: Option<ApiHook<Value>>,
    pub hook_changes: Option<watch::Receiver<PollState<Value>>>,

    // Runtime config testing
    pub api_base: String,
    pub built_url: Option<String>,
    pub injected: PartialRuntimeConfig,
    pub overrides: RuntimeOverrides,
    pub runtime: Option<RuntimeConfig>,
}

impl std::fmt::Debug for PortalWorld {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortalWorld")
            .field("requests", &self.backend.requests().len())
            .field("portal", &self.portal)
            .field("sign_in_error", &self.sign_in_error)
            .field("users_outcome", &self.users_outcome)
            .field("built_url", &self.built_url)
            .field("runtime", &self.runtime)
            .finish_non_exhaustive()
    }
}

impl PortalWorld {
    /// Build a portal over the world's backend and storage, as a fresh
    /// process start would
    pub fn start_portal(&mut self, at: &str) {
        let storage = self
            .storage
            .get_or_insert_with(BrowserStorage::in_memory)
            .clone();
        let http: Arc<dyn HttpClient> = self.backend.clone();
        self.portal = Some(Portal::with_parts(
            Config::default(),
            RuntimeConfig::default(),
            http,
            storage,
            Arc::new(MemoryHistory::new(at)),
        ));
    }

    pub fn portal(&self) -> &Portal {
        self.portal.as_ref().expect("portal not started")
    }
}
