//! Health aggregator
//!
//! Signed-in clients poll the detailed, authenticated health endpoint;
//! anonymous clients poll the basic public one. Both payloads are
//! normalized into a [`HealthSummary`].

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::api::ApiClient;
use crate::poll::{ApiHook, PollOptions, PollState};
use crate::PortalError;

pub const DETAILED_HEALTH_PATH: &str = "/api/v1/health";
pub const BASIC_HEALTH_PATH: &str = "/health";
pub const UNKNOWN_STATUS: &str = "unknown";

/// Which endpoint produced a summary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthSource {
    Basic,
    Detailed,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDetail {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub available: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unavailable: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceHealth {
    pub healthy: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<ServiceDetail>,
}

/// Normalized health, replaced wholesale on every poll
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthSummary {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uptime: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default)]
    pub services: BTreeMap<String, ServiceHealth>,
    pub source: HealthSource,
}

impl HealthSummary {
    /// Shown before either endpoint has answered
    pub fn unknown() -> Self {
        Self {
            status: UNKNOWN_STATUS.to_string(),
            uptime: None,
            version: None,
            services: BTreeMap::new(),
            source: HealthSource::Basic,
        }
    }
}

/// `GET /api/v1/health`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DetailedHealthResponse {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
    /// Some gateway versions report seconds, others a formatted string
    #[serde(default)]
    pub uptime: Option<Value>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub services: Option<BTreeMap<String, ServiceHealth>>,
}

/// `GET /health`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BasicHealthResponse {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

pub fn summarize_detailed(raw: Value) -> crate::Result<HealthSummary> {
    let response: DetailedHealthResponse = serde_json::from_value(raw)
        .map_err(|e| PortalError::Transform(format!("detailed health: {}", e)))?;
    Ok(HealthSummary {
        status: response.status.unwrap_or_else(|| UNKNOWN_STATUS.to_string()),
        uptime: response.uptime.and_then(|uptime| match uptime {
            Value::String(s) => Some(s),
            Value::Null => None,
            other => Some(other.to_string()),
        }),
        version: response.version,
        services: response.services.unwrap_or_default(),
        source: HealthSource::Detailed,
    })
}

pub fn summarize_basic(raw: Value) -> crate::Result<HealthSummary> {
    let status = match raw {
        // plain-text health endpoints answer with the bare status
        Value::String(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
        Value::String(_) => None,
        other => {
            let response: BasicHealthResponse = serde_json::from_value(other)
                .map_err(|e| PortalError::Transform(format!("basic health: {}", e)))?;
            response.status.or(response.message)
        }
    };
    Ok(HealthSummary {
        status: status.unwrap_or_else(|| UNKNOWN_STATUS.to_string()),
        ..HealthSummary::unknown()
    })
}

/// Two mutually exclusive health hooks behind one summary. The active one
/// follows token presence: every auth change re-evaluates it.
pub struct HealthMonitor {
    endpoints: Arc<Endpoints>,
    follower: JoinHandle<()>,
}

struct Endpoints {
    client: ApiClient,
    interval: Option<Duration>,
    detailed: ApiHook<HealthSummary>,
    basic: ApiHook<HealthSummary>,
}

impl Endpoints {
    fn is_detailed(&self) -> bool {
        self.detailed.options().enabled
    }

    fn active(&self) -> &ApiHook<HealthSummary> {
        if self.is_detailed() {
            &self.detailed
        } else {
            &self.basic
        }
    }

    fn sync_token(&self) -> bool {
        let wants_detailed = self.client.has_token();
        if wants_detailed == self.is_detailed() {
            return false;
        }
        tracing::info!(
            "Token {}, switching health endpoint to {}",
            if wants_detailed { "appeared" } else { "gone" },
            if wants_detailed { DETAILED_HEALTH_PATH } else { BASIC_HEALTH_PATH }
        );
        self.detailed
            .set_options(detailed_options(wants_detailed, self.interval));
        self.basic
            .set_options(basic_options(!wants_detailed, self.interval));
        true
    }
}

impl HealthMonitor {
    /// Start polling whichever endpoint the current token allows.
    /// Must be called from within a Tokio runtime.
    pub fn new(client: ApiClient, interval: Option<Duration>) -> Self {
        let wants_detailed = client.has_token();
        tracing::debug!(
            "Health monitor starting with {} endpoint",
            if wants_detailed { "detailed" } else { "basic" }
        );
        let mut sessions = client.auth().subscribe();
        let detailed = ApiHook::new(client.clone(), detailed_options(wants_detailed, interval));
        let basic = ApiHook::new(client.clone(), basic_options(!wants_detailed, interval));
        let endpoints = Arc::new(Endpoints {
            client,
            interval,
            detailed,
            basic,
        });

        let weak = Arc::downgrade(&endpoints);
        let follower = tokio::spawn(async move {
            while sessions.changed().await.is_ok() {
                match weak.upgrade() {
                    Some(endpoints) => {
                        endpoints.sync_token();
                    }
                    None => break,
                }
            }
        });

        Self {
            endpoints,
            follower,
        }
    }

    /// Detailed data, else basic data, else the unknown placeholder
    pub fn summary(&self) -> HealthSummary {
        self.endpoints
            .detailed
            .data()
            .or_else(|| self.endpoints.basic.data())
            .unwrap_or_else(HealthSummary::unknown)
    }

    pub fn loading(&self) -> bool {
        self.endpoints.detailed.loading() || self.endpoints.basic.loading()
    }

    pub fn error(&self) -> Option<Arc<PortalError>> {
        self.endpoints
            .detailed
            .error()
            .or_else(|| self.endpoints.basic.error())
    }

    /// Whether the detailed endpoint is the active one
    pub fn is_detailed(&self) -> bool {
        self.endpoints.is_detailed()
    }

    /// Re-evaluate token presence and switch endpoints if it changed.
    /// Returns whether the active endpoint changed.
    pub fn sync_token(&self) -> bool {
        self.endpoints.sync_token()
    }

    /// Fetch now from the endpoint the token present at call time selects.
    /// A fetch the switch already started is awaited instead of repeated.
    pub async fn refresh(&self) {
        let switched = self.endpoints.sync_token();
        let active = self.endpoints.active();
        if switched || active.loading() {
            active.settled().await;
        } else {
            active.refetch().await;
        }
    }

    /// Observe changes of either underlying hook
    pub fn watch(&self) -> HealthWatch {
        HealthWatch {
            detailed: self.endpoints.detailed.subscribe(),
            basic: self.endpoints.basic.subscribe(),
        }
    }

    pub fn dispose(&self) {
        self.follower.abort();
        self.endpoints.detailed.dispose();
        self.endpoints.basic.dispose();
    }
}

impl Drop for HealthMonitor {
    fn drop(&mut self) {
        self.follower.abort();
    }
}

/// Change notifications for a [`HealthMonitor`]
pub struct HealthWatch {
    detailed: watch::Receiver<PollState<HealthSummary>>,
    basic: watch::Receiver<PollState<HealthSummary>>,
}

impl HealthWatch {
    /// Wait until either hook publishes a new state. Returns `false` once
    /// the monitor is gone.
    pub async fn changed(&mut self) -> bool {
        tokio::select! {
            result = self.detailed.changed() => result.is_ok(),
            result = self.basic.changed() => result.is_ok(),
        }
    }
}

fn detailed_options(enabled: bool, interval: Option<Duration>) -> PollOptions<HealthSummary> {
    PollOptions::new(DETAILED_HEALTH_PATH)
        .enabled(enabled)
        .authenticated()
        .transform(summarize_detailed)
        .polling_interval(interval.filter(|_| enabled))
}

fn basic_options(enabled: bool, interval: Option<Duration>) -> PollOptions<HealthSummary> {
    PollOptions::new(BASIC_HEALTH_PATH)
        .enabled(enabled)
        .transform(summarize_basic)
        .polling_interval(interval.filter(|_| enabled))
}
