//! Runtime configuration resolution and the CLI configuration file
//!
//! The runtime configuration tells the client where the backend lives and
//! which static token (if any) to fall back on. It is resolved once per
//! process from, in priority order:
//!
//! 1. direct overrides (`KUBEX_API_BASE`, `KUBEX_API_TOKEN`),
//! 2. the injected configuration object (`KUBEX_CONFIG` JSON, or the
//!    `runtime` section of the config file),
//! 3. defaults captured at build time (`KUBEX_DEFAULT_*`),
//! 4. the hard-coded fallback (no API base, no token, root mount).

use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const ENV_API_BASE: &str = "KUBEX_API_BASE";
pub const ENV_API_TOKEN: &str = "KUBEX_API_TOKEN";
pub const ENV_INJECTED_CONFIG: &str = "KUBEX_CONFIG";

const FALLBACK_APP_BASE_PATH: &str = "/";

/// A partially specified runtime configuration, as injected by the host
/// page or captured at build time. Keys use the camelCase names the
/// backend's deployment tooling writes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartialRuntimeConfig {
    #[serde(default)]
    pub api_base: Option<String>,
    #[serde(default)]
    pub api_token: Option<String>,
    #[serde(default)]
    pub app_base_path: Option<String>,
}

impl PartialRuntimeConfig {
    /// Defaults baked in at compile time
    pub fn build_defaults() -> Self {
        Self {
            api_base: option_env!("KUBEX_DEFAULT_API_BASE").map(str::to_string),
            api_token: option_env!("KUBEX_DEFAULT_API_TOKEN").map(str::to_string),
            app_base_path: option_env!("KUBEX_DEFAULT_APP_BASE").map(str::to_string),
        }
    }

    /// Parse an injected configuration object
    pub fn from_json(json: &str) -> crate::Result<Self> {
        serde_json::from_str(json).map_err(|e| {
            crate::PortalError::Config(format!("Invalid injected runtime config: {}", e))
        })
    }

    /// Fill fields missing in `self` from `other`
    pub fn or(self, other: PartialRuntimeConfig) -> Self {
        Self {
            api_base: non_empty(self.api_base).or_else(|| non_empty(other.api_base)),
            api_token: non_empty(self.api_token).or_else(|| non_empty(other.api_token)),
            app_base_path: non_empty(self.app_base_path)
                .or_else(|| non_empty(other.app_base_path)),
        }
    }
}

/// Values that take precedence over any injected configuration object
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuntimeOverrides {
    pub api_base: Option<String>,
    pub api_token: Option<String>,
}

impl RuntimeOverrides {
    pub fn from_env() -> Self {
        Self {
            api_base: std::env::var(ENV_API_BASE).ok(),
            api_token: std::env::var(ENV_API_TOKEN).ok(),
        }
    }
}

/// Fully resolved runtime configuration. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    pub api_base: String,
    pub api_token: Option<String>,
    pub app_base_path: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self::resolve(
            &RuntimeOverrides::default(),
            &PartialRuntimeConfig::default(),
            &PartialRuntimeConfig::default(),
        )
    }
}

impl RuntimeConfig {
    /// Resolve a configuration from its three sources. Never fails; empty
    /// strings count as absent.
    pub fn resolve(
        overrides: &RuntimeOverrides,
        injected: &PartialRuntimeConfig,
        defaults: &PartialRuntimeConfig,
    ) -> Self {
        let merged = PartialRuntimeConfig {
            api_base: overrides.api_base.clone(),
            api_token: overrides.api_token.clone(),
            app_base_path: None,
        }
        .or(injected.clone())
        .or(defaults.clone());

        Self {
            api_base: merged.api_base.unwrap_or_default(),
            api_token: merged.api_token,
            app_base_path: normalize_base_path(
                merged
                    .app_base_path
                    .as_deref()
                    .unwrap_or(FALLBACK_APP_BASE_PATH),
            ),
        }
    }

    /// Resolve from the process environment, layering `injected` (usually
    /// the config file's `runtime` section) under the `KUBEX_CONFIG` object.
    pub fn from_env_with(injected: PartialRuntimeConfig) -> Self {
        let from_env = match std::env::var(ENV_INJECTED_CONFIG) {
            Ok(json) => match PartialRuntimeConfig::from_json(&json) {
                Ok(partial) => partial,
                Err(e) => {
                    tracing::warn!("Ignoring {}: {}", ENV_INJECTED_CONFIG, e);
                    PartialRuntimeConfig::default()
                }
            },
            Err(_) => PartialRuntimeConfig::default(),
        };

        let config = Self::resolve(
            &RuntimeOverrides::from_env(),
            &from_env.or(injected),
            &PartialRuntimeConfig::build_defaults(),
        );
        tracing::debug!(
            "Resolved runtime config: api_base={:?}, token={}, app_base_path={:?}",
            config.api_base,
            if config.api_token.is_some() { "set" } else { "unset" },
            config.app_base_path
        );
        config
    }

    pub fn api_url(&self, path: &str) -> String {
        build_api_url(&self.api_base, path)
    }

    pub fn app_path(&self, path: &str) -> String {
        with_app_path(&self.app_base_path, path)
    }
}

static RUNTIME_CONFIG: OnceLock<RuntimeConfig> = OnceLock::new();

/// Process-wide runtime configuration, resolved from the environment on
/// first access. Use [`init_runtime_config`] before first access to layer a
/// config file underneath the environment.
pub fn runtime_config() -> &'static RuntimeConfig {
    RUNTIME_CONFIG.get_or_init(|| RuntimeConfig::from_env_with(PartialRuntimeConfig::default()))
}

/// Resolve and memoize the process-wide runtime configuration. Later calls
/// return the already resolved value and ignore `injected`.
pub fn init_runtime_config(injected: PartialRuntimeConfig) -> &'static RuntimeConfig {
    RUNTIME_CONFIG.get_or_init(|| RuntimeConfig::from_env_with(injected))
}

/// Join the API base and a request path without doubling the slash
pub fn build_api_url(api_base: &str, path: &str) -> String {
    let path = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    };
    if api_base.is_empty() {
        return path;
    }
    let base = api_base.strip_suffix('/').unwrap_or(api_base);
    format!("{}{}", base, path)
}

/// Prefix an application path with the normalized mount path
pub fn with_app_path(app_base_path: &str, path: &str) -> String {
    let normalized = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    };
    if normalized == "/" {
        return format!("{}/", app_base_path);
    }
    format!("{}{}", app_base_path, normalized)
}

/// Strip one trailing slash; the root mount becomes the empty prefix
fn normalize_base_path(path: &str) -> String {
    let path = if path.is_empty() { "/" } else { path };
    path.strip_suffix('/').unwrap_or(path).to_string()
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

/// Configuration file for the `kubex-portal` binary
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub runtime: PartialRuntimeConfig,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Polling periods for the resource hooks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    #[serde(default = "default_health_interval", with = "humantime_serde")]
    pub health_interval: Duration,
    #[serde(default, with = "humantime_serde")]
    pub providers_interval: Option<Duration>,
    #[serde(default = "default_scorecard_limit")]
    pub scorecard_limit: u32,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            health_interval: default_health_interval(),
            providers_interval: None,
            scorecard_limit: default_scorecard_limit(),
        }
    }
}

/// Where session and local storage live. Absent paths keep the scope in
/// memory for the lifetime of the process.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub session_path: Option<PathBuf>,
    #[serde(default)]
    pub local_path: Option<PathBuf>,
}

fn default_health_interval() -> Duration {
    Duration::from_secs(30)
}

fn default_scorecard_limit() -> u32 {
    6
}

/// Load configuration from a JSON file
pub fn load_config(path: &Path) -> crate::Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        crate::PortalError::Config(format!("Failed to read config file {:?}: {}", path, e))
    })?;
    let config: Config = serde_json::from_str(&content)?;
    Ok(config)
}
