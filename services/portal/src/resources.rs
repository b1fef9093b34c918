//! Authenticated resource hooks and their payloads

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::api::ApiClient;
use crate::auth::UserSummary;
use crate::poll::{PollOptions, TokenGated};

pub const PROVIDERS_PATH: &str = "/providers";
pub const USERS_PATH: &str = "/users";
pub const DEFAULT_SCORECARD_LIMIT: u32 = 6;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderItem {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
    pub available: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Map<String, Value>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvidersResponse {
    #[serde(default)]
    pub providers: Vec<ProviderItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScorecardEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub title: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScorecardResponse {
    #[serde(default)]
    pub items: Vec<ScorecardEntry>,
    #[serde(default)]
    pub total: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserListResponse {
    #[serde(default)]
    pub users: Vec<UserSummary>,
}

pub fn scorecard_path(limit: u32) -> String {
    format!("/api/v1/scorecard?limit={}", limit)
}

/// Poll `GET /providers` while a token is available. Signing in or out
/// later resumes or pauses polling.
pub fn providers_status(
    client: &ApiClient,
    interval: Option<Duration>,
) -> TokenGated<ProvidersResponse> {
    TokenGated::new(client.clone(), providers_options(interval))
}

pub fn providers_options(interval: Option<Duration>) -> PollOptions<ProvidersResponse> {
    PollOptions::new(PROVIDERS_PATH)
        .authenticated()
        .polling_interval(interval)
}

/// Poll the latest `limit` scorecard entries while a token is available
pub fn scorecard(
    client: &ApiClient,
    limit: u32,
    interval: Option<Duration>,
) -> TokenGated<ScorecardResponse> {
    TokenGated::new(client.clone(), scorecard_options(limit, interval))
}

pub fn scorecard_options(limit: u32, interval: Option<Duration>) -> PollOptions<ScorecardResponse> {
    PollOptions::new(scorecard_path(limit))
        .authenticated()
        .polling_interval(interval)
}
