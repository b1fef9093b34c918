//! Scripted transport for timing-sensitive unit tests

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::api::ApiClient;
use crate::auth::AuthContext;
use crate::config::RuntimeConfig;
use crate::http::{HttpClient, HttpRequest, HttpResponse};
use crate::storage::BrowserStorage;

/// One canned response, optionally delayed
#[derive(Debug, Clone)]
pub(crate) struct Reply {
    pub delay: Duration,
    pub status: u16,
    pub body: String,
}

impl Reply {
    pub fn json(body: &str) -> Self {
        Self {
            delay: Duration::ZERO,
            status: 200,
            body: body.to_string(),
        }
    }

    pub fn status(status: u16) -> Self {
        Self {
            delay: Duration::ZERO,
            status,
            body: "{}".to_string(),
        }
    }

    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// Replies per URL in order; the last reply for a URL repeats forever.
/// Unknown URLs answer 404.
#[derive(Default)]
pub(crate) struct ScriptedClient {
    routes: Mutex<HashMap<String, VecDeque<Reply>>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedClient {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn on(&self, url: &str, reply: Reply) {
        self.routes
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .push_back(reply);
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn count(&self, url: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.url == url)
            .count()
    }

    fn next_reply(&self, url: &str) -> Reply {
        let mut routes = self.routes.lock().unwrap();
        match routes.get_mut(url) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap(),
            Some(queue) if !queue.is_empty() => queue[0].clone(),
            _ => Reply::status(404),
        }
    }
}

#[async_trait]
impl HttpClient for ScriptedClient {
    async fn send(&self, request: HttpRequest) -> crate::Result<HttpResponse> {
        let reply = self.next_reply(&request.url);
        self.requests.lock().unwrap().push(request);
        if !reply.delay.is_zero() {
            tokio::time::sleep(reply.delay).await;
        }
        Ok(HttpResponse {
            status: reply.status,
            content_type: Some("application/json".to_string()),
            body: reply.body,
        })
    }
}

/// Client with an empty API base, so request URLs equal their paths
pub(crate) fn api_client(http: Arc<dyn HttpClient>) -> ApiClient {
    api_client_with(http, AuthContext::load(BrowserStorage::in_memory()))
}

pub(crate) fn api_client_with(http: Arc<dyn HttpClient>, auth: AuthContext) -> ApiClient {
    ApiClient::new(http, RuntimeConfig::default(), auth)
}
