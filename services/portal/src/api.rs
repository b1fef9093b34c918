//! Authenticated fetch against the Kubex backend
//!
//! [`ApiClient::request`] builds the absolute URL, attaches JSON and bearer
//! headers, and normalizes the response: non-2xx statuses become
//! [`PortalError::Status`], `204` becomes an empty object, JSON bodies are
//! parsed and anything else comes back as a string. Cancellation is reported
//! as [`Fetched::Cancelled`], never as an error.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::auth::AuthContext;
use crate::config::RuntimeConfig;
use crate::http::{HttpClient, HttpRequest, HttpResponse, Method};
use crate::storage::SESSION_TOKEN_KEY;
use crate::PortalError;

const JSON_CONTENT_TYPE: &str = "application/json";

/// Request payload
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    /// Structured value, serialized as JSON with a JSON content type
    Json(Value),
    /// Binary or form payload, sent untouched
    Raw {
        content_type: Option<String>,
        bytes: Vec<u8>,
    },
}

/// What to fetch and how
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestOptions {
    pub path: String,
    pub method: Method,
    pub body: Option<RequestBody>,
    pub headers: Vec<(String, String)>,
    pub auth: bool,
}

impl RequestOptions {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            method: Method::Post,
            ..Self::default()
        }
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(RequestBody::Json(body));
        self
    }

    pub fn raw(mut self, content_type: Option<&str>, bytes: Vec<u8>) -> Self {
        self.body = Some(RequestBody::Raw {
            content_type: content_type.map(str::to_string),
            bytes,
        });
        self
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn authenticated(mut self) -> Self {
        self.auth = true;
        self
    }
}

/// Outcome of a request that may have been cancelled by its caller
#[derive(Debug, Clone, PartialEq)]
pub enum Fetched<T> {
    Completed(T),
    /// The caller's cancellation token fired first; nothing to apply
    Cancelled,
}

impl<T> Fetched<T> {
    pub fn completed(self) -> Option<T> {
        match self {
            Fetched::Completed(value) => Some(value),
            Fetched::Cancelled => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Fetched::Cancelled)
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Fetched<U> {
        match self {
            Fetched::Completed(value) => Fetched::Completed(f(value)),
            Fetched::Cancelled => Fetched::Cancelled,
        }
    }
}

/// Client for the backend API. Cheap to clone.
#[derive(Clone)]
pub struct ApiClient {
    http: Arc<dyn HttpClient>,
    config: Arc<RuntimeConfig>,
    auth: AuthContext,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("api_base", &self.config.api_base)
            .finish()
    }
}

impl ApiClient {
    pub fn new(http: Arc<dyn HttpClient>, config: RuntimeConfig, auth: AuthContext) -> Self {
        Self {
            http,
            config: Arc::new(config),
            auth,
        }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn auth(&self) -> &AuthContext {
        &self.auth
    }

    /// Bearer token for authenticated requests: the in-memory auth state
    /// first, then session storage, then the statically configured token.
    pub fn resolve_token(&self) -> Option<String> {
        self.auth
            .access_token()
            .or_else(|| {
                self.auth
                    .storage()
                    .session
                    .get(SESSION_TOKEN_KEY)
                    .filter(|t| !t.is_empty())
            })
            .or_else(|| self.config.api_token.clone().filter(|t| !t.is_empty()))
    }

    pub fn has_token(&self) -> bool {
        self.resolve_token().is_some()
    }

    /// Turn request options into a wire request
    pub fn build_request(&self, options: &RequestOptions) -> crate::Result<HttpRequest> {
        let url = self.config.api_url(&options.path);
        let mut headers = vec![("Accept".to_string(), JSON_CONTENT_TYPE.to_string())];
        for (name, value) in &options.headers {
            set_header(&mut headers, name, value);
        }

        let body = match &options.body {
            Some(RequestBody::Json(value)) => {
                set_header(&mut headers, "Content-Type", JSON_CONTENT_TYPE);
                Some(serde_json::to_vec(value)?)
            }
            Some(RequestBody::Raw {
                content_type,
                bytes,
            }) => {
                if let Some(content_type) = content_type {
                    set_header(&mut headers, "Content-Type", content_type);
                }
                Some(bytes.clone())
            }
            None => None,
        };

        if options.auth {
            match self.resolve_token() {
                Some(token) => {
                    set_header(&mut headers, "Authorization", &format!("Bearer {}", token))
                }
                None => tracing::debug!("No token available for {}, sending unauthenticated", url),
            }
        }

        Ok(HttpRequest {
            method: options.method,
            url,
            headers,
            body,
        })
    }

    /// Send a request, giving up as soon as `cancel` fires
    pub async fn request(
        &self,
        options: &RequestOptions,
        cancel: &CancellationToken,
    ) -> crate::Result<Fetched<Value>> {
        if cancel.is_cancelled() {
            return Ok(Fetched::Cancelled);
        }

        let request = self.build_request(options)?;
        let method = request.method;
        let url = request.url.clone();

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!("{} {} cancelled", method, url);
                return Ok(Fetched::Cancelled);
            }
            result = self.http.send(request) => result?,
        };

        decode_response(&url, response).map(Fetched::Completed)
    }

    /// Send a request and deserialize the payload into `T`
    pub async fn request_json<T: DeserializeOwned>(
        &self,
        options: &RequestOptions,
        cancel: &CancellationToken,
    ) -> crate::Result<Fetched<T>> {
        match self.request(options, cancel).await? {
            Fetched::Completed(value) => Ok(Fetched::Completed(serde_json::from_value(value)?)),
            Fetched::Cancelled => Ok(Fetched::Cancelled),
        }
    }

    /// Send a request nobody will cancel
    pub async fn fetch<T: DeserializeOwned>(&self, options: &RequestOptions) -> crate::Result<T> {
        let never = CancellationToken::new();
        match self.request_json(options, &never).await? {
            Fetched::Completed(value) => Ok(value),
            Fetched::Cancelled => Err(PortalError::Http(format!(
                "{} {} was cancelled",
                options.method, options.path
            ))),
        }
    }
}

fn decode_response(url: &str, response: HttpResponse) -> crate::Result<Value> {
    if !response.is_success() {
        return Err(PortalError::Status {
            url: url.to_string(),
            status: response.status,
        });
    }

    if response.status == 204 {
        return Ok(Value::Object(serde_json::Map::new()));
    }

    let is_json = response
        .content_type
        .as_deref()
        .is_some_and(|ct| ct.to_ascii_lowercase().contains(JSON_CONTENT_TYPE));
    if is_json {
        Ok(serde_json::from_str(&response.body)?)
    } else {
        Ok(Value::String(response.body))
    }
}

fn set_header(headers: &mut Vec<(String, String)>, name: &str, value: &str) {
    match headers
        .iter_mut()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
    {
        Some(entry) => entry.1 = value.to_string(),
        None => headers.push((name.to_string(), value.to_string())),
    }
}
