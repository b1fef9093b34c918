//! Sign-in, sign-out and the signed-in user listing

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::api::{ApiClient, RequestOptions};
use crate::auth::{AuthSession, UserSummary};
use crate::poll::{ApiHook, PollData};
use crate::resources::{UserListResponse, USERS_PATH};
use crate::router::{NavigateOptions, Page, Router};
use crate::PortalError;

pub const SIGN_IN_PATH: &str = "/api/v1/sign-in";
pub const SIGN_OUT_PATH: &str = "/api/v1/sign-out";
pub const MISSING_CREDENTIALS: &str = "Username and password are required.";

#[derive(Clone, Serialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Checked before anything goes over the wire
    pub fn validate(&self) -> crate::Result<()> {
        if self.username.trim().is_empty() || self.password.trim().is_empty() {
            return Err(PortalError::Validation(MISSING_CREDENTIALS.to_string()));
        }
        Ok(())
    }
}

/// `POST /api/v1/sign-in`
#[derive(Debug, Clone, Deserialize)]
pub struct SignInResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub refresh_expires_in: Option<u64>,
    #[serde(default)]
    pub user: Option<UserSummary>,
}

/// `POST /api/v1/sign-out`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SignOutResponse {
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UsersOutcome {
    Users(Vec<UserSummary>),
    /// The backend rejected the token; the session was cleared
    SessionExpired,
}

/// Session flows on top of the API client and router
#[derive(Debug, Clone)]
pub struct SessionService {
    client: ApiClient,
    router: Router,
}

impl SessionService {
    pub fn new(client: ApiClient, router: Router) -> Self {
        Self { client, router }
    }

    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Exchange credentials for tokens, store them and go to the dashboard
    pub async fn sign_in(&self, credentials: &Credentials) -> crate::Result<AuthSession> {
        credentials.validate()?;

        let options = RequestOptions::post(SIGN_IN_PATH).json(json!({
            "username": credentials.username.trim(),
            "password": credentials.password,
        }));
        let response: SignInResponse = self.client.fetch(&options).await?;
        if response.access_token.is_empty() {
            return Err(PortalError::Transform(
                "sign-in response carries no access token".to_string(),
            ));
        }

        let auth = self.client.auth();
        auth.set_auth(Some(response.access_token), response.user);
        auth.set_refresh_token(response.refresh_token.as_deref());
        tracing::info!("Signed in as {}", credentials.username.trim());

        self.router
            .navigate_to(Page::Dashboard, NavigateOptions::replace());
        Ok(auth.session())
    }

    /// Revoke the refresh token if possible and drop the local session.
    /// Backend failures are logged and otherwise ignored.
    pub async fn sign_out(&self) {
        let auth = self.client.auth();
        let mut options = RequestOptions::post(SIGN_OUT_PATH).authenticated();
        if let Some(refresh_token) = auth.refresh_token() {
            options = options.json(json!({ "refresh_token": refresh_token }));
        }

        match self.client.fetch::<SignOutResponse>(&options).await {
            Ok(response) => tracing::info!(
                "Signed out: {}",
                response.message.as_deref().unwrap_or("ok")
            ),
            Err(e) => tracing::warn!("Sign-out request failed, clearing session anyway: {}", e),
        }

        auth.clear_auth();
        self.router.navigate_to(Page::Access, NavigateOptions::default());
    }

    /// `GET /users`. A 401 ends the session and sends the user to the
    /// access page.
    pub async fn list_users(&self) -> crate::Result<UsersOutcome> {
        let options = RequestOptions::get(USERS_PATH).authenticated();
        match self.client.fetch::<UserListResponse>(&options).await {
            Ok(response) => Ok(UsersOutcome::Users(response.users)),
            Err(e) if e.is_unauthorized() => {
                self.expire();
                Ok(UsersOutcome::SessionExpired)
            }
            Err(e) => Err(e),
        }
    }

    /// Wait for a resource hook's current fetch and take its data. A 401
    /// ends the session the same way [`list_users`](Self::list_users) does.
    pub async fn settle<T: PollData>(&self, hook: &ApiHook<T>) -> crate::Result<Option<T>> {
        hook.settled().await;
        let state = hook.state();
        let Some(error) = state.error else {
            return Ok(state.data);
        };
        if error.is_unauthorized() {
            self.expire();
        }
        Err(match &*error {
            PortalError::Status { url, status } => PortalError::Status {
                url: url.clone(),
                status: *status,
            },
            other => PortalError::Http(other.to_string()),
        })
    }

    /// Forced logout after the backend rejected the session
    pub fn expire(&self) {
        tracing::warn!("Session rejected by backend, signing out");
        self.client.auth().clear_auth();
        self.router
            .navigate_to(Page::Access, NavigateOptions::replace());
    }
}
