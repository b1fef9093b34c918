//! Auth context: the current access token and user, mirrored to session storage

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::storage::{BrowserStorage, SESSION_REFRESH_KEY, SESSION_TOKEN_KEY, SESSION_USER_KEY};

/// User as returned by the backend. Passed through untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: String,
    pub username: String,
    pub email: String,
    pub name: String,
    pub role: String,
    pub active: bool,
}

/// Snapshot of the signed-in state
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthSession {
    pub access_token: Option<String>,
    pub user: Option<UserSummary>,
}

impl AuthSession {
    pub fn is_authenticated(&self) -> bool {
        self.access_token.is_some()
    }
}

/// Shared handle to the auth state. Cloning is cheap; all clones see the
/// same state. The context never talks to the network.
#[derive(Clone)]
pub struct AuthContext {
    inner: Arc<AuthInner>,
}

struct AuthInner {
    storage: BrowserStorage,
    state: watch::Sender<AuthSession>,
}

impl std::fmt::Debug for AuthContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let session = self.session();
        f.debug_struct("AuthContext")
            .field("authenticated", &session.is_authenticated())
            .field("user", &session.user.as_ref().map(|u| u.username.clone()))
            .finish()
    }
}

impl AuthContext {
    /// Build the context from whatever session storage already holds
    pub fn load(storage: BrowserStorage) -> Self {
        let access_token = storage
            .session
            .get(SESSION_TOKEN_KEY)
            .filter(|t| !t.is_empty());
        let user = storage.session.get(SESSION_USER_KEY).and_then(|raw| {
            serde_json::from_str::<UserSummary>(&raw)
                .map_err(|e| tracing::warn!("Discarding unreadable stored user: {}", e))
                .ok()
        });

        for key in [SESSION_TOKEN_KEY, SESSION_USER_KEY] {
            if let Err(e) = storage.local.remove(key) {
                tracing::warn!("Failed to purge {} from local storage: {}", key, e);
            }
        }

        tracing::debug!(
            "Auth context loaded: token={}, user={:?}",
            access_token.is_some(),
            user.as_ref().map(|u| &u.username)
        );

        let (state, _) = watch::channel(AuthSession { access_token, user });
        Self {
            inner: Arc::new(AuthInner { storage, state }),
        }
    }

    pub fn session(&self) -> AuthSession {
        self.inner.state.borrow().clone()
    }

    pub fn access_token(&self) -> Option<String> {
        self.inner.state.borrow().access_token.clone()
    }

    pub fn user(&self) -> Option<UserSummary> {
        self.inner.state.borrow().user.clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner.state.borrow().is_authenticated()
    }

    pub fn storage(&self) -> &BrowserStorage {
        &self.inner.storage
    }

    /// Observe every change of the auth state
    pub fn subscribe(&self) -> watch::Receiver<AuthSession> {
        self.inner.state.subscribe()
    }

    /// Replace the auth state and write it through to session storage.
    /// Copies of the same keys in local storage are purged either way.
    pub fn set_auth(&self, access_token: Option<String>, user: Option<UserSummary>) {
        let access_token = access_token.filter(|t| !t.is_empty());
        let storage = &self.inner.storage;

        match &access_token {
            Some(token) => self.write(storage.session.set(SESSION_TOKEN_KEY, token)),
            None => self.write(storage.session.remove(SESSION_TOKEN_KEY)),
        }
        self.write(storage.local.remove(SESSION_TOKEN_KEY));

        match &user {
            Some(summary) => match serde_json::to_string(summary) {
                Ok(json) => self.write(storage.session.set(SESSION_USER_KEY, &json)),
                Err(e) => tracing::warn!("Failed to encode user for storage: {}", e),
            },
            None => self.write(storage.session.remove(SESSION_USER_KEY)),
        }
        self.write(storage.local.remove(SESSION_USER_KEY));

        tracing::info!(
            "Auth state set: authenticated={}, user={:?}",
            access_token.is_some(),
            user.as_ref().map(|u| &u.username)
        );
        self.inner.state.send_replace(AuthSession { access_token, user });
    }

    /// Sign out locally: drop token, user and refresh token
    pub fn clear_auth(&self) {
        self.set_auth(None, None);
        self.write(self.inner.storage.session.remove(SESSION_REFRESH_KEY));
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.inner
            .storage
            .session
            .get(SESSION_REFRESH_KEY)
            .filter(|t| !t.is_empty())
    }

    pub fn set_refresh_token(&self, refresh_token: Option<&str>) {
        let session = &self.inner.storage.session;
        match refresh_token.filter(|t| !t.is_empty()) {
            Some(token) => self.write(session.set(SESSION_REFRESH_KEY, token)),
            None => self.write(session.remove(SESSION_REFRESH_KEY)),
        }
    }

    fn write(&self, result: crate::Result<()>) {
        if let Err(e) = result {
            tracing::warn!("Failed to update auth storage: {}", e);
        }
    }
}

#[cfg(test)]
pub(crate) fn test_user(username: &str) -> UserSummary {
    UserSummary {
        id: format!("id-{}", username),
        username: username.to_string(),
        email: format!("{}@kubex.world", username),
        name: username.to_string(),
        role: "admin".to_string(),
        active: true,
    }
}
