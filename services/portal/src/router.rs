//! Client-side router
//!
//! [`Router`] tracks the current path of a [`History`] and keeps every
//! internal navigation under the application mount prefix. [`Page`] is the
//! route table; it knows nothing about history and can be tested alone.

use std::fmt::Display;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::watch;

/// Where the portal is mounted
pub const APP_MOUNT_PREFIX: &str = "/app";

/// Browser history as the router sees it
pub trait History: Send + Sync {
    /// Current pathname, without query or hash
    fn location(&self) -> String;

    fn push(&self, path: &str);

    fn replace(&self, path: &str);

    /// Step back; `false` when already at the oldest entry
    fn back(&self) -> bool;

    /// Step forward; `false` when already at the newest entry
    fn forward(&self) -> bool;

    /// Change only the fragment, which adds an entry like a browser does
    fn set_hash(&self, hash: &str);
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Entry {
    path: String,
    hash: String,
}

#[derive(Debug)]
struct Entries {
    stack: Vec<Entry>,
    index: usize,
}

/// In-process history stack
#[derive(Debug)]
pub struct MemoryHistory {
    entries: Mutex<Entries>,
}

impl MemoryHistory {
    pub fn new(initial: &str) -> Self {
        let path = if initial.is_empty() { "/" } else { initial };
        Self {
            entries: Mutex::new(Entries {
                stack: vec![Entry {
                    path: path.to_string(),
                    hash: String::new(),
                }],
                index: 0,
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.lock().stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().stack.is_empty()
    }

    pub fn hash(&self) -> String {
        let entries = self.lock();
        entries.stack[entries.index].hash.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Entries> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn push_entry(&self, entry: Entry) {
        let mut entries = self.lock();
        let keep = entries.index + 1;
        entries.stack.truncate(keep);
        entries.stack.push(entry);
        entries.index = keep;
    }
}

impl Default for MemoryHistory {
    fn default() -> Self {
        Self::new("/")
    }
}

impl History for MemoryHistory {
    fn location(&self) -> String {
        let entries = self.lock();
        entries.stack[entries.index].path.clone()
    }

    fn push(&self, path: &str) {
        self.push_entry(Entry {
            path: path.to_string(),
            hash: String::new(),
        });
    }

    fn replace(&self, path: &str) {
        let mut entries = self.lock();
        let index = entries.index;
        entries.stack[index] = Entry {
            path: path.to_string(),
            hash: String::new(),
        };
    }

    fn back(&self) -> bool {
        let mut entries = self.lock();
        if entries.index == 0 {
            return false;
        }
        entries.index -= 1;
        true
    }

    fn forward(&self) -> bool {
        let mut entries = self.lock();
        if entries.index + 1 >= entries.stack.len() {
            return false;
        }
        entries.index += 1;
        true
    }

    fn set_hash(&self, hash: &str) {
        let path = self.location();
        self.push_entry(Entry {
            path,
            hash: hash.trim_start_matches('#').to_string(),
        });
    }
}

/// Pages of the portal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Page {
    #[default]
    Landing,
    Access,
    Manifesto,
    Dashboard,
    Status,
    NotFound,
}

impl Page {
    pub fn from_path(path: &str) -> Self {
        match path {
            "/" | "/app/" => Self::Landing,
            "/app/access" | "/app/auth" => Self::Access,
            "/app/manifesto" | "/app/about" => Self::Manifesto,
            "/app/dashboard" => Self::Dashboard,
            "/app/status" => Self::Status,
            _ => Self::NotFound,
        }
    }

    pub fn to_path(&self) -> &'static str {
        match self {
            Self::Landing => "/app/",
            Self::Access => "/app/access",
            Self::Manifesto => "/app/manifesto",
            Self::Dashboard => "/app/dashboard",
            Self::Status => "/app/status",
            Self::NotFound => "/app/404",
        }
    }

    pub fn requires_auth(&self) -> bool {
        matches!(self, Self::Dashboard)
    }

    /// Signed-in users have no business on the sign-in page
    pub fn should_redirect_when_authenticated(&self) -> bool {
        matches!(self, Self::Access)
    }

    /// Where to send the user instead of this page, if anywhere
    pub fn guard(&self, token_present: bool) -> Option<Page> {
        if self.requires_auth() && !token_present {
            Some(Self::Access)
        } else if self.should_redirect_when_authenticated() && token_present {
            Some(Self::Dashboard)
        } else {
            None
        }
    }
}

impl Display for Page {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_path())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NavigateOptions {
    pub replace: bool,
}

impl NavigateOptions {
    pub fn replace() -> Self {
        Self { replace: true }
    }
}

/// Path state driven by a [`History`]. Cheap to clone.
#[derive(Clone)]
pub struct Router {
    history: Arc<dyn History>,
    prefix: Arc<str>,
    pathname: Arc<watch::Sender<String>>,
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("prefix", &self.prefix)
            .field("pathname", &*self.pathname.borrow())
            .finish()
    }
}

impl Router {
    pub fn new(history: Arc<dyn History>) -> Self {
        Self::with_prefix(history, APP_MOUNT_PREFIX)
    }

    pub fn with_prefix(history: Arc<dyn History>, prefix: &str) -> Self {
        let initial = non_empty_path(history.location());
        let (pathname, _) = watch::channel(initial);
        Self {
            history,
            prefix: Arc::from(prefix.trim_end_matches('/')),
            pathname: Arc::new(pathname),
        }
    }

    pub fn pathname(&self) -> String {
        self.pathname.borrow().clone()
    }

    pub fn page(&self) -> Page {
        Page::from_path(&self.pathname.borrow())
    }

    pub fn subscribe(&self) -> watch::Receiver<String> {
        self.pathname.subscribe()
    }

    /// Map `to` under the mount prefix. Paths already under it are kept.
    pub fn normalize(&self, to: &str) -> String {
        let prefix = &*self.prefix;
        if prefix.is_empty() {
            return format!("/{}", to.trim_start_matches('/'));
        }
        if to == prefix {
            return format!("{}/", prefix);
        }
        if to.starts_with(&format!("{}/", prefix)) {
            return to.to_string();
        }
        format!("{}/{}", prefix, to.trim_start_matches('/'))
    }

    /// Push (or replace) a history entry and update the path right away.
    /// Returns the normalized path.
    pub fn navigate(&self, to: &str, options: NavigateOptions) -> String {
        let normalized = self.normalize(to);
        if options.replace {
            self.history.replace(&normalized);
        } else {
            self.history.push(&normalized);
        }
        tracing::debug!(
            "Navigate {} -> {} ({})",
            to,
            normalized,
            if options.replace { "replace" } else { "push" }
        );
        self.pathname.send_replace(normalized.clone());
        normalized
    }

    pub fn navigate_to(&self, page: Page, options: NavigateOptions) -> String {
        self.navigate(page.to_path(), options)
    }

    /// Re-read the location after back/forward or a hash change
    pub fn on_location_change(&self) {
        let location = non_empty_path(self.history.location());
        self.pathname.send_if_modified(|current| {
            if *current == location {
                return false;
            }
            *current = location;
            true
        });
    }

    pub fn back(&self) -> bool {
        let moved = self.history.back();
        self.on_location_change();
        moved
    }

    pub fn forward(&self) -> bool {
        let moved = self.history.forward();
        self.on_location_change();
        moved
    }

    /// Current page after applying its guard. A guarded page is replaced
    /// in history by its redirect target.
    pub fn resolve(&self, token_present: bool) -> Page {
        let page = self.page();
        match page.guard(token_present) {
            Some(redirect) => {
                tracing::info!("Page {} is guarded, redirecting to {}", page, redirect);
                self.navigate_to(redirect, NavigateOptions::replace());
                redirect
            }
            None => page,
        }
    }

    /// Route a click on `link` through the router when it is a plain
    /// primary click on an internal path. Everything else is left to the
    /// default handling.
    pub fn handle_link_click(&self, link: &Link, click: &LinkClick) -> LinkAction {
        if click.default_prevented || click.is_modified() || link.is_external() {
            return LinkAction::Default;
        }
        LinkAction::Navigated(self.navigate(
            &link.to,
            NavigateOptions {
                replace: link.replace,
            },
        ))
    }
}

fn non_empty_path(path: String) -> String {
    if path.is_empty() {
        "/".to_string()
    } else {
        path
    }
}

/// An anchor the router may intercept
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Link {
    pub to: String,
    pub replace: bool,
    pub target: Option<String>,
    pub rel: Option<String>,
}

impl Link {
    pub fn new(to: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            ..Self::default()
        }
    }

    pub fn replace(mut self) -> Self {
        self.replace = true;
        self
    }

    pub fn target(mut self, target: &str) -> Self {
        self.target = Some(target.to_string());
        self
    }

    pub fn opens_new_tab(&self) -> bool {
        self.target.as_deref() == Some("_blank")
    }

    /// New-tab links and absolute http(s) URLs
    pub fn is_external(&self) -> bool {
        let to = self.to.to_ascii_lowercase();
        self.opens_new_tab() || to.starts_with("http:") || to.starts_with("https:")
    }

    /// `rel` to render; new-tab links default to `noopener noreferrer`
    pub fn rel(&self) -> Option<&str> {
        match (&self.rel, self.opens_new_tab()) {
            (Some(rel), _) => Some(rel),
            (None, true) => Some("noopener noreferrer"),
            (None, false) => None,
        }
    }
}

/// Mouse click as delivered to a link
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkClick {
    /// 0 is the primary button
    pub button: i16,
    pub meta_key: bool,
    pub alt_key: bool,
    pub ctrl_key: bool,
    pub shift_key: bool,
    pub default_prevented: bool,
}

impl LinkClick {
    pub fn primary() -> Self {
        Self::default()
    }

    pub fn is_modified(&self) -> bool {
        self.button != 0 || self.meta_key || self.alt_key || self.ctrl_key || self.shift_key
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkAction {
    /// The router handled it; holds the new path
    Navigated(String),
    /// Let the browser follow the link
    Default,
}
