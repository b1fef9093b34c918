//! Polling data hook
//!
//! An [`ApiHook`] keeps `{data, error, loading}` for one backend resource.
//! Each configuration (path, enabled flag, polling interval) runs as a single
//! subscription task that owns the interval timer and the one in-flight
//! request. Starting a new fetch cancels the previous one, so responses can
//! never be applied out of order. Changing the configuration or disposing the
//! hook bumps a generation counter before tearing the task down; state
//! updates from an older generation are discarded.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::api::{ApiClient, Fetched, RequestBody, RequestOptions};
use crate::http::Method;
use crate::PortalError;

/// Maps the raw payload to the hook's data type
pub type Transform<T> = Arc<dyn Fn(Value) -> crate::Result<T> + Send + Sync>;

/// Data a hook can hold. Without a transform the payload is deserialized.
pub trait PollData: DeserializeOwned + Clone + Send + Sync + 'static {}

impl<T> PollData for T where T: DeserializeOwned + Clone + Send + Sync + 'static {}

type FetchFuture = Pin<Box<dyn Future<Output = crate::Result<Fetched<Value>>> + Send>>;

/// Configuration of a hook
pub struct PollOptions<T> {
    pub path: String,
    pub enabled: bool,
    pub transform: Option<Transform<T>>,
    pub fallback_data: Option<T>,
    /// Fixed period between fetches; `None` or zero disables polling
    pub polling_interval: Option<Duration>,
    pub auth: bool,
    pub method: Method,
    pub body: Option<RequestBody>,
    pub headers: Vec<(String, String)>,
}

impl<T: Clone> Clone for PollOptions<T> {
    fn clone(&self) -> Self {
        Self {
            path: self.path.clone(),
            enabled: self.enabled,
            transform: self.transform.clone(),
            fallback_data: self.fallback_data.clone(),
            polling_interval: self.polling_interval,
            auth: self.auth,
            method: self.method,
            body: self.body.clone(),
            headers: self.headers.clone(),
        }
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for PollOptions<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollOptions")
            .field("path", &self.path)
            .field("enabled", &self.enabled)
            .field("transform", &self.transform.is_some())
            .field("fallback_data", &self.fallback_data)
            .field("polling_interval", &self.polling_interval)
            .field("auth", &self.auth)
            .field("method", &self.method)
            .finish_non_exhaustive()
    }
}

impl<T> PollOptions<T> {
    /// Enabled, unauthenticated `GET` without polling
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            enabled: true,
            transform: None,
            fallback_data: None,
            polling_interval: None,
            auth: false,
            method: Method::Get,
            body: None,
            headers: Vec::new(),
        }
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn transform(
        mut self,
        transform: impl Fn(Value) -> crate::Result<T> + Send + Sync + 'static,
    ) -> Self {
        self.transform = Some(Arc::new(transform));
        self
    }

    pub fn fallback_data(mut self, data: T) -> Self {
        self.fallback_data = Some(data);
        self
    }

    pub fn polling_interval(mut self, interval: Option<Duration>) -> Self {
        self.polling_interval = interval;
        self
    }

    pub fn authenticated(mut self) -> Self {
        self.auth = true;
        self
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn body(mut self, body: RequestBody) -> Self {
        self.body = Some(body);
        self
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    fn period(&self) -> Option<Duration> {
        self.polling_interval.filter(|p| !p.is_zero())
    }

    /// Changing any of these tears the subscription down and starts over
    fn subscription_key(&self) -> (&str, bool, Option<Duration>) {
        (&self.path, self.enabled, self.period())
    }

    fn request(&self) -> RequestOptions {
        RequestOptions {
            path: self.path.clone(),
            method: self.method,
            body: self.body.clone(),
            headers: self.headers.clone(),
            auth: self.auth,
        }
    }
}

/// Observable state of a hook
#[derive(Debug, Clone)]
pub struct PollState<T> {
    pub data: Option<T>,
    pub error: Option<Arc<PortalError>>,
    pub loading: bool,
}

impl<T> Default for PollState<T> {
    fn default() -> Self {
        Self {
            data: None,
            error: None,
            loading: false,
        }
    }
}

struct Shared<T> {
    options: Mutex<PollOptions<T>>,
    state: watch::Sender<PollState<T>>,
    generation: Mutex<u64>,
}

impl<T> Shared<T> {
    /// Apply `update` unless the subscription that produced it is gone
    fn apply(&self, generation: u64, update: impl FnOnce(&mut PollState<T>)) -> bool {
        let current = self.generation.lock().unwrap_or_else(PoisonError::into_inner);
        if *current != generation {
            return false;
        }
        self.state.send_modify(update);
        true
    }

    fn next_generation(&self) -> u64 {
        let mut current = self.generation.lock().unwrap_or_else(PoisonError::into_inner);
        *current += 1;
        *current
    }

    fn path(&self) -> String {
        self.options
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .path
            .clone()
    }
}

struct Subscription {
    cancel: CancellationToken,
    refetch: mpsc::UnboundedSender<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl Subscription {
    fn stop(self) {
        self.cancel.cancel();
        self.task.abort();
    }
}

/// Polling subscription to one backend resource.
///
/// Dropping the hook disposes it: the in-flight request is cancelled, the
/// timer stops and no further state changes are published.
pub struct ApiHook<T: PollData> {
    client: ApiClient,
    shared: Arc<Shared<T>>,
    subscription: Mutex<Option<Subscription>>,
    disposed: AtomicBool,
}

impl<T: PollData> ApiHook<T> {
    /// Create the hook and, when enabled, start fetching right away.
    /// Must be called from within a Tokio runtime.
    pub fn new(client: ApiClient, options: PollOptions<T>) -> Self {
        let (state, _) = watch::channel(PollState {
            data: options.fallback_data.clone(),
            error: None,
            loading: options.enabled,
        });
        let hook = Self {
            client,
            shared: Arc::new(Shared {
                options: Mutex::new(options),
                state,
                generation: Mutex::new(0),
            }),
            subscription: Mutex::new(None),
            disposed: AtomicBool::new(false),
        };
        hook.restart();
        hook
    }

    pub fn state(&self) -> PollState<T> {
        self.shared.state.borrow().clone()
    }

    pub fn data(&self) -> Option<T> {
        self.shared.state.borrow().data.clone()
    }

    pub fn error(&self) -> Option<Arc<PortalError>> {
        self.shared.state.borrow().error.clone()
    }

    pub fn loading(&self) -> bool {
        self.shared.state.borrow().loading
    }

    /// Observe state changes
    pub fn subscribe(&self) -> watch::Receiver<PollState<T>> {
        self.shared.state.subscribe()
    }

    pub fn options(&self) -> PollOptions<T> {
        self.shared
            .options
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the configuration. A new path, enabled flag or interval
    /// restarts the subscription; anything else applies from the next fetch.
    pub fn set_options(&self, options: PollOptions<T>) {
        let restart = {
            let mut current = self
                .shared
                .options
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            let restart = current.subscription_key() != options.subscription_key();
            *current = options;
            restart
        };
        if restart {
            self.restart();
        }
    }

    /// Fetch now, superseding any in-flight request. Resolves once that
    /// fetch settles. Does nothing while the hook is disabled.
    pub async fn refetch(&self) {
        let refetch = match self
            .subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            Some(subscription) => subscription.refetch.clone(),
            None => return,
        };

        let (done, settled) = oneshot::channel();
        if refetch.send(done).is_err() {
            return;
        }
        let _ = settled.await;
    }

    /// Resolve once no initial fetch or refetch is in flight. Returns right
    /// away while the hook is disabled or disposed.
    pub async fn settled(&self) {
        let cancel = match self
            .subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            Some(subscription) => subscription.cancel.clone(),
            None => return,
        };

        let mut updates = self.subscribe();
        tokio::select! {
            _ = cancel.cancelled() => {}
            _ = updates.wait_for(|state| !state.loading) => {}
        }
    }

    /// Stop for good. Later responses are discarded and option changes no
    /// longer restart the subscription.
    pub fn dispose(&self) {
        self.disposed.store(true, Ordering::SeqCst);
        self.shared.next_generation();
        if let Some(subscription) = self
            .subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            tracing::debug!("Disposing poll subscription for {}", self.shared.path());
            subscription.stop();
        }
    }

    fn restart(&self) {
        let mut slot = self
            .subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if self.disposed.load(Ordering::SeqCst) {
            return;
        }
        let generation = self.shared.next_generation();
        if let Some(previous) = slot.take() {
            previous.stop();
        }

        let options = self.options();
        if !options.enabled {
            tracing::debug!("Polling for {} disabled", options.path);
            self.shared.state.send_modify(|state| state.loading = false);
            return;
        }
        // The initial fetch counts as loading from the moment of the restart
        self.shared
            .state
            .send_if_modified(|state| !std::mem::replace(&mut state.loading, true));

        let cancel = CancellationToken::new();
        let (refetch, commands) = mpsc::unbounded_channel();
        let task = tokio::spawn(run_subscription(
            self.client.clone(),
            Arc::clone(&self.shared),
            generation,
            cancel.clone(),
            commands,
            options.period(),
        ));
        *slot = Some(Subscription {
            cancel,
            refetch,
            task,
        });
    }
}

impl<T: PollData> Drop for ApiHook<T> {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// A hook that is enabled exactly while the client can present a token.
/// It follows sign-in and sign-out on its own; dropping it disposes the hook.
pub struct TokenGated<T: PollData> {
    hook: Arc<ApiHook<T>>,
    follower: JoinHandle<()>,
}

impl<T: PollData> TokenGated<T> {
    /// Must be called from within a Tokio runtime.
    pub fn new(client: ApiClient, options: PollOptions<T>) -> Self {
        let mut sessions = client.auth().subscribe();
        let hook = Arc::new(ApiHook::new(client.clone(), options.enabled(client.has_token())));

        let weak = Arc::downgrade(&hook);
        let follower = tokio::spawn(async move {
            while sessions.changed().await.is_ok() {
                let Some(hook) = weak.upgrade() else { break };
                let enabled = client.has_token();
                let options = hook.options();
                if options.enabled != enabled {
                    tracing::debug!(
                        "Token {}, {} polling of {}",
                        if enabled { "appeared" } else { "gone" },
                        if enabled { "resuming" } else { "pausing" },
                        options.path
                    );
                    hook.set_options(options.enabled(enabled));
                }
            }
        });

        Self { hook, follower }
    }

    pub fn dispose(&self) {
        self.follower.abort();
        self.hook.dispose();
    }
}

impl<T: PollData> std::ops::Deref for TokenGated<T> {
    type Target = ApiHook<T>;

    fn deref(&self) -> &ApiHook<T> {
        &self.hook
    }
}

impl<T: PollData> Drop for TokenGated<T> {
    fn drop(&mut self) {
        self.follower.abort();
    }
}

struct InFlight<T> {
    cancel: CancellationToken,
    future: FetchFuture,
    transform: Option<Transform<T>>,
    shows_loading: bool,
    done: Option<oneshot::Sender<()>>,
}

impl<T: PollData> InFlight<T> {
    fn start(
        client: &ApiClient,
        shared: &Shared<T>,
        generation: u64,
        parent: &CancellationToken,
        shows_loading: bool,
        done: Option<oneshot::Sender<()>>,
    ) -> Self {
        let (request, transform) = {
            let options = shared.options.lock().unwrap_or_else(PoisonError::into_inner);
            (options.request(), options.transform.clone())
        };

        shared.apply(generation, |state| {
            state.error = None;
            if shows_loading {
                state.loading = true;
            }
        });

        let cancel = parent.child_token();
        let token = cancel.clone();
        let client = client.clone();
        let future: FetchFuture = Box::pin(async move { client.request(&request, &token).await });

        Self {
            cancel,
            future,
            transform,
            shows_loading,
            done,
        }
    }

    fn finish(self, shared: &Shared<T>, generation: u64, outcome: crate::Result<Fetched<Value>>) {
        let shows_loading = self.shows_loading;
        let clear_loading = |state: &mut PollState<T>| {
            if shows_loading {
                state.loading = false;
            }
        };

        match outcome.and_then(|fetched| match fetched {
            Fetched::Completed(raw) => decode(self.transform.as_ref(), raw).map(Some),
            Fetched::Cancelled => Ok(None),
        }) {
            Ok(Some(data)) => {
                shared.apply(generation, |state| {
                    state.data = Some(data);
                    clear_loading(state);
                });
            }
            Ok(None) => {
                shared.apply(generation, clear_loading);
            }
            Err(e) => {
                tracing::debug!("Fetch for {} failed: {}", shared.path(), e);
                shared.apply(generation, |state| {
                    state.error = Some(Arc::new(e));
                    clear_loading(state);
                });
            }
        }

        if let Some(done) = self.done {
            let _ = done.send(());
        }
    }

    /// Cancel without applying anything but the loading flag
    fn supersede(self, shared: &Shared<T>, generation: u64) {
        self.cancel.cancel();
        if self.shows_loading {
            shared.apply(generation, |state| state.loading = false);
        }
    }
}

fn decode<T: PollData>(transform: Option<&Transform<T>>, raw: Value) -> crate::Result<T> {
    match transform {
        Some(transform) => transform(raw),
        None => Ok(serde_json::from_value(raw)?),
    }
}

async fn settle<T>(inflight: &mut Option<InFlight<T>>) -> crate::Result<Fetched<Value>> {
    match inflight {
        Some(fetch) => fetch.future.as_mut().await,
        None => std::future::pending().await,
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn run_subscription<T: PollData>(
    client: ApiClient,
    shared: Arc<Shared<T>>,
    generation: u64,
    cancel: CancellationToken,
    mut commands: mpsc::UnboundedReceiver<oneshot::Sender<()>>,
    period: Option<Duration>,
) {
    let path = shared.path();
    tracing::debug!("Starting poll subscription for {} (interval {:?})", path, period);

    let mut ticker = period.map(|period| {
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        ticker
    });
    let mut inflight = Some(InFlight::start(
        &client, &shared, generation, &cancel, true, None,
    ));

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            outcome = settle(&mut inflight) => {
                if let Some(fetch) = inflight.take() {
                    fetch.finish(&shared, generation, outcome);
                }
            }
            Some(done) = commands.recv() => {
                if let Some(previous) = inflight.take() {
                    tracing::debug!("Refetch of {} supersedes in-flight request", path);
                    previous.supersede(&shared, generation);
                }
                inflight = Some(InFlight::start(
                    &client, &shared, generation, &cancel, true, Some(done),
                ));
            }
            _ = next_tick(&mut ticker) => {
                tracing::debug!("Polling tick for {}", path);
                if let Some(previous) = inflight.take() {
                    previous.supersede(&shared, generation);
                }
                inflight = Some(InFlight::start(
                    &client, &shared, generation, &cancel, false, None,
                ));
            }
        }
    }

    if let Some(fetch) = inflight.take() {
        fetch.cancel.cancel();
    }
    tracing::debug!("Poll subscription for {} stopped", path);
}
