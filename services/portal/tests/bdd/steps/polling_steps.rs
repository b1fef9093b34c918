//! BDD step definitions for the polling feature

use std::time::Duration;

use cucumber::{given, then, when};
use serde_json::Value;

use kubex_portal::http::Method;
use kubex_portal::{ApiHook, PollOptions};

use crate::world::PortalWorld;

fn parse(json: &str) -> Value {
    serde_json::from_str(json).unwrap_or_else(|e| panic!("bad JSON {}: {}", json, e))
}

fn hook(world: &PortalWorld) -> &ApiHook<Value> {
    world.hook.as_ref().expect("no hook started")
}

#[given(expr = "a backend serving {string} at {string}")]
fn backend_serving(world: &mut PortalWorld, body: String, path: String) {
    world.backend.respond(Method::Get, &path, 200, &body);
}

#[given(expr = "a backend serving {string} at {string} after {int} ms")]
fn backend_serving_after(world: &mut PortalWorld, body: String, path: String, millis: u64) {
    world.backend.respond_after(
        Method::Get,
        &path,
        Duration::from_millis(millis),
        200,
        &body,
    );
}

#[when(expr = "I poll {string}")]
fn poll(world: &mut PortalWorld, path: String) {
    let hook = ApiHook::new(world.portal().client().clone(), PollOptions::new(path));
    world.hook_changes = Some(hook.subscribe());
    world.hook = Some(hook);
}

#[when(expr = "I poll {string} while disabled with fallback {string}")]
fn poll_disabled(world: &mut PortalWorld, path: String, fallback: String) {
    let options = PollOptions::new(path)
        .enabled(false)
        .fallback_data(parse(&fallback));
    let hook = ApiHook::new(world.portal().client().clone(), options);
    world.hook_changes = Some(hook.subscribe());
    world.hook = Some(hook);
}

#[when("the hook settles")]
async fn hook_settles(world: &mut PortalWorld) {
    let changes = world.hook_changes.as_mut().expect("no hook started");
    let settled = tokio::time::timeout(
        Duration::from_secs(5),
        changes.wait_for(|state| !state.loading),
    )
    .await;
    assert!(matches!(settled, Ok(Ok(_))), "hook never finished loading");
}

#[when("I refetch")]
async fn refetch(world: &mut PortalWorld) {
    hook(world).refetch().await;
}

#[when("I dispose the hook")]
fn dispose(world: &mut PortalWorld) {
    hook(world).dispose();
}

#[when(expr = "I wait {int} ms")]
async fn wait(_world: &mut PortalWorld, millis: u64) {
    tokio::time::sleep(Duration::from_millis(millis)).await;
}

#[then(expr = "the hook data is {string}")]
fn hook_data(world: &mut PortalWorld, expected: String) {
    assert_eq!(hook(world).data(), Some(parse(&expected)));
}

#[then("the hook has no data")]
fn hook_no_data(world: &mut PortalWorld) {
    assert_eq!(hook(world).data(), None);
}

#[then("the hook is not loading")]
fn hook_not_loading(world: &mut PortalWorld) {
    assert!(!hook(world).loading());
}

#[then("the hook reports no error")]
fn hook_no_error(world: &mut PortalWorld) {
    assert!(hook(world).error().is_none());
}

#[then(expr = "the hook reports an error with status {int}")]
fn hook_error_status(world: &mut PortalWorld, status: u16) {
    let error = hook(world).error().expect("hook has no error");
    assert_eq!(error.status(), Some(status));
}

#[then(expr = "exactly {int} request(s) reached {string}")]
fn exact_requests(world: &mut PortalWorld, count: usize, path: String) {
    assert_eq!(world.backend.requests_to(&path).len(), count);
}
