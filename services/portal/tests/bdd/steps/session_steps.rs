//! BDD step definitions for the session feature

use cucumber::{given, then, when};
use serde_json::json;

use kubex_portal::http::Method;
use kubex_portal::router::Page;
use kubex_portal::session::{Credentials, UsersOutcome, SIGN_IN_PATH};
use kubex_portal::storage::{SESSION_REFRESH_KEY, SESSION_TOKEN_KEY, SESSION_USER_KEY};
use kubex_portal::UserSummary;

use crate::world::PortalWorld;

fn user(username: &str) -> UserSummary {
    UserSummary {
        id: format!("id-{}", username),
        username: username.to_string(),
        email: format!("{}@kubex.world", username),
        name: username.to_string(),
        role: "member".to_string(),
        active: true,
    }
}

#[given(expr = "a backend that signs in {string} with token {string}")]
fn backend_signs_in(world: &mut PortalWorld, username: String, token: String) {
    let body = json!({
        "access_token": token,
        "refresh_token": "refresh-1",
        "token_type": "Bearer",
        "expires_in": 900,
        "refresh_expires_in": 86400,
        "user": user(&username),
    });
    world
        .backend
        .respond(Method::Post, SIGN_IN_PATH, 200, &body.to_string());
}

#[given("a backend that lists users")]
fn backend_lists_users(world: &mut PortalWorld) {
    let body = json!({ "users": [user("alice"), user("bob")] });
    world
        .backend
        .respond(Method::Get, "/users", 200, &body.to_string());
}

#[given(expr = "a backend that rejects {string} with status {int}")]
fn backend_rejects(world: &mut PortalWorld, path: String, status: u16) {
    world.backend.respond(Method::Get, &path, status, "{}");
}

#[given("a fresh portal")]
fn fresh_portal(world: &mut PortalWorld) {
    world.start_portal("/");
}

#[given(expr = "a fresh portal on page {string}")]
fn fresh_portal_on(world: &mut PortalWorld, path: String) {
    world.start_portal(&path);
}

#[given(expr = "a stored session for {string} with token {string} and refresh token {string}")]
fn stored_session(world: &mut PortalWorld, username: String, token: String, refresh: String) {
    let auth = world.portal().auth();
    auth.set_auth(Some(token), Some(user(&username)));
    auth.set_refresh_token(Some(&refresh));
}

#[when(expr = "I sign in as {string} with password {string}")]
async fn sign_in(world: &mut PortalWorld, username: String, password: String) {
    let result = world
        .portal()
        .session()
        .sign_in(&Credentials::new(username, password))
        .await;
    world.sign_in_error = result.err();
}

#[when("I list users")]
async fn list_users(world: &mut PortalWorld) {
    let outcome = world
        .portal()
        .session()
        .list_users()
        .await
        .expect("listing users should not fail");
    world.users_outcome = Some(outcome);
}

#[when(expr = "I set auth to token {string} for user {string}")]
fn set_auth(world: &mut PortalWorld, token: String, username: String) {
    world
        .portal()
        .auth()
        .set_auth(Some(token), Some(user(&username)));
}

#[when("the portal restarts")]
fn portal_restarts(world: &mut PortalWorld) {
    world.portal = None;
    world.start_portal("/");
}

#[then(expr = "the auth context holds access token {string}")]
fn auth_holds_token(world: &mut PortalWorld, token: String) {
    assert_eq!(world.portal().auth().access_token(), Some(token));
}

#[then(expr = "the auth context user is {string}")]
fn auth_user_is(world: &mut PortalWorld, username: String) {
    assert_eq!(world.portal().auth().user(), Some(user(&username)));
}

#[then(expr = "the last request to {string} carried header {string} with value {string}")]
fn last_request_header(world: &mut PortalWorld, path: String, name: String, value: String) {
    let requests = world.backend.requests_to(&path);
    let last = requests.last().expect("no request to that path");
    assert_eq!(last.header(&name), Some(value.as_str()));
}

#[then(expr = "{int} users are listed")]
fn users_listed(world: &mut PortalWorld, count: usize) {
    match &world.users_outcome {
        Some(UsersOutcome::Users(users)) => assert_eq!(users.len(), count),
        other => panic!("expected a user list, got {:?}", other),
    }
}

#[then("the session has expired")]
fn session_expired(world: &mut PortalWorld) {
    assert_eq!(world.users_outcome, Some(UsersOutcome::SessionExpired));
    assert!(!world.portal().auth().is_authenticated());
}

#[then("all session keys are cleared")]
fn session_keys_cleared(world: &mut PortalWorld) {
    let storage = world.storage.as_ref().expect("storage not created");
    for key in [SESSION_TOKEN_KEY, SESSION_USER_KEY, SESSION_REFRESH_KEY] {
        assert_eq!(storage.session.get(key), None, "{} is still stored", key);
    }
}

#[then(expr = "the current page is {string}")]
fn current_page(world: &mut PortalWorld, path: String) {
    assert_eq!(world.portal().router().page(), Page::from_path(&path));
    assert_eq!(world.portal().router().pathname(), path);
}

#[then(expr = "sign-in fails with {string}")]
fn sign_in_fails(world: &mut PortalWorld, message: String) {
    let err = world.sign_in_error.as_ref().expect("sign-in succeeded");
    assert_eq!(err.to_string(), message);
}

#[then("no request was sent")]
fn no_request(world: &mut PortalWorld) {
    assert!(world.backend.requests().is_empty());
}
