//! BDD step definitions for the runtime configuration feature

use cucumber::{given, then, when};

use kubex_portal::config::{build_api_url, PartialRuntimeConfig};
use kubex_portal::RuntimeConfig;

use crate::world::PortalWorld;

#[given(expr = "the API base {string}")]
fn api_base(world: &mut PortalWorld, base: String) {
    world.api_base = base;
}

#[given(expr = "an injected config with API base {string} and app base {string}")]
fn injected_config(world: &mut PortalWorld, api_base: String, app_base: String) {
    world.injected = PartialRuntimeConfig {
        api_base: Some(api_base),
        api_token: None,
        app_base_path: Some(app_base),
    };
}

#[given(expr = "an environment override for the API base {string}")]
fn env_override(world: &mut PortalWorld, api_base: String) {
    world.overrides.api_base = Some(api_base);
}

#[when(expr = "I build the URL for {string}")]
fn build_url(world: &mut PortalWorld, path: String) {
    world.built_url = Some(build_api_url(&world.api_base, &path));
}

#[when("the runtime config is resolved")]
fn resolve(world: &mut PortalWorld) {
    world.runtime = Some(RuntimeConfig::resolve(
        &world.overrides,
        &world.injected,
        &PartialRuntimeConfig::default(),
    ));
}

#[then(expr = "the URL is {string}")]
fn url_is(world: &mut PortalWorld, expected: String) {
    assert_eq!(world.built_url.as_deref(), Some(expected.as_str()));
}

#[then(expr = "the resolved API base is {string}")]
fn resolved_api_base(world: &mut PortalWorld, expected: String) {
    let runtime = world.runtime.as_ref().expect("config not resolved");
    assert_eq!(runtime.api_base, expected);
}

#[then(expr = "the app path for {string} is {string}")]
fn app_path(world: &mut PortalWorld, path: String, expected: String) {
    let runtime = world.runtime.as_ref().expect("config not resolved");
    assert_eq!(runtime.app_path(&path), expected);
}
