//! BDD step definitions for the health feature

use std::time::Duration;

use cucumber::{given, then, when};

use kubex_portal::health::{HealthSource, BASIC_HEALTH_PATH, DETAILED_HEALTH_PATH};
use kubex_portal::http::Method;

use crate::world::PortalWorld;

const SETTLE_TIMEOUT: Duration = Duration::from_secs(5);

/// Wait until the monitor is idle and holds data from the expected source
async fn wait_for_source(world: &PortalWorld, source: HealthSource) {
    let monitor = world.health.as_ref().expect("health monitor not started");
    let mut watch = monitor.watch();
    let settled = tokio::time::timeout(SETTLE_TIMEOUT, async {
        loop {
            if !monitor.loading() && monitor.summary().source == source {
                return;
            }
            if !watch.changed().await {
                return;
            }
        }
    })
    .await;
    assert!(settled.is_ok(), "health monitor did not settle on {:?}", source);
}

#[given(expr = "a basic health endpoint reporting {string}")]
fn basic_health(world: &mut PortalWorld, status: String) {
    let body = serde_json::json!({ "status": status }).to_string();
    world
        .backend
        .respond(Method::Get, BASIC_HEALTH_PATH, 200, &body);
}

#[given(expr = "a detailed health endpoint reporting {string} with service {string}")]
fn detailed_health(world: &mut PortalWorld, status: String, service: String) {
    let body = serde_json::json!({
        "status": status,
        "uptime": "3h",
        "version": "1.4.0",
        "services": { service: { "healthy": true } },
    })
    .to_string();
    world
        .backend
        .respond(Method::Get, DETAILED_HEALTH_PATH, 200, &body);
}

#[when("I start the health monitor")]
fn start_monitor(world: &mut PortalWorld) {
    world.health = Some(world.portal().health_monitor());
}

#[when("I refresh the health monitor")]
async fn refresh_monitor(world: &mut PortalWorld) {
    world
        .health
        .as_ref()
        .expect("health monitor not started")
        .refresh()
        .await;
}

#[then(expr = "the health summary reports {string} from the basic endpoint")]
async fn summary_from_basic(world: &mut PortalWorld, status: String) {
    wait_for_source(world, HealthSource::Basic).await;
    let summary = world.health.as_ref().unwrap().summary();
    assert_eq!(summary.status, status);
    assert_eq!(summary.source, HealthSource::Basic);
}

#[then(expr = "the health summary reports {string} from the detailed endpoint")]
async fn summary_from_detailed(world: &mut PortalWorld, status: String) {
    wait_for_source(world, HealthSource::Detailed).await;
    let summary = world.health.as_ref().unwrap().summary();
    assert_eq!(summary.status, status);
    assert_eq!(summary.source, HealthSource::Detailed);
}

#[then("the health summary lists no services")]
fn no_services(world: &mut PortalWorld) {
    let summary = world.health.as_ref().unwrap().summary();
    assert!(summary.services.is_empty());
}

#[then(expr = "the health summary lists service {string} as healthy")]
fn service_healthy(world: &mut PortalWorld, service: String) {
    let summary = world.health.as_ref().unwrap().summary();
    let health = summary
        .services
        .get(&service)
        .unwrap_or_else(|| panic!("service {} missing", service));
    assert!(health.healthy);
}

#[then(expr = "no request was sent to {string}")]
fn no_request_to(world: &mut PortalWorld, path: String) {
    assert!(
        world.backend.requests_to(&path).is_empty(),
        "unexpected request to {}",
        path
    );
}

#[then(expr = "at least {int} request(s) reached {string}")]
fn requests_sent_to(world: &mut PortalWorld, count: usize, path: String) {
    let sent = world.backend.requests_to(&path).len();
    assert!(sent >= count, "expected {} requests to {}, saw {}", count, path, sent);
}
