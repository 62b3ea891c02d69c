//! Health probing against throwaway capability servers

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{Json, Router, routing::post};
use capability_gateway::config::HealthCheckConfig;
use capability_gateway::health::{HealthCheckScheduler, RpcHealthProbe};
use capability_gateway::registry::{InMemoryServiceRegistry, ServiceRegistry};
use capability_gateway::types::{HealthStatus, ServiceTarget, ServiceType};
use serde_json::{Value, json};
use tokio::net::TcpListener;

/// Serve a capability whose probe handler waits `delay` and then answers `status`
async fn spawn_capability(delay: Duration, status: &'static str) -> u16 {
    let app = Router::new().route(
        "/",
        post(move |Json(request): Json<Value>| async move {
            tokio::time::sleep(delay).await;
            Json(json!({
                "jsonrpc": "2.0",
                "id": request["id"],
                "result": { "status": status }
            }))
        }),
    );

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    port
}

fn scheduler(
    registry: &Arc<InMemoryServiceRegistry>,
    timeout: Duration,
) -> Arc<HealthCheckScheduler> {
    let config = HealthCheckConfig {
        timeout,
        ..HealthCheckConfig::default()
    };
    HealthCheckScheduler::new(
        Arc::clone(registry) as Arc<dyn ServiceRegistry>,
        Arc::new(RpcHealthProbe::new(timeout)),
        &config,
    )
}

fn register(registry: &InMemoryServiceRegistry, port: u16) -> String {
    registry
        .register(ServiceTarget::new(
            "probe-target",
            "127.0.0.1",
            port,
            ServiceType::ResourceProvider,
        ))
        .id
        .unwrap()
}

#[tokio::test]
async fn test_started_capability_is_healthy() {
    let port = spawn_capability(Duration::ZERO, "started").await;
    let registry = Arc::new(InMemoryServiceRegistry::default());
    let id = register(&registry, port);

    let status = scheduler(&registry, Duration::from_secs(2))
        .trigger(&id)
        .await
        .unwrap();
    assert_eq!(status, Some(HealthStatus::Healthy));
    assert_eq!(
        registry.get_states(&id).unwrap().health_status,
        HealthStatus::Healthy
    );
}

#[tokio::test]
async fn test_stopping_capability_is_unhealthy() {
    let port = spawn_capability(Duration::ZERO, "stopping").await;
    let registry = Arc::new(InMemoryServiceRegistry::default());
    let id = register(&registry, port);

    let status = scheduler(&registry, Duration::from_secs(2))
        .trigger(&id)
        .await
        .unwrap();
    assert_eq!(status, Some(HealthStatus::Unhealthy));
}

#[tokio::test]
async fn test_hanging_capability_is_down_within_timeout() {
    let port = spawn_capability(Duration::from_secs(30), "started").await;
    let registry = Arc::new(InMemoryServiceRegistry::default());
    let id = register(&registry, port);

    let started = Instant::now();
    let status = scheduler(&registry, Duration::from_millis(300))
        .trigger(&id)
        .await
        .unwrap();

    assert_eq!(status, Some(HealthStatus::Down));
    assert!(started.elapsed() < Duration::from_secs(5));

    let record = registry.get_states(&id).unwrap();
    assert_eq!(record.health_status, HealthStatus::Down);
    assert!(record.states.last().unwrap().reason.is_some());
}

#[tokio::test]
async fn test_concurrent_checks_of_one_capability_are_deduplicated() {
    let port = spawn_capability(Duration::from_millis(300), "started").await;
    let registry = Arc::new(InMemoryServiceRegistry::default());
    let id = register(&registry, port);
    let target = registry.get_by_id(&id).unwrap();
    let scheduler = scheduler(&registry, Duration::from_secs(2));

    let (first, second) = tokio::join!(
        scheduler.check_instance_health(&target),
        scheduler.check_instance_health(&target)
    );

    let ran: Vec<_> = [first, second].into_iter().flatten().collect();
    assert_eq!(ran, vec![HealthStatus::Healthy]);
    assert!(!scheduler.is_in_progress(&id));
}

#[tokio::test]
async fn test_unknown_id_is_not_found() {
    let registry = Arc::new(InMemoryServiceRegistry::default());
    assert!(
        scheduler(&registry, Duration::from_secs(1))
            .trigger("nope")
            .await
            .is_err()
    );
}
