//! Registration client against a running gateway

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use capability_gateway::config::{Config, RegistrationConfig};
use capability_gateway::discovery::{HttpDiscoveryClient, RegistrationManager};
use capability_gateway::registry::ServiceRegistry;
use capability_gateway::server::Gateway;
use capability_gateway::types::{HealthStatus, ServiceTarget, ServiceType};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::oneshot;

struct Running {
    addr: SocketAddr,
    registry: Arc<dyn ServiceRegistry>,
    _stop: oneshot::Sender<()>,
}

async fn start_gateway() -> Running {
    let mut config = Config::default();
    config.health_check.enabled = false;
    let gateway = Gateway::new(config).unwrap();
    let registry = Arc::clone(gateway.registry());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (stop, stopped) = oneshot::channel::<()>();
    tokio::spawn(gateway.serve(listener, async move {
        let _ = stopped.await;
    }));

    Running {
        addr,
        registry,
        _stop: stop,
    }
}

fn manager(addr: SocketAddr, data_dir: &std::path::Path) -> RegistrationManager {
    let config = RegistrationConfig {
        registry_url: format!("http://{addr}/discovery"),
        retries: 2,
        retry_wait: Duration::from_millis(50),
        data_dir: data_dir.to_string_lossy().into_owned(),
        ..RegistrationConfig::default()
    };
    let client = HttpDiscoveryClient::new(&config.registry_url, config.timeout).unwrap();
    RegistrationManager::new(
        Arc::new(client),
        ServiceTarget::new("python-exec", "127.0.0.1", 7100, ServiceType::CodeExecutionEngine)
            .with_subtype("python")
            .with_label("env", "test"),
        &config,
    )
}

async fn rpc(addr: SocketAddr, method: &str, params: Value) -> Value {
    reqwest::Client::new()
        .post(format!("http://{addr}/discovery"))
        .json(&json!({"jsonrpc": "2.0", "id": 1, "method": method, "params": params}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap()
}

#[tokio::test]
async fn test_register_ping_and_recover_after_registry_loss() {
    let gateway = start_gateway().await;
    let data = tempfile::tempdir().unwrap();
    let manager = manager(gateway.addr, data.path());

    manager.register().await;
    assert!(manager.is_registered());
    let id = manager.target().id.unwrap();
    assert!(gateway.registry.get_by_id(&id).is_some());

    // Registered: the next cycle only pings
    manager.register().await;
    assert!(manager.is_registered());
    assert_eq!(gateway.registry.list_all().len(), 1);

    // The gateway forgets the capability; the failed ping triggers re-registration
    gateway.registry.remove_by_id(&id);
    manager.register().await;
    assert!(!manager.is_registered());
    manager.register().await;
    assert!(manager.is_registered());
    assert!(gateway.registry.get_by_id(&id).is_some());

    manager.last_as_successful().await;
    assert_eq!(
        gateway.registry.get_states(&id).unwrap().health_status,
        HealthStatus::Healthy
    );

    manager.deregister().await;
    assert!(gateway.registry.list_all().is_empty());
}

#[tokio::test]
async fn test_identity_survives_restart() {
    let gateway = start_gateway().await;
    let data = tempfile::tempdir().unwrap();

    let first = manager(gateway.addr, data.path());
    first.register().await;
    let id = first.target().id.unwrap();

    let restarted = manager(gateway.addr, data.path());
    assert_eq!(restarted.target().id.as_deref(), Some(id.as_str()));
    restarted.register().await;
    assert_eq!(restarted.target().id.as_deref(), Some(id.as_str()));
    assert_eq!(gateway.registry.list_all().len(), 1);
}

#[tokio::test]
async fn test_unreachable_gateway_exhausts_retries_without_panicking() {
    let data = tempfile::tempdir().unwrap();
    let manager = manager("127.0.0.1:1".parse().unwrap(), data.path());

    manager.register().await;
    assert!(!manager.is_registered());
    assert_eq!(manager.remaining_retries(), 0);
}

#[tokio::test]
async fn test_registry_rpc_listing_and_fleet_status() {
    let gateway = start_gateway().await;
    gateway.registry.register(
        ServiceTarget::new("a", "127.0.0.1", 1, ServiceType::ToolInvoker).with_label("env", "prod"),
    );
    gateway.registry.register(
        ServiceTarget::new("b", "127.0.0.1", 2, ServiceType::ResourceProvider)
            .with_label("env", "dev"),
    );

    let listed = rpc(gateway.addr, "capabilities/list", json!({"labelFilter": "env=prod"})).await;
    let targets = listed["result"].as_array().unwrap();
    assert_eq!(targets.len(), 1);
    assert_eq!(targets[0]["serviceName"], "a");

    let by_type = rpc(
        gateway.addr,
        "capabilities/list",
        json!({"serviceType": "resource-provider"}),
    )
    .await;
    assert_eq!(by_type["result"].as_array().unwrap().len(), 1);

    let malformed = rpc(gateway.addr, "capabilities/list", json!({"labelFilter": "env="})).await;
    assert!(malformed["error"]["message"].as_str().unwrap().contains("Invalid label expression"));

    let unknown = rpc(gateway.addr, "capabilities/nope", json!({})).await;
    assert_eq!(unknown["error"]["code"], -32601);

    let stale = rpc(gateway.addr, "capabilities/stale", json!({"maxAgeSeconds": 0})).await;
    assert_eq!(stale["result"].as_array().unwrap().len(), 2);

    let health: Value = reqwest::get(format!("http://{}/health", gateway.addr))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["total"], 2);
    assert_eq!(health["overall"], "warning");

    let removed = rpc(gateway.addr, "capabilities/remove", json!({"labelFilter": "env=dev"})).await;
    assert_eq!(removed["result"].as_array().unwrap().len(), 1);
    assert_eq!(gateway.registry.list_all().len(), 1);
}
