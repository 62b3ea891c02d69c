//! Gateway-side JSON-RPC endpoint for discovery and registry administration

use std::sync::Arc;
use std::time::Duration;

use axum::{Json, Router, body::Bytes, extract::State, routing::post};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tower_http::trace::TraceLayer;
use tracing::debug;

use super::methods;
use crate::error::rpc_codes;
use crate::health::HealthCheckScheduler;
use crate::labels::filter_by_expression;
use crate::protocol::{JsonRpcRequest, JsonRpcResponse};
use crate::registry::ServiceRegistry;
use crate::types::{ServiceState, ServiceTarget, ServiceType};
use crate::{Error, Result};

/// Shared state of the discovery endpoint
pub struct DiscoveryState {
    /// The registry
    pub registry: Arc<dyn ServiceRegistry>,
    /// Scheduler for on-demand checks (absent when health checks are disabled)
    pub scheduler: Option<Arc<HealthCheckScheduler>>,
    /// Default age for stale queries
    pub stale_max_age: Duration,
}

/// Build the discovery router (mounted under `/discovery` by the gateway)
pub fn router(state: Arc<DiscoveryState>) -> Router {
    Router::new()
        .route("/", post(rpc_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn rpc_handler(State(state): State<Arc<DiscoveryState>>, body: Bytes) -> Json<JsonRpcResponse> {
    let request: JsonRpcRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            return Json(JsonRpcResponse::error(
                None,
                rpc_codes::PARSE_ERROR,
                format!("Invalid JSON-RPC request: {e}"),
            ));
        }
    };

    debug!(method = %request.method, "Discovery request");
    let id = request.id.clone();

    Json(match dispatch(&state, &request.method, request.params).await {
        Ok(result) => JsonRpcResponse::success(id, result),
        Err(e) => JsonRpcResponse::from_error(Some(id), &e),
    })
}

fn parse<T: DeserializeOwned>(params: Option<Value>) -> Result<T> {
    serde_json::from_value(params.unwrap_or_else(|| json!({})))
        .map_err(|e| Error::json_rpc(rpc_codes::INVALID_PARAMS, format!("Invalid params: {e}")))
}

#[derive(Deserialize)]
struct IdParams {
    id: String,
}

#[derive(Deserialize)]
struct UpdateStateParams {
    id: String,
    state: ServiceState,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListParams {
    #[serde(default)]
    service_type: Option<ServiceType>,
    #[serde(default)]
    label_filter: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StaleParams {
    #[serde(default)]
    max_age_seconds: Option<u64>,
    #[serde(default)]
    inactive_only: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RemoveParams {
    label_filter: String,
}

async fn dispatch(state: &DiscoveryState, method: &str, params: Option<Value>) -> Result<Value> {
    let registry = &state.registry;

    match method {
        methods::REGISTER => {
            let target: ServiceTarget = parse(params)?;
            Ok(serde_json::to_value(registry.register(target))?)
        }
        methods::DEREGISTER => {
            let target: ServiceTarget = parse(params)?;
            Ok(json!({ "removed": registry.deregister(&target) }))
        }
        methods::PING => {
            let IdParams { id } = parse(params)?;
            Ok(json!({ "found": registry.ping(&id) }))
        }
        methods::UPDATE_STATE => {
            let UpdateStateParams { id, state } = parse(params)?;
            Ok(json!({ "found": registry.update_last_state(&id, state) }))
        }
        methods::LIST => {
            let ListParams {
                service_type,
                label_filter,
            } = parse(params)?;
            let targets = match service_type {
                Some(t) => registry.get_entries(t),
                None => registry.list_all(),
            };
            let targets = filter_by_expression(targets, label_filter.as_deref())?;
            Ok(serde_json::to_value(targets)?)
        }
        methods::STATES => {
            let IdParams { id } = parse(params)?;
            let record = registry
                .get_states(&id)
                .ok_or_else(|| Error::EntityNotFound(format!("capability {id}")))?;
            Ok(serde_json::to_value(record)?)
        }
        methods::STALE => {
            let StaleParams {
                max_age_seconds,
                inactive_only,
            } = parse(params)?;
            let max_age = max_age_seconds.map_or(state.stale_max_age, Duration::from_secs);
            Ok(serde_json::to_value(
                registry.find_stale_capabilities(max_age, inactive_only),
            )?)
        }
        methods::CLEANUP => {
            let StaleParams {
                max_age_seconds,
                inactive_only,
            } = parse(params)?;
            let max_age = max_age_seconds.map_or(state.stale_max_age, Duration::from_secs);
            Ok(serde_json::to_value(
                registry.cleanup_stale_capabilities(max_age, inactive_only),
            )?)
        }
        methods::REMOVE => {
            let RemoveParams { label_filter } = parse(params)?;
            let matching = filter_by_expression(registry.list_all(), Some(&label_filter))?;
            let removed: Vec<ServiceTarget> = matching
                .into_iter()
                .filter(|t| registry.deregister(t))
                .collect();
            Ok(serde_json::to_value(removed)?)
        }
        methods::FLEET_STATUS => Ok(serde_json::to_value(registry.fleet_status())?),
        methods::CHECK => {
            let IdParams { id } = parse(params)?;
            check(state, &id).await
        }
        other => Err(Error::json_rpc(
            rpc_codes::METHOD_NOT_FOUND,
            format!("Method not found: {other}"),
        )),
    }
}

async fn check(state: &DiscoveryState, id: &str) -> Result<Value> {
    let scheduler = state
        .scheduler
        .as_ref()
        .ok_or_else(|| Error::ServiceUnavailable("Health checks are disabled".to_string()))?;
    let status = scheduler.trigger(id).await?;
    Ok(json!({ "status": status, "skipped": status.is_none() }))
}
