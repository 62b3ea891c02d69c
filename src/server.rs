//! Gateway process: wiring, HTTP surface and graceful shutdown

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::broadcast;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::discovery::rpc::{self, DiscoveryState};
use crate::events::EventBus;
use crate::forward::{ForwardRegistry, ForwardService};
use crate::health::{HealthCheckScheduler, RpcHealthProbe};
use crate::persistence::open_repository;
use crate::registry::{InMemoryServiceRegistry, ServiceRegistry};
use crate::{Error, Result};

/// The capability gateway
pub struct Gateway {
    config: Config,
    registry: Arc<dyn ServiceRegistry>,
    scheduler: Option<Arc<HealthCheckScheduler>>,
    forwards: Arc<ForwardService>,
}

#[derive(Clone)]
struct AppState {
    registry: Arc<dyn ServiceRegistry>,
    forwards: Arc<ForwardService>,
}

impl Gateway {
    /// Build every component from configuration
    pub fn new(config: Config) -> Result<Self> {
        let registry: Arc<dyn ServiceRegistry> = Arc::new(InMemoryServiceRegistry::new(
            config.registry.max_state_count,
            EventBus::default(),
        ));

        let scheduler = config.health_check.enabled.then(|| {
            HealthCheckScheduler::new(
                Arc::clone(&registry),
                Arc::new(RpcHealthProbe::new(config.health_check.timeout)),
                &config.health_check,
            )
        });

        let forwards = Arc::new(ForwardService::new(
            Arc::new(ForwardRegistry::new(&config.forwards)),
            open_repository(&config.persistence)?,
        ));

        Ok(Self {
            config,
            registry,
            scheduler,
            forwards,
        })
    }

    /// The capability registry
    #[must_use]
    pub fn registry(&self) -> &Arc<dyn ServiceRegistry> {
        &self.registry
    }

    /// The forward service
    #[must_use]
    pub fn forwards(&self) -> &Arc<ForwardService> {
        &self.forwards
    }

    /// HTTP routes: `/discovery` (JSON-RPC), `/health`, `/forwards/*`
    pub fn router(&self) -> Router {
        let discovery = rpc::router(Arc::new(DiscoveryState {
            registry: Arc::clone(&self.registry),
            scheduler: self.scheduler.clone(),
            stale_max_age: self.config.registry.stale_max_age,
        }));

        let state = AppState {
            registry: Arc::clone(&self.registry),
            forwards: Arc::clone(&self.forwards),
        };

        Router::new()
            .route("/health", get(health_handler))
            .route("/forwards", get(forwards_handler))
            .route("/forwards/tools", get(forward_tools_handler))
            .route("/forwards/resources", get(forward_resources_handler))
            .layer(TraceLayer::new_for_http())
            .with_state(state)
            .nest("/discovery", discovery)
    }

    /// Bind the configured address and serve until SIGINT/SIGTERM
    pub async fn run(self) -> Result<()> {
        let addr = SocketAddr::new(
            self.config
                .server
                .host
                .parse()
                .map_err(|e| Error::Config(format!("Invalid host: {e}")))?,
            self.config.server.port,
        );
        let listener = TcpListener::bind(addr).await?;

        info!("============================================================");
        info!("CAPABILITY GATEWAY v{}", env!("CARGO_PKG_VERSION"));
        info!("============================================================");
        info!(host = %self.config.server.host, port = self.config.server.port, "Listening");
        info!("  POST http://{addr}/discovery  (registration + registry RPC)");
        info!("  GET  http://{addr}/health     (fleet status)");

        self.serve(listener, shutdown_signal()).await
    }

    /// Serve on `listener` until `shutdown` resolves, then stop background work
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let (shutdown_tx, _) = broadcast::channel(1);

        match self.forwards.preload() {
            Ok(count) => info!(forwards = count, "Forwards linked"),
            Err(e) => warn!(error = %e, "Failed to preload forwards"),
        }

        let scheduler = self
            .scheduler
            .clone()
            .map(|s| s.spawn(shutdown_tx.subscribe()));
        if scheduler.is_none() {
            info!("Health checks disabled");
        }

        let app = self.router();
        let tx = shutdown_tx.clone();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                shutdown.await;
                let _ = tx.send(());
            })
            .await
            .map_err(|e| Error::Internal(e.to_string()))?;

        let _ = shutdown_tx.send(());
        if let Some(handle) = scheduler
            && tokio::time::timeout(self.config.server.shutdown_timeout, handle)
                .await
                .is_err()
        {
            warn!("Health check scheduler did not stop in time");
        }

        info!("Gateway stopped");
        Ok(())
    }
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received");
}

struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::LabelExpression(_) => StatusCode::BAD_REQUEST,
            Error::EntityNotFound(_) => StatusCode::NOT_FOUND,
            Error::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

#[derive(Deserialize)]
struct FilterQuery {
    filter: Option<String>,
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.registry.fleet_status())
}

async fn forwards_handler(
    State(state): State<AppState>,
    Query(query): Query<FilterQuery>,
) -> std::result::Result<impl IntoResponse, ApiError> {
    Ok(Json(state.forwards.list_forwards(query.filter.as_deref())?))
}

async fn forward_tools_handler(
    State(state): State<AppState>,
    Query(query): Query<FilterQuery>,
) -> std::result::Result<impl IntoResponse, ApiError> {
    Ok(Json(state.forwards.list_tools(query.filter.as_deref()).await?))
}

async fn forward_resources_handler(
    State(state): State<AppState>,
    Query(query): Query<FilterQuery>,
) -> std::result::Result<impl IntoResponse, ApiError> {
    Ok(Json(
        state
            .forwards
            .list_resources(query.filter.as_deref())
            .await?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::labels::LabelExpression;

    #[test]
    fn test_api_error_status() {
        let parse_error = LabelExpression::parse("a=").unwrap_err();
        let cases = [
            (Error::from(parse_error), StatusCode::BAD_REQUEST),
            (Error::EntityNotFound("x".into()), StatusCode::NOT_FOUND),
            (Error::ServiceUnavailable("x".into()), StatusCode::SERVICE_UNAVAILABLE),
            (Error::Internal("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (error, status) in cases {
            assert_eq!(ApiError(error).into_response().status(), status);
        }
    }

    #[tokio::test]
    async fn test_serve_stops_on_shutdown() {
        let mut config = Config::default();
        config.health_check.interval = std::time::Duration::from_millis(20);
        let gateway = Gateway::new(config).unwrap();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();

        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let server = tokio::spawn(gateway.serve(listener, async move {
            let _ = rx.await;
        }));

        let _ = tx.send(());
        let result = tokio::time::timeout(std::time::Duration::from_secs(5), server)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
    }
}
