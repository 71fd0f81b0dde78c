//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the proxy, health and fallback handlers
//! - Wire up middleware (tracing, limits, request ID, admission, headers)
//! - Bind server to listener
//! - Stop on shutdown, dropping stragglers after the grace period

use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::State,
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{any, get},
    Json, Router,
};
use serde_json::json;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::{limit::RequestBodyLimitLayer, timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::GatewayConfig;
use crate::http::proxy::proxy_handler;
use crate::http::request::{propagate_request_id_layer, set_request_id_layer};
use crate::http::response::error_response;
use crate::net::{Registry, StreamTracker};
use crate::security::headers::with_security_headers;
use crate::security::rate_limit::rate_limit_middleware;
use crate::security::{AdmissionGate, TokenBucketLimiter};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<Registry>,
    pub streams: StreamTracker,
    pub stream_timeout: Duration,
    pub max_reply_bytes: usize,
}

/// HTTP front of the gateway.
pub struct HttpServer {
    router: Router,
    config: GatewayConfig,
    state: AppState,
}

impl HttpServer {
    /// Create the server. Admission control follows `rate_limit.enabled`.
    pub fn new(config: GatewayConfig, registry: Arc<Registry>) -> Self {
        let gate = config.rate_limit.enabled.then(|| {
            Arc::new(TokenBucketLimiter::from_config(&config.rate_limit)) as Arc<dyn AdmissionGate>
        });
        Self::with_gate(config, registry, gate)
    }

    /// Create the server with an explicit admission gate.
    pub fn with_gate(
        config: GatewayConfig,
        registry: Arc<Registry>,
        gate: Option<Arc<dyn AdmissionGate>>,
    ) -> Self {
        let state = AppState {
            registry,
            streams: StreamTracker::new(),
            stream_timeout: Duration::from_secs(config.timeouts.stream_secs),
            max_reply_bytes: config.http.max_reply_bytes,
        };
        let router = Self::build_router(&config, state.clone(), gate);
        Self {
            router,
            config,
            state,
        }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(
        config: &GatewayConfig,
        state: AppState,
        gate: Option<Arc<dyn AdmissionGate>>,
    ) -> Router {
        let mut routes = Router::new();
        for path in proxy_paths(&config.http.route_prefix) {
            routes = routes.route(&path, any(proxy_handler));
        }
        if let Some(gate) = gate {
            routes = routes.route_layer(middleware::from_fn_with_state(gate, rate_limit_middleware));
        }

        let router = routes
            .route("/healthz", get(health_handler))
            .fallback(not_found)
            .with_state(state)
            .layer(RequestBodyLimitLayer::new(config.http.max_body_bytes))
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(propagate_request_id_layer())
            .layer(TraceLayer::new_for_http())
            .layer(set_request_id_layer());

        if config.security.enable_headers {
            with_security_headers(router)
        } else {
            router
        }
    }

    /// Router with all layers, for serving or in-process testing.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Shared handler state.
    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Serve until `shutdown` fires, then drain for at most the grace period.
    pub async fn run(
        self,
        listener: TcpListener,
        shutdown: CancellationToken,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        let grace = Duration::from_secs(self.config.timeouts.shutdown_grace_secs);
        tracing::info!(
            address = %addr,
            route_prefix = %self.config.http.route_prefix,
            "HTTP server starting"
        );

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        let signal = shutdown.clone();
        let serve = axum::serve(listener, app)
            .with_graceful_shutdown(async move { signal.cancelled().await })
            .into_future();
        tokio::pin!(serve);

        tokio::select! {
            result = &mut serve => result?,
            _ = shutdown.cancelled() => {
                match tokio::time::timeout(grace, &mut serve).await {
                    Ok(result) => result?,
                    Err(_) => tracing::warn!(
                        grace_secs = grace.as_secs(),
                        "Grace period elapsed, abandoning in-flight requests"
                    ),
                }
            }
        }

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Routes served by the proxy handler for `prefix`.
fn proxy_paths(prefix: &str) -> Vec<String> {
    let base = prefix.trim_end_matches('/');
    if base.is_empty() {
        vec!["/".to_string(), "/{*path}".to_string()]
    } else {
        vec![
            base.to_string(),
            format!("{base}/"),
            format!("{base}/{{*path}}"),
        ]
    }
}

async fn health_handler(State(state): State<AppState>) -> Response {
    if state.registry.is_connected() {
        (
            StatusCode::OK,
            Json(json!({ "status": "ok", "backend": "connected" })),
        )
            .into_response()
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "degraded", "backend": "disconnected" })),
        )
            .into_response()
    }
}

async fn not_found() -> Response {
    error_response(StatusCode::NOT_FOUND, "not found")
}
