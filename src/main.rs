mod analytics;
mod composer;
mod http;
mod logistics;
mod metrics;
mod models;
mod returns;
mod security;

use axum::{
    Json, Router,
    extract::{Extension, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use composer::{ComposeError, ComposeErrorKind, Composer};
use logistics::LogisticsStore;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use models::{AnalyticalQueryRequest, ApiError, ReturnStatusRequest, ToolResponse};
use returns::client::ReturnsClient;
use security::{AuthContext, AuthState, require_api_auth};
use serde_json::json;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use std::{net::SocketAddr, sync::Arc};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt};

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        error!(target = "retrace.api", "server crashed: {err}");
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    dotenvy::dotenv().ok();
    init_tracing();

    let auth_state = AuthState::from_env();
    let returns_client =
        ReturnsClient::from_env().ok_or("RETURNS_API_BASE_URL must be set")?;
    let database_url = std::env::var("DATABASE_URL").map_err(|_| "DATABASE_URL must be set")?;
    let max_connections = std::env::var("PG_MAX_CONNECTIONS")
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(5);
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(&database_url)
        .await?;
    info!(
        target = "retrace.api",
        max_connections, "connected to logistics store"
    );

    let composer = Arc::new(Composer::new(
        returns_client,
        LogisticsStore::new(pool.clone()),
    ));
    let openapi: serde_json::Value =
        serde_yaml::from_str(include_str!("../docs/openapi.yaml"))
            .unwrap_or(json!({"openapi":"3.0.3"}));
    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("prom recorder");
    let state = AppState {
        composer,
        pool,
        openapi: Arc::new(openapi),
        prometheus_handle,
    };

    let cors = CorsLayer::new()
        .allow_headers(Any)
        .allow_methods(Any)
        .allow_origin(Any);

    let protected = Router::new()
        .nest(
            "/tools",
            Router::new()
                .route("/return_status", post(return_status))
                .route("/return_query", post(return_query)),
        )
        .route_layer(middleware::from_fn_with_state(auth_state, require_api_auth));

    let app = Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics_endpoint))
        .route("/openapi.json", get(openapi_json))
        .route("/docs", get(swagger_ui))
        .merge(protected)
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(axum::extract::DefaultBodyLimit::max(body_limit_from_env()));

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(53000);
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    info!(target = "retrace.api", "listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}

#[derive(Clone)]
struct AppState {
    composer: Arc<Composer<ReturnsClient, LogisticsStore>>,
    pool: PgPool,
    openapi: Arc<serde_json::Value>,
    prometheus_handle: PrometheusHandle,
}

/// Health and readiness check.
///
/// - Method: `GET`
/// - Path: `/health`
/// - Auth: none
async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "service": "retrace-api",
    }))
}

async fn openapi_json(
    State(state): State<AppState>,
    headers: axum::http::HeaderMap,
) -> Result<Json<serde_json::Value>, AppError> {
    if let Ok(key) = std::env::var("OPENAPI_KEY") {
        let presented = headers
            .get("X-Docs-Key")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        if presented != key {
            return Err(AppError::Compose(ComposeError::invalid_input(
                "docs",
                "unauthorized",
            )));
        }
    }
    Ok(Json((*state.openapi).clone()))
}

async fn swagger_ui() -> axum::http::Response<String> {
    let html = r#"<!doctype html>
<html>
<head>
  <meta charset='utf-8'/>
  <title>Retrace API Docs</title>
  <link rel="stylesheet" href="https://unpkg.com/swagger-ui-dist@5/swagger-ui.css" />
</head>
<body>
  <div id="swagger-ui"></div>
  <script src="https://unpkg.com/swagger-ui-dist@5/swagger-ui-bundle.js"></script>
  <script>
    window.onload = () => {
      window.ui = SwaggerUIBundle({ url: '/openapi.json', dom_id: '#swagger-ui' });
    };
  </script>
</body>
</html>"#;
    axum::http::Response::builder()
        .header("Content-Type", "text/html; charset=utf-8")
        .body(html.to_string())
        .unwrap()
}

fn body_limit_from_env() -> usize {
    std::env::var("REQUEST_MAX_BYTES")
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(256 * 1024)
}

async fn metrics_endpoint(
    State(state): State<AppState>,
    headers: axum::http::HeaderMap,
) -> axum::http::Response<String> {
    if let Ok(secret) = std::env::var("METRICS_KEY") {
        let presented = headers
            .get("X-Metrics-Key")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        if presented != secret {
            return axum::http::Response::builder()
                .status(StatusCode::UNAUTHORIZED)
                .body("unauthorized".into())
                .unwrap();
        }
    }
    let body = state.prometheus_handle.render();
    axum::http::Response::builder()
        .header("Content-Type", "text/plain; version=0.0.4")
        .body(body)
        .unwrap()
}

/// Compose the status narrative for one return.
///
/// - Method: `POST`
/// - Path: `/tools/return_status`
/// - Auth: `Authorization: Bearer <key>` or `X-Retrace-Key: <key>`
/// - Body: `ReturnStatusRequest`
/// - Response: `ToolResponse` with the narrative text
async fn return_status(
    State(state): State<AppState>,
    Extension(context): Extension<AuthContext>,
    Json(payload): Json<ReturnStatusRequest>,
) -> Result<Json<ToolResponse>, AppError> {
    crate::metrics::inc_requests("/tools/return_status");
    info!(
        target = "retrace.api",
        caller = %context.caller_id,
        api_key = %context.api_key_id,
        "return status composition invoked",
    );
    let content = state.composer.compose(&payload).await?;
    Ok(Json(ToolResponse { content }))
}

/// Run an ad-hoc analytical query against the logistics store.
///
/// - Method: `POST`
/// - Path: `/tools/return_query`
/// - Body: `AnalyticalQueryRequest`
/// - Response: `ToolResponse` with the result rows as a JSON array
async fn return_query(
    State(state): State<AppState>,
    Extension(context): Extension<AuthContext>,
    Json(payload): Json<AnalyticalQueryRequest>,
) -> Result<Json<ToolResponse>, AppError> {
    crate::metrics::inc_requests("/tools/return_query");
    info!(
        target = "retrace.api",
        caller = %context.caller_id,
        api_key = %context.api_key_id,
        "analytical query invoked",
    );
    let content = analytics::run_query(&state.pool, &payload.sql_query).await?;
    Ok(Json(ToolResponse { content }))
}

#[derive(Debug)]
enum AppError {
    Compose(ComposeError),
    Analytics(analytics::AnalyticsError),
}

impl From<ComposeError> for AppError {
    fn from(value: ComposeError) -> Self {
        Self::Compose(value)
    }
}

impl From<analytics::AnalyticsError> for AppError {
    fn from(value: analytics::AnalyticsError) -> Self {
        Self::Analytics(value)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::Compose(err) => {
                let status = match err.kind() {
                    ComposeErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
                    ComposeErrorKind::NotFound => StatusCode::NOT_FOUND,
                    ComposeErrorKind::Upstream => StatusCode::BAD_GATEWAY,
                    ComposeErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
                };
                let payload = ApiError {
                    error: err.stage().to_string(),
                    detail: Some(err.detail().to_string()),
                };
                (status, Json(payload)).into_response()
            }
            AppError::Analytics(err) => {
                let status = match err {
                    analytics::AnalyticsError::EmptyQuery => StatusCode::BAD_REQUEST,
                    _ => StatusCode::INTERNAL_SERVER_ERROR,
                };
                let payload = ApiError {
                    error: "analytics".to_string(),
                    detail: Some(err.to_string()),
                };
                (status, Json(payload)).into_response()
            }
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug"));
    let _ = fmt().with_env_filter(filter).try_init();
}
