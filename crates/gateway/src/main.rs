//! MailScout API Gateway
//!
//! The main entry point for all external API requests.
//! Handles:
//! - Single lookups and search history
//! - Batch submission and progress polling
//! - API key configuration
//! - Rate limiting
//! - Observability (logging, metrics)

mod handlers;
mod middleware;

use axum::{
    extract::Request,
    middleware::{from_fn, Next},
    routing::{get, post},
    Router,
};
use mailscout_common::{
    batch::BatchRunner,
    config::AppConfig,
    db::{self, RecordStore},
    lookup::{self, EmailLookup},
    metrics,
};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::{signal, sync::Notify};
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::middleware::{rate_limit, request_metrics};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn RecordStore>,
    pub lookup: Arc<dyn EmailLookup>,
    pub runner: BatchRunner,
}

impl AppState {
    pub fn new(config: Arc<AppConfig>, store: Arc<dyn RecordStore>, lookup: Arc<dyn EmailLookup>) -> Self {
        let runner = BatchRunner::new(store.clone(), lookup.clone(), config.pacing_delay());
        Self { config, store, lookup, runner }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Arc::new(AppConfig::load()?);

    init_tracing(&config);

    info!(
        service = %config.observability.service_name,
        "Starting MailScout API Gateway v{}",
        mailscout_common::VERSION
    );

    // Initialize metrics
    if config.observability.metrics_port != 0 {
        let addr = SocketAddr::from(([0, 0, 0, 0], config.observability.metrics_port));
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .set_buckets_for_metric(
                Matcher::Suffix("request_duration_seconds".to_string()),
                metrics::LATENCY_BUCKETS,
            )?
            .set_buckets_for_metric(
                Matcher::Suffix("lookup_duration_seconds".to_string()),
                metrics::LOOKUP_BUCKETS,
            )?
            .install()?;
        info!("Prometheus exporter listening on {}", addr);
    }
    metrics::register_metrics();

    // Initialize store and lookup client
    let store = db::connect_store(&config.database).await?;
    let lookup = lookup::create_lookup(&config.lookup)?;

    let state = AppState::new(config.clone(), store, lookup);

    // Build the router
    let app = create_router(state)?;

    // Start the server
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    // In-flight requests get `shutdown_timeout_secs` to drain after a signal
    let shutdown = Arc::new(Notify::new());
    let trigger = shutdown.clone();
    let server = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            trigger.notify_one();
        })
        .into_future();
    let deadline = async {
        shutdown.notified().await;
        tokio::time::sleep(config.shutdown_timeout()).await;
    };

    tokio::select! {
        result = server => result?,
        _ = deadline => warn!(
            timeout_secs = config.server.shutdown_timeout_secs,
            "Graceful shutdown timed out, dropping open connections"
        ),
    }

    info!("Server shutdown complete");
    Ok(())
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.observability.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    if config.observability.json_logging {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Create the main application router
fn create_router(state: AppState) -> mailscout_common::Result<Router> {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Request ID propagation
    let request_id = SetRequestIdLayer::x_request_id(MakeRequestUuid);
    let propagate_id = PropagateRequestIdLayer::x_request_id();

    // API routes
    let mut api_routes = Router::new()
        // Health endpoints
        .route("/health", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready))

        // Single lookup and history
        .route("/search", post(handlers::searches::search))
        .route(
            "/searches",
            get(handlers::searches::list_searches).delete(handlers::searches::clear_searches),
        )
        .route("/stats", get(handlers::searches::stats))

        // Batch endpoints
        .route("/batch", post(handlers::batches::submit_batch))
        .route("/batch/{id}", get(handlers::batches::get_batch))
        .route("/batch/{id}/results", get(handlers::batches::get_batch_results))

        // API key configuration
        .route(
            "/config",
            get(handlers::config::get_config).post(handlers::config::save_config),
        )
        .route_layer(from_fn(request_metrics::track_metrics));

    let limits = &state.config.rate_limit;
    if limits.enabled {
        let limiter = rate_limit::create_rate_limiter(limits)?;
        let limit = limits.requests_per_second;
        api_routes = api_routes.layer(from_fn(move |request: Request, next: Next| {
            rate_limit::rate_limit_middleware(request, next, limiter.clone(), limit)
        }));
    }

    let request_timeout = state.config.request_timeout();

    // Compose the app
    Ok(Router::new()
        .nest("/api", api_routes)
        .layer(TimeoutLayer::new(request_timeout))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(propagate_id)
        .layer(request_id)
        .with_state(state))
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
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
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting shutdown..."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{header, Method, StatusCode},
        response::Response,
    };
    use mailscout_common::{db::MemoryStore, lookup::MockLookup};
    use serde_json::{json, Value};
    use std::time::Duration;
    use tokio_test::assert_ok;
    use tower::ServiceExt;

    fn test_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.lookup.pacing_delay_ms = 0;
        config.rate_limit.enabled = false;
        config
    }

    #[tokio::test]
    async fn test_health_reports_configured_service_name() {
        let mut config = test_config();
        config.observability.service_name = "mailscout-eu".to_string();
        let app = app_with(config);

        let body = json_body(send(&app, Method::GET, "/api/health", None).await).await;
        assert_eq!(body["service"], "mailscout-eu");
    }

    fn app_with(config: AppConfig) -> Router {
        let state = AppState::new(Arc::new(config), Arc::new(MemoryStore::new()), Arc::new(MockLookup));
        create_router(state).unwrap()
    }

    fn app() -> Router {
        app_with(test_config())
    }

    async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> Response {
        let builder = axum::http::Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        app.clone().oneshot(request).await.unwrap()
    }

    async fn json_body(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn configure_key(app: &Router, key: &str) {
        let response = send(app, Method::POST, "/api/config", Some(json!({ "api_key": key }))).await;
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    #[tokio::test]
    async fn test_health_and_ready() {
        let app = app();

        let response = send(&app, Method::GET, "/api/health", None).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));
        let body = json_body(response).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["service"], "mailscout");

        let response = send(&app, Method::GET, "/api/ready", None).await;
        let body = json_body(response).await;
        assert_eq!(body["status"], "ready");
        assert_eq!(body["checks"]["store"]["status"], "up");
    }

    #[tokio::test]
    async fn test_config_is_masked_and_replaced() {
        let app = app();

        let response = send(&app, Method::GET, "/api/config", None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        configure_key(&app, "first-key-0001").await;
        configure_key(&app, "second-key-0002").await;

        let response = send(&app, Method::GET, "/api/config", None).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["api_key"], "***********0002");
        assert_eq!(body["is_active"], true);

        let response = send(&app, Method::POST, "/api/config", Some(json!({ "api_key": "   " }))).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_single_search_requires_key() {
        let app = app();

        let request = json!({ "first_name": "John", "last_name": "Doe", "company": "Acme" });
        let response = send(&app, Method::POST, "/api/search", Some(request.clone())).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error"]["code"], "MISSING_API_KEY");

        configure_key(&app, "live-key").await;
        let response = send(&app, Method::POST, "/api/search", Some(request)).await;
        assert_eq!(response.status(), StatusCode::OK);
        let record = json_body(response).await;
        assert_eq!(record["status"], "found");
        assert_eq!(record["email"], "john.doe@acme.com");
        assert_eq!(record["search_type"], "single");
        assert!(record["batch_id"].is_null());
    }

    #[tokio::test]
    async fn test_single_search_validation() {
        let app = app();
        configure_key(&app, "live-key").await;

        let blank = json!({ "first_name": " ", "last_name": "Doe", "company": "Acme" });
        let response = send(&app, Method::POST, "/api/search", Some(blank)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error"]["code"], "VALIDATION_ERROR");

        let batch = json!({
            "first_name": "John", "last_name": "Doe", "company": "Acme", "search_type": "batch"
        });
        let response = send(&app, Method::POST, "/api/search", Some(batch)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let stats = json_body(send(&app, Method::GET, "/api/stats", None).await).await;
        assert_eq!(stats["total"], 0);
    }

    #[tokio::test]
    async fn test_rejected_key_recorded_as_not_found() {
        let app = app();
        configure_key(&app, "invalid").await;

        let request = json!({ "first_name": "John", "last_name": "Doe", "company": "Acme" });
        let record = json_body(send(&app, Method::POST, "/api/search", Some(request)).await).await;
        assert_eq!(record["status"], "not_found");
        assert_eq!(record["error_message"], "Invalid API key");
        assert!(record["email"].is_null());
    }

    #[tokio::test]
    async fn test_history_stats_and_clear() {
        let app = app();
        configure_key(&app, "live-key").await;

        for name in ["Ann", "Bob", "Cy"] {
            let request = json!({ "first_name": name, "last_name": "Doe", "company": "Acme" });
            let response = send(&app, Method::POST, "/api/search", Some(request)).await;
            assert_eq!(response.status(), StatusCode::OK);
        }

        let body = json_body(send(&app, Method::GET, "/api/searches?limit=2", None).await).await;
        let records = body["records"].as_array().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["first_name"], "Cy");
        assert_eq!(body["limit"], 2);

        let stats = json_body(send(&app, Method::GET, "/api/stats", None).await).await;
        assert_eq!(stats["total"], 3);
        assert_eq!(stats["found"], 3);

        let cleared = json_body(send(&app, Method::DELETE, "/api/searches", None).await).await;
        assert_eq!(cleared["deleted"], 3);

        let body = json_body(send(&app, Method::GET, "/api/searches", None).await).await;
        assert!(body["records"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_batch_rejections() {
        let app = app();

        let one = json!({ "file_name": "a.csv", "contacts": [
            { "first_name": "John", "last_name": "Doe", "company": "Acme" }
        ]});
        let response = send(&app, Method::POST, "/api/batch", Some(one)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error"]["code"], "MISSING_API_KEY");

        configure_key(&app, "live-key").await;
        let empty = json!({ "file_name": "a.csv", "contacts": [] });
        let response = send(&app, Method::POST, "/api/batch", Some(empty)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error"]["code"], "EMPTY_BATCH");

        let unknown = format!("/api/batch/{}", uuid::Uuid::new_v4());
        let response = send(&app, Method::GET, &unknown, None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(json_body(response).await["error"]["code"], "BATCH_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_batch_submit_and_poll() {
        let app = app();
        configure_key(&app, "live-key").await;

        let request = json!({ "file_name": "leads.csv", "contacts": [
            { "firstName": "John", "lastName": "Doe", "company": "Acme" },
            { "first_name": "", "last_name": "", "company": "" },
            { "first_name": "Jane", "last_name": "Roe", "company": "Initech" }
        ]});
        let response = send(&app, Method::POST, "/api/batch", Some(request)).await;
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let accepted = json_body(response).await;
        assert_eq!(accepted["status"], "processing");
        assert_eq!(accepted["total_records"], 3);
        let poll_url = accepted["poll_url"].as_str().unwrap().to_string();

        let mut job = Value::Null;
        for _ in 0..200 {
            job = json_body(send(&app, Method::GET, &poll_url, None).await).await;
            if job["is_terminal"] == true {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(job["status"], "completed");
        assert_eq!(job["processed_records"], 3);
        assert_eq!(job["successful_records"], 2);
        assert_eq!(job["progress_percent"], 100.0);
        assert!(job["completed_at"].is_string());

        let results_url = format!("{}/results", poll_url);
        let results = json_body(send(&app, Method::GET, &results_url, None).await).await;
        let records = results["records"].as_array().unwrap();
        assert_eq!(records.len(), 3);
        assert!(records.iter().all(|r| r["search_type"] == "batch"));
        assert_eq!(records.iter().filter(|r| r["status"] == "error").count(), 1);
    }

    #[tokio::test]
    async fn test_batch_accepts_non_string_contact_field() {
        let app = app();
        configure_key(&app, "live-key").await;

        let request = json!({ "file_name": "mixed.csv", "contacts": [
            { "first_name": "John", "last_name": "Doe", "company": "Acme" },
            { "firstName": 123, "lastName": "X", "company": "Y" },
            { "first_name": "Jane", "last_name": "Roe", "company": "Initech" }
        ]});
        let response = send(&app, Method::POST, "/api/batch", Some(request)).await;
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let accepted = json_body(response).await;
        assert_eq!(accepted["total_records"], 3);
        let poll_url = accepted["poll_url"].as_str().unwrap().to_string();

        let mut job = Value::Null;
        for _ in 0..200 {
            job = json_body(send(&app, Method::GET, &poll_url, None).await).await;
            if job["is_terminal"] == true {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(job["processed_records"], 3);
        assert_eq!(job["successful_records"], 2);

        let results_url = format!("{}/results", poll_url);
        let results = json_body(send(&app, Method::GET, &results_url, None).await).await;
        let errors: Vec<&Value> = results["records"]
            .as_array()
            .unwrap()
            .iter()
            .filter(|r| r["status"] == "error")
            .collect();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0]["error_message"], "Invalid contact data");
        assert_eq!(errors[0]["first_name"], "Unknown");
    }

    #[tokio::test]
    async fn test_rate_limit_rejects_burst() {
        let mut config = test_config();
        config.rate_limit.enabled = true;
        config.rate_limit.requests_per_second = 1;
        config.rate_limit.burst = 1;
        let app = app_with(config);

        let response = send(&app, Method::GET, "/api/health", None).await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = send(&app, Method::GET, "/api/health", None).await;
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(json_body(response).await["error"]["code"], "RATE_LIMITED");
    }

    #[test]
    fn test_zero_rate_limit_fails_router_build() {
        let mut config = test_config();
        config.rate_limit.enabled = true;
        config.rate_limit.burst = 0;
        let state = AppState::new(Arc::new(config), Arc::new(MemoryStore::new()), Arc::new(MockLookup));
        assert!(create_router(state).is_err());

        let state = AppState::new(Arc::new(test_config()), Arc::new(MemoryStore::new()), Arc::new(MockLookup));
        assert_ok!(create_router(state));
    }
}
