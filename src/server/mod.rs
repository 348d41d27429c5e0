//! HTTP API: manual sync trigger, safety checks and status

use crate::check::{create_matcher, ProductInput, SafetyCheckResult, SafetyChecker, SimilarityMatcher};
use crate::commands::{cmd_status, cmd_sync, StatusInfo, SyncOverrides};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::meta::MetaDb;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Samples included in `GET /status`
const STATUS_SAMPLE: u32 = 5;

/// Shared state behind every handler
pub struct AppState {
    config: Config,
    db: MetaDb,
    checker: SafetyChecker,
}

impl AppState {
    pub fn new(config: Config, db: MetaDb) -> Self {
        let matcher = match create_matcher(&config.check) {
            Ok(matcher) => Some(matcher),
            Err(e) => {
                warn!("Safety checks limited: {}", e);
                None
            }
        };
        Self::with_matcher(config, db, matcher)
    }

    pub fn with_matcher(
        config: Config,
        db: MetaDb,
        matcher: Option<Arc<dyn SimilarityMatcher>>,
    ) -> Self {
        let checker = SafetyChecker::new(db.clone(), matcher, config.check.clone());
        Self {
            config,
            db,
            checker,
        }
    }
}

/// Error wrapper mapping crate errors onto JSON responses
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, label) = match &self.0 {
            Error::InvalidInput(_) => (StatusCode::BAD_REQUEST, "Missing required fields"),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error"),
        };

        let body = json!({
            "error": label,
            "message": self.0.to_string(),
            "timestamp": Utc::now().to_rfc3339(),
        });
        (status, Json(body)).into_response()
    }
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/status", get(status))
        .route("/sync", get(trigger_sync).post(trigger_sync))
        .route("/check", get(check_query).post(check_body))
        .with_state(state)
}

/// Bind and serve until ctrl-c
pub async fn serve(config: Config, db: MetaDb, bind: &str) -> Result<()> {
    let state = Arc::new(AppState::new(config, db));
    let router = build_router(state);

    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn status(State(state): State<Arc<AppState>>) -> std::result::Result<Json<StatusInfo>, ApiError> {
    let info = cmd_status(&state.config, &state.db, STATUS_SAMPLE).await?;
    Ok(Json(info))
}

async fn trigger_sync(State(state): State<Arc<AppState>>) -> Response {
    info!("Manual Safety Gate sync triggered via HTTP");

    match cmd_sync(&state.config, &state.db, SyncOverrides::default()).await {
        Ok(summary) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "message": "Safety Gate loader completed successfully",
                "processed": summary.processed,
                "timestamp": Utc::now().to_rfc3339(),
            })),
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Manual Safety Gate sync failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "success": false,
                    "message": "Safety Gate loader failed",
                    "error": e.to_string(),
                    "timestamp": Utc::now().to_rfc3339(),
                })),
            )
                .into_response()
        }
    }
}

/// Query parameters of `GET /check`
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CheckQuery {
    name: Option<String>,
    /// Alias of `name`
    product: Option<String>,
    category: Option<String>,
    description: Option<String>,
    image_url: Option<String>,
    brand: Option<String>,
    model: Option<String>,
}

impl From<CheckQuery> for ProductInput {
    fn from(query: CheckQuery) -> Self {
        Self {
            name: query.name.or(query.product).unwrap_or_default(),
            category: query.category.unwrap_or_default(),
            description: query.description.unwrap_or_default(),
            image_url: query.image_url,
            brand: query.brand,
            model: query.model,
        }
    }
}

async fn check_query(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CheckQuery>,
) -> std::result::Result<Json<SafetyCheckResult>, ApiError> {
    run_check(&state, query.into()).await
}

async fn check_body(
    State(state): State<Arc<AppState>>,
    payload: std::result::Result<Json<ProductInput>, JsonRejection>,
) -> std::result::Result<Json<SafetyCheckResult>, ApiError> {
    let Json(product) = payload
        .map_err(|e| Error::InvalidInput(format!("unreadable product body: {}", e.body_text())))?;
    run_check(&state, product).await
}

async fn run_check(
    state: &AppState,
    product: ProductInput,
) -> std::result::Result<Json<SafetyCheckResult>, ApiError> {
    info!(product = %product.name, "Product safety check requested");
    let result = state
        .checker
        .check(&product, Utc::now().date_naive())
        .await
        .map_err(|e| {
            error!(error = %e, "Product safety check failed");
            e
        })?;
    info!(
        is_safe = result.is_safe,
        warnings = result.warnings.len(),
        "Product safety check completed"
    );
    Ok(Json(result))
}
