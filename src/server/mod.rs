//! JSON HTTP API over the prediction orchestrator

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::config::Config;
use crate::dashboard::{build_report, DashboardFilter, DashboardReport};
use crate::data::schema::{describe_column, ColumnSelection, FEATURE_COLUMNS};
use crate::data::{ChurnError, CustomerRecord, ErrorCategory, RawTable};
use crate::history::{HistoryEntry, HistorySummary};
use crate::ml::{ModelKind, ModelRegistry};
use crate::orchestrator::{
    BulkPrediction, PredictionOrchestrator, Session, SinglePrediction, LOGIN_REQUIRED,
};

/// Header carrying the authenticated username
pub const USER_HEADER: &str = "x-churn-user";

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<PredictionOrchestrator>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
    category: &'static str,
}

/// Error returned by every handler
#[derive(Debug)]
pub enum ApiError {
    Churn(ChurnError),
    Task(String),
}

impl From<ChurnError> for ApiError {
    fn from(err: ChurnError) -> Self {
        ApiError::Churn(err)
    }
}

pub fn status_for(category: ErrorCategory) -> StatusCode {
    match category {
        ErrorCategory::MissingResource => StatusCode::NOT_FOUND,
        ErrorCategory::MalformedInput
        | ErrorCategory::SchemaMismatch
        | ErrorCategory::ContractViolation => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorCategory::UnknownModel => StatusCode::BAD_REQUEST,
        ErrorCategory::Unauthenticated => StatusCode::UNAUTHORIZED,
        ErrorCategory::UnfittedDependency | ErrorCategory::Internal => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (category, message) = match &self {
            ApiError::Churn(err) => (err.category(), err.to_string()),
            ApiError::Task(message) => (ErrorCategory::Internal, message.clone()),
        };
        let status = status_for(category);
        if status.is_server_error() {
            error!(category = category.as_str(), error = %message, "Request failed");
        }
        (
            status,
            Json(ErrorResponse {
                error: message,
                category: category.as_str(),
            }),
        )
            .into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

/// Run file-bound work off the async workers
async fn blocking<T, F>(work: F) -> ApiResult<T>
where
    F: FnOnce() -> Result<T, ChurnError> + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(work).await {
        Ok(result) => Ok(Json(result?)),
        Err(e) => Err(ApiError::Task(format!("worker task failed: {}", e))),
    }
}

fn session_from(headers: &HeaderMap, orchestrator: &PredictionOrchestrator) -> Result<Session, ApiError> {
    let user = headers
        .get(USER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .ok_or_else(|| ChurnError::Unauthenticated(LOGIN_REQUIRED.to_string()))?;
    Ok(orchestrator.session_for(user))
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub models: Vec<ModelKind>,
}

#[derive(Debug, Serialize)]
pub struct ModelInfo {
    pub name: &'static str,
    pub slug: &'static str,
    pub available: bool,
    pub cached: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct ModelQuery {
    pub model: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DashboardQuery {
    pub gender: Option<String>,
    pub payment_method: Option<String>,
    pub contract: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ColumnsQuery {
    pub selection: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ColumnInfo {
    pub name: &'static str,
    pub numeric: bool,
    pub description: Option<&'static str>,
}

#[derive(Debug, Serialize)]
pub struct ColumnsResponse {
    pub selection: ColumnSelection,
    pub columns: Vec<ColumnInfo>,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        models: state.orchestrator.registry().available_models(),
    })
}

pub async fn models(State(state): State<AppState>) -> Json<Vec<ModelInfo>> {
    let registry = state.orchestrator.registry();
    let available = registry.available_models();
    Json(
        ModelKind::all()
            .into_iter()
            .map(|kind| ModelInfo {
                name: kind.display_name(),
                slug: kind.slug(),
                available: available.contains(&kind),
                cached: registry.is_cached(kind),
            })
            .collect(),
    )
}

pub async fn predict(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ModelQuery>,
    Json(record): Json<CustomerRecord>,
) -> ApiResult<SinglePrediction> {
    let mut session = session_from(&headers, &state.orchestrator)?;
    if let Some(model) = query.model.as_deref() {
        session.select_model(model.parse()?);
    }
    let orchestrator = Arc::clone(&state.orchestrator);
    blocking(move || orchestrator.predict_record(&mut session, record)).await
}

pub async fn predict_bulk(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ModelQuery>,
    body: String,
) -> ApiResult<BulkPrediction> {
    let mut session = session_from(&headers, &state.orchestrator)?;
    if let Some(model) = query.model.as_deref() {
        session.select_model(model.parse()?);
    }
    let orchestrator = Arc::clone(&state.orchestrator);
    blocking(move || {
        let table = RawTable::from_csv_reader(body.as_bytes())?;
        orchestrator.predict_bulk_table(&session, &table)
    })
    .await
}

pub async fn history(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Vec<HistoryEntry>> {
    let session = session_from(&headers, &state.orchestrator)?;
    let orchestrator = Arc::clone(&state.orchestrator);
    blocking(move || {
        session.require_authenticated()?;
        match query.limit {
            Some(limit) => orchestrator.history().read_recent(limit),
            None => orchestrator.read_history(&session),
        }
    })
    .await
}

pub async fn history_summary(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<HistorySummary> {
    let session = session_from(&headers, &state.orchestrator)?;
    let orchestrator = Arc::clone(&state.orchestrator);
    blocking(move || orchestrator.history_summary(&session)).await
}

pub async fn dashboard(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<DashboardQuery>,
) -> ApiResult<DashboardReport> {
    let session = session_from(&headers, &state.orchestrator)?;
    let filter = DashboardFilter {
        gender: DashboardFilter::split_list(query.gender.as_deref()),
        payment_method: DashboardFilter::split_list(query.payment_method.as_deref()),
        contract: DashboardFilter::split_list(query.contract.as_deref()),
    };
    let orchestrator = Arc::clone(&state.orchestrator);
    blocking(move || {
        let dataset = orchestrator.load_dataset(&session)?;
        Ok(build_report(&dataset, &filter))
    })
    .await
}

pub async fn data_columns(
    headers: HeaderMap,
    State(state): State<AppState>,
    Query(query): Query<ColumnsQuery>,
) -> ApiResult<ColumnsResponse> {
    session_from(&headers, &state.orchestrator)?.require_authenticated()?;
    let selection = match query.selection.as_deref() {
        Some(raw) => ColumnSelection::parse(raw)
            .ok_or_else(|| ChurnError::invalid_value("selection", raw))?,
        None => ColumnSelection::default(),
    };
    let columns = selection
        .columns()
        .into_iter()
        .map(|name| ColumnInfo {
            name,
            numeric: FEATURE_COLUMNS
                .iter()
                .any(|c| c.name == name && c.kind.is_numeric()),
            description: describe_column(name),
        })
        .collect();
    Ok(Json(ColumnsResponse { selection, columns }))
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/models", get(models))
        .route("/predict", post(predict))
        .route("/predict/bulk", post(predict_bulk))
        .route("/history", get(history))
        .route("/history/summary", get(history_summary))
        .route("/dashboard", get(dashboard))
        .route("/data/columns", get(data_columns))
        .with_state(state)
}

/// Preload every artifact and serve until the process is stopped
pub async fn serve(config: &Config) -> Result<()> {
    let registry = Arc::new(ModelRegistry::from_config(config));
    registry
        .preload()
        .context("Failed to preload model artifacts")?;
    let orchestrator = PredictionOrchestrator::from_config(config, registry)
        .context("Invalid CHURN_DEFAULT_MODEL value")?;
    let state = AppState {
        orchestrator: Arc::new(orchestrator),
    };

    let addr = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!(address = %addr, "Churn prediction API listening");
    axum::serve(listener, router(state))
        .await
        .context("HTTP server failed")?;
    Ok(())
}
