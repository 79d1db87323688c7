// src/main.rs

use anyhow::Context;
use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{Datelike, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::env;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

mod bulk_import;
mod dashboard;
mod report;
mod store_client;
mod timesheet_data;

mod dashboard_tests;

use bulk_import::ImportError;
use dashboard::DashboardFilters;
use report::ReportError;
use store_client::{StoreClient, StoreConfig, StoreError};
use timesheet_data::{EntryUpsert, TimesheetDataService};

const DEFAULT_PORT: u16 = 3000;

// --- Error Handling ---

#[derive(Error, Debug)]
enum AppError {
    #[error("Supabase no está configurado")]
    StoreNotConfigured,

    #[error("{0}")]
    MissingParams(&'static str),

    #[error("Trabajador no encontrado")]
    WorkerNotFound,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Import(#[from] ImportError),

    #[error(transparent)]
    Report(#[from] ReportError),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        error!("Request failed: {}", self);

        let (status, message) = match &self {
            AppError::StoreNotConfigured => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()),
            AppError::MissingParams(msg) => (StatusCode::BAD_REQUEST, (*msg).to_string()),
            AppError::WorkerNotFound => (StatusCode::NOT_FOUND, self.to_string()),
            AppError::Store(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.public_message()),
            AppError::Import(e) => (StatusCode::BAD_REQUEST, e.to_string()),
            AppError::Report(_) => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()),
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

// --- Application State ---

#[derive(Clone)]
struct AppState {
    data: Option<TimesheetDataService>,
}

impl AppState {
    /// The store is checked eagerly, before any query a handler would run.
    fn data(&self) -> Result<&TimesheetDataService, AppError> {
        self.data.as_ref().ok_or(AppError::StoreNotConfigured)
    }
}

// --- Server ---

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let data = match StoreConfig::from_env() {
        Some(config) => Some(TimesheetDataService::new(Arc::new(StoreClient::new(
            config,
        )?))),
        None => {
            warn!("Supabase no está configurado; las llamadas reales a la base de datos fallarán.");
            None
        }
    };

    let state = AppState { data };

    let app = Router::new()
        .route("/api/dashboard/summary", get(dashboard_summary))
        .route("/api/dashboard/by-cr", get(dashboard_by_cr))
        .route("/api/dashboard/by-sst", get(dashboard_by_sst))
        .route("/api/dashboard/by-day", get(dashboard_by_day))
        .route("/api/report/export", get(report_export))
        .route(
            "/api/timesheet-entries",
            get(list_timesheet_entries).post(upsert_timesheet_entry),
        )
        .route("/api/timesheet-entries/bulk", post(bulk_upload))
        .route("/api/workers/by-dni", get(worker_by_dni))
        .route("/health", get(health_check))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let port = env::var("PORT")
        .ok()
        .and_then(|v| v.parse::<u16>().ok())
        .unwrap_or(DEFAULT_PORT);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Starting server on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind server address")?;
    axum::serve(listener, app)
        .await
        .context("HTTP server failed")?;

    Ok(())
}

async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

// --- Dashboard Handlers ---

async fn dashboard_summary(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Value>, AppError> {
    let data = state.data()?;
    let filters = DashboardFilters::from_query(&params);
    let (entries, range) = data.fetch_entries_with_relations(&filters).await?;

    let now = Utc::now();
    let ref_year = filters.ref_year().unwrap_or_else(|| now.year());
    let ref_month = filters.ref_month().unwrap_or_else(|| now.month());
    let summary = dashboard::summarize(&entries, ref_year, ref_month);

    Ok(Json(json!({
        "monthHours": summary.month_hours,
        "yearHours": summary.year_hours,
        "topCr": summary.top_cr,
        "topSst": summary.top_sst,
        "range": range,
    })))
}

async fn dashboard_by_cr(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Value>, AppError> {
    let data = state.data()?;
    let filters = DashboardFilters::from_query(&params);
    let (entries, range) = data.fetch_entries_with_relations(&filters).await?;
    let aggregated = dashboard::aggregate_by_cr(&entries);

    Ok(Json(json!({
        "monthly": aggregated.monthly,
        "totals": aggregated.totals,
        "range": range,
    })))
}

async fn dashboard_by_sst(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Value>, AppError> {
    let data = state.data()?;
    let filters = DashboardFilters::from_query(&params);
    let (entries, range) = data.fetch_entries_with_relations(&filters).await?;
    let aggregated = dashboard::aggregate_by_sst(&entries);

    Ok(Json(json!({
        "monthly": aggregated.monthly,
        "totals": aggregated.totals,
        "range": range,
    })))
}

async fn dashboard_by_day(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Value>, AppError> {
    let data = state.data()?;
    let filters = DashboardFilters::from_query(&params);
    let (entries, range) = data.fetch_entries_with_relations(&filters).await?;
    let items = dashboard::aggregate_by_day(&entries);

    Ok(Json(json!({ "items": items, "range": range })))
}

// --- Report Handler ---

async fn report_export(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Response, AppError> {
    let data = state.data()?;
    let filters = DashboardFilters::from_query(&params);
    let (entries, _range) = data.fetch_entries_with_relations(&filters).await?;
    let csv_document = report::entries_to_csv(&entries)?;

    let headers = [
        (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", report::EXPORT_FILE_NAME),
        ),
    ];
    Ok((headers, csv_document).into_response())
}

// --- Timesheet Entry Handlers ---

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListEntriesParams {
    #[serde(default)]
    worker_id: Option<String>,
    #[serde(default)]
    month: Option<String>,
    #[serde(default)]
    year: Option<String>,
}

async fn list_timesheet_entries(
    State(state): State<AppState>,
    Query(params): Query<ListEntriesParams>,
) -> Result<Json<Value>, AppError> {
    const REQUIRED: &str = "workerId, month y year son requeridos";

    let worker_id = params
        .worker_id
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or(AppError::MissingParams(REQUIRED))?;
    let year: i32 = params
        .year
        .as_deref()
        .and_then(|v| v.trim().parse().ok())
        .ok_or(AppError::MissingParams(REQUIRED))?;
    let month: u32 = params
        .month
        .as_deref()
        .and_then(|v| v.trim().parse().ok())
        .filter(|m| (1..=12).contains(m))
        .ok_or(AppError::MissingParams(REQUIRED))?;

    let data = state.data()?;
    let items = data.entries_for_worker_month(worker_id, year, month).await?;

    Ok(Json(json!({ "items": items })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpsertEntryBody {
    #[serde(default)]
    worker_id: Option<String>,
    #[serde(default)]
    work_date: Option<String>,
    #[serde(default)]
    sst: Value,
    #[serde(default)]
    hours_normal: Value,
    #[serde(default)]
    hours_extra: Value,
    #[serde(default)]
    comment: Option<String>,
}

/// Hours arrive as whatever the form sent; numbers and numeric strings pass
/// through, anything else counts as 0.
fn coerce_hours(value: &Value) -> f64 {
    match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

async fn upsert_timesheet_entry(
    State(state): State<AppState>,
    Json(body): Json<UpsertEntryBody>,
) -> Result<Json<Value>, AppError> {
    const REQUIRED: &str = "workerId y workDate son requeridos";

    let worker_id = body
        .worker_id
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or(AppError::MissingParams(REQUIRED))?;
    let work_date = body
        .work_date
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or(AppError::MissingParams(REQUIRED))?;

    let data = state.data()?;
    let worker = match data.find_worker_assignment(worker_id).await {
        Ok(Some(worker)) => worker,
        Ok(None) => return Err(AppError::WorkerNotFound),
        Err(e) => {
            warn!("Worker lookup failed for id {}: {}", worker_id, e);
            return Err(AppError::WorkerNotFound);
        }
    };

    // The single sst value feeds both the id and the denormalized code
    // column, as the calendar form does.
    let sst = match &body.sst {
        Value::String(s) => Some(s.clone()),
        _ => None,
    };

    let payload = EntryUpsert {
        worker_id: worker.id,
        work_date: work_date.to_string(),
        sst_id: sst.clone(),
        sst_code: sst,
        hours_normal: coerce_hours(&body.hours_normal),
        hours_extra: coerce_hours(&body.hours_extra),
        comment: body.comment.filter(|c| !c.is_empty()),
        cr_id: worker.cr_id,
    };

    let item = data.upsert_entry(&payload).await?;
    Ok(Json(json!({ "item": item })))
}

async fn bulk_upload(
    State(state): State<AppState>,
    body: String,
) -> Result<Json<bulk_import::BulkReport>, AppError> {
    let data = state.data()?;
    let rows = bulk_import::parse_document(&body)?;
    let report = bulk_import::run_import(data, rows).await;
    Ok(Json(report))
}

// --- Worker Handler ---

#[derive(Debug, Deserialize)]
struct ByDniParams {
    #[serde(default)]
    dni: Option<String>,
}

async fn worker_by_dni(
    State(state): State<AppState>,
    Query(params): Query<ByDniParams>,
) -> Result<Response, AppError> {
    let dni = params
        .dni
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or(AppError::MissingParams("dni requerido"))?;

    let data = state.data()?;
    let worker = data.find_worker_by_dni(dni).await?;

    match worker {
        Some(worker) => Ok(Json(json!({ "worker": worker })).into_response()),
        None => Ok((
            StatusCode::NOT_FOUND,
            Json(json!({ "worker": null, "error": "Trabajador no encontrado" })),
        )
            .into_response()),
    }
}
