// src/timesheet_data.rs

use crate::dashboard::{month_bounds, resolve_date_range, DashboardFilters, DateRange};
use crate::store_client::{StoreClient, StoreError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

// --- Domain Types ---

/// How a CR/SST reference on an entry was matched against its reference
/// table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefSource {
    ById,
    ByCode,
    Unresolved,
}

/// A resolved CR or SST reference as joined onto an entry. Entries carry both
/// an id and a denormalized code; this is the single value object both are
/// folded into.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RefData {
    pub id: Option<String>,
    pub code: Option<String>,
    pub name: Option<String>,
}

impl RefData {
    pub fn source(&self) -> RefSource {
        if self.id.as_deref().is_some_and(|v| !v.is_empty()) {
            RefSource::ById
        } else if self.code.as_deref().is_some_and(|v| !v.is_empty()) {
            RefSource::ByCode
        } else {
            RefSource::Unresolved
        }
    }

    /// Display label: name, then code. None when neither is usable.
    pub fn label(&self) -> Option<&str> {
        self.name
            .as_deref()
            .filter(|v| !v.is_empty())
            .or_else(|| self.code.as_deref().filter(|v| !v.is_empty()))
    }

    /// Report label: code, then name. The CSV export keeps the code-first
    /// convention.
    pub fn code_label(&self) -> Option<&str> {
        self.code
            .as_deref()
            .filter(|v| !v.is_empty())
            .or_else(|| self.name.as_deref().filter(|v| !v.is_empty()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerRef {
    pub id: String,
    pub dni: String,
    pub full_name: String,
}

/// A worker row with its CR assignment joined, as returned by the by-DNI
/// lookup endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Worker {
    pub id: String,
    pub full_name: String,
    pub dni: String,
    pub cr: Option<RefData>,
}

/// The minimal worker projection needed to build an entry upsert payload.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkerAssignment {
    pub id: String,
    pub cr_id: Option<String>,
}

/// A timesheet row joined with its worker/CR/SST display data. Read-only
/// projection, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichedEntry {
    pub work_date: String,
    #[serde(default)]
    pub hours_normal: Option<f64>,
    #[serde(default)]
    pub hours_extra: Option<f64>,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub worker: Option<WorkerRef>,
    #[serde(default)]
    pub cr: Option<RefData>,
    #[serde(default)]
    pub sst: Option<RefData>,
}

/// A stored timesheet row as the entry endpoints return it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimesheetEntry {
    #[serde(default)]
    pub id: Option<String>,
    pub worker_id: String,
    pub work_date: String,
    #[serde(default)]
    pub sst_id: Option<String>,
    #[serde(default)]
    pub sst_code: Option<String>,
    #[serde(default)]
    pub cr_id: Option<String>,
    #[serde(default)]
    pub hours_normal: Option<f64>,
    #[serde(default)]
    pub hours_extra: Option<f64>,
    #[serde(default)]
    pub comment: Option<String>,
}

/// Upsert payload for an entry, keyed on (worker_id, work_date). The single
/// SST input value is written to both the id and code columns; the worker's
/// current CR assignment is frozen onto the row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntryUpsert {
    pub worker_id: String,
    pub work_date: String,
    pub sst_id: Option<String>,
    pub sst_code: Option<String>,
    pub hours_normal: f64,
    pub hours_extra: f64,
    pub comment: Option<String>,
    pub cr_id: Option<String>,
}

const ENTRY_COLUMNS: &str =
    "id,worker_id,work_date,sst_id,sst_code,cr_id,hours_normal,hours_extra,comment";
const WORKER_COLUMNS: &str = "id,full_name,dni,cr:crs(id,code,name)";

// --- Data Service ---

#[derive(Clone)]
pub struct TimesheetDataService {
    store: Arc<StoreClient>,
}

impl TimesheetDataService {
    pub fn new(store: Arc<StoreClient>) -> Self {
        Self { store }
    }

    /// Resolves the filter range and runs the single joined range query the
    /// dashboard and report endpoints share. Returns the enriched rows plus
    /// the resolved range.
    pub async fn fetch_entries_with_relations(
        &self,
        filters: &DashboardFilters,
    ) -> Result<(Vec<EnrichedEntry>, DateRange), StoreError> {
        let range = resolve_date_range(filters);
        info!(
            "Fetching timesheet entries from {} to {}",
            range.start, range.end
        );

        // With a DNI filter the embed must be an inner join, otherwise the
        // restriction only nulls out the child record instead of dropping the
        // row.
        let worker_embed = if filters.dni.is_some() {
            "worker:workers!inner(id,dni,full_name)"
        } else {
            "worker:workers(id,dni,full_name)"
        };
        let select = format!(
            "work_date,hours_normal,hours_extra,comment,{},cr:crs(id,code,name),sst:ssts(id,code,name)",
            worker_embed
        );

        let mut query: Vec<(&str, String)> = vec![
            ("select", select),
            ("work_date", format!("gte.{}", range.start)),
            ("work_date", format!("lte.{}", range.end)),
        ];
        if let Some(cr_id) = &filters.cr_id {
            query.push(("cr_id", format!("eq.{}", cr_id)));
        }
        if let Some(sst_id) = &filters.sst_id {
            query.push(("sst_id", format!("eq.{}", sst_id)));
        }
        if let Some(sst_code) = &filters.sst_code {
            query.push(("sst_code", format!("eq.{}", sst_code)));
        }
        if let Some(dni) = &filters.dni {
            query.push(("worker.dni", format!("eq.{}", dni)));
        }

        let entries: Vec<EnrichedEntry> = self.store.select("timesheet_entries", &query).await?;

        let unresolved = entries
            .iter()
            .filter(|e| {
                e.sst
                    .as_ref()
                    .map_or(true, |r| r.source() == RefSource::Unresolved)
            })
            .count();
        if unresolved > 0 {
            debug!("{} entries in range without a resolved SST", unresolved);
        }

        Ok((entries, range))
    }

    /// Looks up a worker (with CR assignment joined) by DNI.
    pub async fn find_worker_by_dni(&self, dni: &str) -> Result<Option<Worker>, StoreError> {
        info!("Looking up worker by DNI {}", dni);
        let query = [
            ("select", WORKER_COLUMNS.to_string()),
            ("dni", format!("eq.{}", dni)),
        ];
        self.store.select_one("workers", &query).await
    }

    /// Minimal worker projection by internal id, for entry creation.
    pub async fn find_worker_assignment(
        &self,
        worker_id: &str,
    ) -> Result<Option<WorkerAssignment>, StoreError> {
        let query = [
            ("select", "id,cr_id".to_string()),
            ("id", format!("eq.{}", worker_id)),
        ];
        self.store.select_one("workers", &query).await
    }

    /// Minimal worker projection by DNI, for bulk-import reconciliation.
    pub async fn find_assignment_by_dni(
        &self,
        dni: &str,
    ) -> Result<Option<WorkerAssignment>, StoreError> {
        let query = [
            ("select", "id,cr_id".to_string()),
            ("dni", format!("eq.{}", dni)),
        ];
        self.store.select_one("workers", &query).await
    }

    /// Lists one worker's entries for a calendar month.
    pub async fn entries_for_worker_month(
        &self,
        worker_id: &str,
        year: i32,
        month: u32,
    ) -> Result<Vec<TimesheetEntry>, StoreError> {
        let (start, end) = month_bounds(year, month)
            .ok_or_else(|| StoreError::Config(format!("invalid month {}-{}", year, month)))?;
        let query = [
            ("select", ENTRY_COLUMNS.to_string()),
            ("worker_id", format!("eq.{}", worker_id)),
            ("work_date", format!("gte.{}", start)),
            ("work_date", format!("lte.{}", end)),
        ];
        self.store.select("timesheet_entries", &query).await
    }

    /// Upserts one entry keyed on (worker_id, work_date) and returns the
    /// stored row.
    pub async fn upsert_entry(&self, payload: &EntryUpsert) -> Result<TimesheetEntry, StoreError> {
        info!(
            "Upserting entry for worker {} on {}",
            payload.worker_id, payload.work_date
        );
        let rows: Vec<TimesheetEntry> = self
            .store
            .upsert("timesheet_entries", "worker_id,work_date", payload)
            .await?;
        rows.into_iter().next().ok_or_else(|| StoreError::Api {
            status: reqwest::StatusCode::INTERNAL_SERVER_ERROR,
            message: "upsert returned no representation".to_string(),
        })
    }
}
