// src/bulk_import.rs
//
// CSV bulk upload: tokenize the document, resolve each row's worker by DNI,
// and upsert one entry per row, collecting per-row errors keyed by physical
// line number. The parse pass is pure; `run_import` does the sequential
// store round-trips.

use crate::timesheet_data::{EntryUpsert, TimesheetDataService};
use csv::StringRecord;
use serde::Serialize;
use std::fmt;
use thiserror::Error;
use tracing::{info, warn};

/// Columns the upload header must contain (matched case-insensitively, any
/// order; rows are read by named column lookup).
pub const REQUIRED_COLUMNS: [&str; 6] = [
    "dni",
    "fecha",
    "sst",
    "horas_normal",
    "horas_extra",
    "comentario",
];

#[derive(Error, Debug)]
pub enum ImportError {
    #[error("CSV vacío")]
    EmptyDocument,

    #[error("Cabecera inválida. Usa: dni,fecha,sst,horas_normal,horas_extra,comentario")]
    InvalidHeader,

    #[error("CSV inválido: {0}")]
    Malformed(#[from] csv::Error),
}

/// One upload row that passed field validation, still unresolved against the
/// worker table.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportRow {
    /// Physical line the row starts on (the header is line 1).
    pub line: u64,
    pub dni: String,
    pub work_date: String,
    pub sst: Option<String>,
    pub hours_normal: f64,
    pub hours_extra: f64,
    pub comment: Option<String>,
}

/// A row-level failure; rendered as the wire error string.
#[derive(Debug, Clone, PartialEq)]
pub struct RowError {
    pub line: u64,
    pub message: String,
}

impl fmt::Display for RowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fila {}: {}", self.line, self.message)
    }
}

#[derive(Debug, Default, Serialize)]
pub struct BulkReport {
    pub inserted: usize,
    pub errors: Vec<String>,
}

struct ColumnMap {
    dni: usize,
    fecha: usize,
    sst: usize,
    horas_normal: usize,
    horas_extra: usize,
    comentario: usize,
}

impl ColumnMap {
    fn from_headers(headers: &StringRecord) -> Result<Self, ImportError> {
        let find = |name: &str| {
            headers
                .iter()
                .position(|h| h.trim().eq_ignore_ascii_case(name))
                .ok_or(ImportError::InvalidHeader)
        };
        let [dni, fecha, sst, horas_normal, horas_extra, comentario] = REQUIRED_COLUMNS;
        Ok(Self {
            dni: find(dni)?,
            fecha: find(fecha)?,
            sst: find(sst)?,
            horas_normal: find(horas_normal)?,
            horas_extra: find(horas_extra)?,
            comentario: find(comentario)?,
        })
    }
}

/// Hours parse with the upload's lenient numeric contract: blank or
/// unparseable values count as 0.
fn parse_hours(raw: &str) -> f64 {
    raw.trim().parse().unwrap_or(0.0)
}

fn non_blank(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn parse_row(record: &StringRecord, columns: &ColumnMap, line: u64) -> Result<ImportRow, RowError> {
    let field = |index: usize| record.get(index).unwrap_or("").trim();

    let dni = field(columns.dni);
    let fecha = field(columns.fecha);
    if dni.is_empty() || fecha.is_empty() {
        return Err(RowError {
            line,
            message: "dni y fecha son requeridos".to_string(),
        });
    }

    Ok(ImportRow {
        line,
        dni: dni.to_string(),
        work_date: fecha.to_string(),
        sst: non_blank(field(columns.sst)),
        hours_normal: parse_hours(field(columns.horas_normal)),
        hours_extra: parse_hours(field(columns.horas_extra)),
        comment: non_blank(field(columns.comentario)),
    })
}

/// Tokenizes an uploaded document. Fails on an empty body or a header that
/// lacks a required column; individual row failures are returned in place so
/// the import never aborts on them. Blank lines are skipped.
pub fn parse_document(csv_text: &str) -> Result<Vec<Result<ImportRow, RowError>>, ImportError> {
    let trimmed = csv_text.trim();
    if trimmed.is_empty() {
        return Err(ImportError::EmptyDocument);
    }

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(trimmed.as_bytes());
    let columns = ColumnMap::from_headers(reader.headers()?)?;

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        if record.iter().all(|f| f.trim().is_empty()) {
            continue;
        }
        let line = record.position().map(|p| p.line()).unwrap_or(0);
        rows.push(parse_row(&record, &columns, line));
    }
    Ok(rows)
}

/// Processes rows strictly sequentially: look the worker up by DNI, upsert
/// the entry on (worker_id, work_date), and record failures per row. Always
/// runs to the end of the document.
pub async fn run_import(
    data: &TimesheetDataService,
    rows: Vec<Result<ImportRow, RowError>>,
) -> BulkReport {
    let mut report = BulkReport::default();

    for row in rows {
        let row = match row {
            Ok(row) => row,
            Err(e) => {
                report.errors.push(e.to_string());
                continue;
            }
        };

        let worker = match data.find_assignment_by_dni(&row.dni).await {
            Ok(Some(worker)) => worker,
            Ok(None) => {
                report.errors.push(
                    RowError {
                        line: row.line,
                        message: format!("trabajador con DNI {} no encontrado", row.dni),
                    }
                    .to_string(),
                );
                continue;
            }
            Err(e) => {
                warn!("Worker lookup failed for DNI {}: {}", row.dni, e);
                report.errors.push(
                    RowError {
                        line: row.line,
                        message: format!("trabajador con DNI {} no encontrado", row.dni),
                    }
                    .to_string(),
                );
                continue;
            }
        };

        let payload = EntryUpsert {
            worker_id: worker.id,
            work_date: row.work_date,
            sst_id: row.sst.clone(),
            sst_code: row.sst,
            hours_normal: row.hours_normal,
            hours_extra: row.hours_extra,
            comment: row.comment,
            cr_id: worker.cr_id,
        };

        match data.upsert_entry(&payload).await {
            Ok(_) => report.inserted += 1,
            Err(e) => report.errors.push(
                RowError {
                    line: row.line,
                    message: e.public_message(),
                }
                .to_string(),
            ),
        }
    }

    info!(
        "Bulk import finished: {} inserted, {} errors",
        report.inserted,
        report.errors.len()
    );
    report
}
