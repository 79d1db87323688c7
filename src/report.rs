// src/report.rs

use crate::timesheet_data::EnrichedEntry;
use thiserror::Error;

/// Column order of the hours report. One row per entry, no aggregation.
pub const EXPORT_HEADER: [&str; 8] = [
    "dni",
    "trabajador",
    "fecha",
    "sst",
    "cr",
    "horas_normal",
    "horas_extra",
    "comentario",
];

pub const EXPORT_FILE_NAME: &str = "reporte_horas.csv";

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("CSV serialization error")]
    Csv(#[from] csv::Error),

    #[error("CSV output was not valid UTF-8")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("CSV buffer error: {0}")]
    Buffer(String),
}

/// Integral hour values print bare ("8", not "8.0").
fn format_hours(hours: Option<f64>) -> String {
    hours.unwrap_or(0.0).to_string()
}

/// Serializes the filtered entry set to the fixed 8-column CSV document.
/// Fields are quoted (with internal quotes doubled) only when they contain a
/// comma, quote, or newline.
pub fn entries_to_csv(entries: &[EnrichedEntry]) -> Result<String, ReportError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(EXPORT_HEADER)?;

    for entry in entries {
        let dni = entry.worker.as_ref().map(|w| w.dni.as_str()).unwrap_or("");
        let trabajador = entry
            .worker
            .as_ref()
            .map(|w| w.full_name.as_str())
            .unwrap_or("");
        let sst = entry
            .sst
            .as_ref()
            .and_then(|r| r.code_label())
            .unwrap_or("");
        let cr = entry.cr.as_ref().and_then(|r| r.code_label()).unwrap_or("");
        let comentario = entry.comment.as_deref().unwrap_or("");

        writer.write_record([
            dni,
            trabajador,
            entry.work_date.as_str(),
            sst,
            cr,
            format_hours(entry.hours_normal).as_str(),
            format_hours(entry.hours_extra).as_str(),
            comentario,
        ])?;
    }

    let buffer = writer
        .into_inner()
        .map_err(|e| ReportError::Buffer(e.to_string()))?;
    Ok(String::from_utf8(buffer)?)
}
