// src/dashboard.rs
//
// Date-range resolution and the pure aggregation passes behind the dashboard
// endpoints. All aggregators are single-pass reducers over an already fetched
// enriched-entry slice.

use crate::timesheet_data::{EnrichedEntry, RefData};
use chrono::{Datelike, NaiveDate, Utc};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashMap;

/// Sentinel label for entries whose CR reference is unresolved.
pub const UNASSIGNED_CR: &str = "Sin CR";
/// Sentinel label for entries whose SST reference is unresolved.
pub const UNASSIGNED_SST: &str = "Sin SST";

/// Floor for open-ended "desde"/"hasta" ranges.
pub const RANGE_START_FLOOR: &str = "1900-01-01";

const TOP_TOTALS: usize = 10;
const TOP_SUMMARY: usize = 5;

const ISO_DATE: &str = "%Y-%m-%d";

// --- Filters ---

#[derive(Debug, Clone, Default)]
pub struct DashboardFilters {
    pub desde: Option<String>,
    pub hasta: Option<String>,
    pub dni: Option<String>,
    pub cr_id: Option<String>,
    pub sst_id: Option<String>,
    pub sst_code: Option<String>,
    pub year: Option<String>,
    pub month: Option<String>,
}

impl DashboardFilters {
    /// Builds filters from raw query parameters. Blank values count as
    /// absent; the year/month parameters accept their Spanish aliases.
    pub fn from_query(params: &HashMap<String, String>) -> Self {
        let take = |key: &str| {
            params
                .get(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        Self {
            desde: take("desde"),
            hasta: take("hasta"),
            dni: take("dni"),
            cr_id: take("cr_id"),
            sst_id: take("sst_id"),
            sst_code: take("sst_code"),
            year: take("ano").or_else(|| take("año")).or_else(|| take("year")),
            month: take("mes").or_else(|| take("month")),
        }
    }

    pub fn ref_year(&self) -> Option<i32> {
        self.year.as_deref().and_then(|v| v.trim().parse().ok())
    }

    pub fn ref_month(&self) -> Option<u32> {
        self.month.as_deref().and_then(|v| v.trim().parse().ok())
    }
}

// --- Date-range resolution ---

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DateRange {
    pub start: String,
    pub end: String,
}

/// First and last day of a calendar month as ISO strings. None for an
/// impossible year/month pair.
pub fn month_bounds(year: i32, month: u32) -> Option<(String, String)> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let first_of_next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    let last = first_of_next.pred_opt()?;
    Some((
        first.format(ISO_DATE).to_string(),
        last.format(ISO_DATE).to_string(),
    ))
}

fn current_month_range(today: NaiveDate) -> DateRange {
    // Construction from an existing date cannot produce an invalid month.
    let (start, end) = month_bounds(today.year(), today.month())
        .unwrap_or_else(|| (today.format(ISO_DATE).to_string(), today.format(ISO_DATE).to_string()));
    DateRange { start, end }
}

/// Turns filter inputs into a concrete inclusive [start, end] interval.
/// Precedence: explicit desde/hasta, then year+month, then year, then the
/// current UTC calendar month. Year/month values that do not form a valid
/// calendar date are treated as absent.
pub fn resolve_date_range(filters: &DashboardFilters) -> DateRange {
    resolve_date_range_from(filters, Utc::now().date_naive())
}

pub fn resolve_date_range_from(filters: &DashboardFilters, today: NaiveDate) -> DateRange {
    if filters.desde.is_some() || filters.hasta.is_some() {
        let start = filters
            .desde
            .clone()
            .unwrap_or_else(|| RANGE_START_FLOOR.to_string());
        let end = filters
            .hasta
            .clone()
            .unwrap_or_else(|| today.format(ISO_DATE).to_string());
        return DateRange { start, end };
    }

    if let (Some(year), Some(month)) = (filters.ref_year(), filters.ref_month()) {
        if let Some((start, end)) = month_bounds(year, month) {
            return DateRange { start, end };
        }
    }

    if let Some(year) = filters.ref_year() {
        if let (Some(first), Some(last)) = (
            NaiveDate::from_ymd_opt(year, 1, 1),
            NaiveDate::from_ymd_opt(year, 12, 31),
        ) {
            return DateRange {
                start: first.format(ISO_DATE).to_string(),
                end: last.format(ISO_DATE).to_string(),
            };
        }
    }

    current_month_range(today)
}

// --- Shared helpers ---

/// Total hours for one entry; missing values count as 0.
pub fn sum_hours(entry: &EnrichedEntry) -> f64 {
    entry.hours_normal.unwrap_or(0.0) + entry.hours_extra.unwrap_or(0.0)
}

/// `YYYY-MM` bucket key for a work date. Unparseable dates keep their raw
/// string so they still bucket deterministically.
pub fn month_key(work_date: &str) -> String {
    NaiveDate::parse_from_str(work_date, ISO_DATE)
        .map(|d| d.format("%Y-%m").to_string())
        .unwrap_or_else(|_| work_date.to_string())
}

/// The one place the name -> code -> sentinel fallback lives. Every
/// aggregator labels its dimension through here.
pub fn dimension_label(reference: Option<&RefData>, unassigned: &str) -> String {
    reference
        .and_then(RefData::label)
        .unwrap_or(unassigned)
        .to_string()
}

fn by_hours_desc(a: f64, b: f64) -> Ordering {
    b.partial_cmp(&a).unwrap_or(Ordering::Equal)
}

/// Accumulates into a Vec keyed by `key`, preserving first-occurrence
/// insertion order so the stable sorts below keep ties in that order.
fn accumulate<K: PartialEq>(buckets: &mut Vec<(K, f64)>, key: K, hours: f64) {
    match buckets.iter_mut().find(|(k, _)| *k == key) {
        Some((_, total)) => *total += hours,
        None => buckets.push((key, hours)),
    }
}

fn aggregate_dimension<F>(
    entries: &[EnrichedEntry],
    label_of: F,
) -> (Vec<(String, String, f64)>, Vec<(String, f64)>)
where
    F: Fn(&EnrichedEntry) -> String,
{
    let mut monthly: Vec<((String, String), f64)> = Vec::new();
    let mut totals: Vec<(String, f64)> = Vec::new();

    for entry in entries {
        let label = label_of(entry);
        let month = month_key(&entry.work_date);
        let hours = sum_hours(entry);

        accumulate(&mut monthly, (label.clone(), month), hours);
        accumulate(&mut totals, label, hours);
    }

    let mut monthly: Vec<(String, String, f64)> = monthly
        .into_iter()
        .map(|((label, month), hours)| (label, month, hours))
        .collect();
    monthly.sort_by(|a, b| a.1.cmp(&b.1));

    totals.sort_by(|a, b| by_hours_desc(a.1, b.1));
    totals.truncate(TOP_TOTALS);

    (monthly, totals)
}

// --- By-CR ---

#[derive(Debug, Clone, Serialize)]
pub struct CrMonthly {
    pub cr: String,
    pub month: String,
    pub hours: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CrTotal {
    pub cr: String,
    pub hours: f64,
}

#[derive(Debug, Serialize)]
pub struct CrBreakdown {
    pub monthly: Vec<CrMonthly>,
    pub totals: Vec<CrTotal>,
}

pub fn aggregate_by_cr(entries: &[EnrichedEntry]) -> CrBreakdown {
    let (monthly, totals) =
        aggregate_dimension(entries, |e| dimension_label(e.cr.as_ref(), UNASSIGNED_CR));
    CrBreakdown {
        monthly: monthly
            .into_iter()
            .map(|(cr, month, hours)| CrMonthly { cr, month, hours })
            .collect(),
        totals: totals
            .into_iter()
            .map(|(cr, hours)| CrTotal { cr, hours })
            .collect(),
    }
}

// --- By-SST ---

#[derive(Debug, Clone, Serialize)]
pub struct SstMonthly {
    pub sst: String,
    pub month: String,
    pub hours: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SstTotal {
    pub sst: String,
    pub hours: f64,
}

#[derive(Debug, Serialize)]
pub struct SstBreakdown {
    pub monthly: Vec<SstMonthly>,
    pub totals: Vec<SstTotal>,
}

pub fn aggregate_by_sst(entries: &[EnrichedEntry]) -> SstBreakdown {
    let (monthly, totals) =
        aggregate_dimension(entries, |e| dimension_label(e.sst.as_ref(), UNASSIGNED_SST));
    SstBreakdown {
        monthly: monthly
            .into_iter()
            .map(|(sst, month, hours)| SstMonthly { sst, month, hours })
            .collect(),
        totals: totals
            .into_iter()
            .map(|(sst, hours)| SstTotal { sst, hours })
            .collect(),
    }
}

// --- By-day ---

#[derive(Debug, Clone, Serialize)]
pub struct DayHours {
    pub date: String,
    pub hours: f64,
}

pub fn aggregate_by_day(entries: &[EnrichedEntry]) -> Vec<DayHours> {
    let mut daily: Vec<(String, f64)> = Vec::new();
    for entry in entries {
        accumulate(&mut daily, entry.work_date.clone(), sum_hours(entry));
    }
    daily.sort_by(|a, b| a.0.cmp(&b.0));
    daily
        .into_iter()
        .map(|(date, hours)| DayHours { date, hours })
        .collect()
}

// --- Summary ---

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub month_hours: f64,
    pub year_hours: f64,
    pub top_cr: Vec<CrTotal>,
    pub top_sst: Vec<SstTotal>,
}

/// Total hours for the reference month and year plus the top-5 CR/SST totals
/// over the whole filtered range. The reference is the explicit filter
/// year/month, falling back to the current UTC date at the call site.
pub fn summarize(entries: &[EnrichedEntry], ref_year: i32, ref_month: u32) -> Summary {
    let mut month_hours = 0.0;
    let mut year_hours = 0.0;
    let mut cr_totals: Vec<(String, f64)> = Vec::new();
    let mut sst_totals: Vec<(String, f64)> = Vec::new();

    for entry in entries {
        let hours = sum_hours(entry);

        if let Ok(date) = NaiveDate::parse_from_str(&entry.work_date, ISO_DATE) {
            if date.year() == ref_year {
                year_hours += hours;
                if date.month() == ref_month {
                    month_hours += hours;
                }
            }
        }

        accumulate(
            &mut cr_totals,
            dimension_label(entry.cr.as_ref(), UNASSIGNED_CR),
            hours,
        );
        accumulate(
            &mut sst_totals,
            dimension_label(entry.sst.as_ref(), UNASSIGNED_SST),
            hours,
        );
    }

    cr_totals.sort_by(|a, b| by_hours_desc(a.1, b.1));
    cr_totals.truncate(TOP_SUMMARY);
    sst_totals.sort_by(|a, b| by_hours_desc(a.1, b.1));
    sst_totals.truncate(TOP_SUMMARY);

    Summary {
        month_hours,
        year_hours,
        top_cr: cr_totals
            .into_iter()
            .map(|(cr, hours)| CrTotal { cr, hours })
            .collect(),
        top_sst: sst_totals
            .into_iter()
            .map(|(sst, hours)| SstTotal { sst, hours })
            .collect(),
    }
}
