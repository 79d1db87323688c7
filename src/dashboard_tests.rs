// src/dashboard_tests.rs

#[cfg(test)]
mod tests {
    use crate::dashboard::*;
    use crate::timesheet_data::{EnrichedEntry, RefData, RefSource, WorkerRef};
    use chrono::NaiveDate;
    use std::collections::HashMap;

    // Helper to create a test entry. The cr/sst pairs are (code, name); an
    // empty name models a reference row without a display name.
    fn create_test_entry(
        work_date: &str,
        hours_normal: Option<f64>,
        hours_extra: Option<f64>,
        cr: Option<(&str, &str)>,
        sst: Option<(&str, &str)>,
    ) -> EnrichedEntry {
        let make_ref = |(code, name): (&str, &str)| RefData {
            id: Some(format!("id-{}", code)),
            code: Some(code.to_string()),
            name: if name.is_empty() {
                None
            } else {
                Some(name.to_string())
            },
        };

        EnrichedEntry {
            work_date: work_date.to_string(),
            hours_normal,
            hours_extra,
            comment: None,
            worker: Some(WorkerRef {
                id: "w1".to_string(),
                dni: "12345678A".to_string(),
                full_name: "Ana Pérez".to_string(),
            }),
            cr: cr.map(make_ref),
            sst: sst.map(make_ref),
        }
    }

    fn filters_with(year: Option<&str>, month: Option<&str>) -> DashboardFilters {
        DashboardFilters {
            year: year.map(str::to_string),
            month: month.map(str::to_string),
            ..Default::default()
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 15).unwrap()
    }

    // --- Date-range resolution ---

    #[test]
    fn test_resolve_range_explicit_bounds_win() {
        let filters = DashboardFilters {
            desde: Some("2024-03-05".to_string()),
            hasta: Some("2024-03-20".to_string()),
            year: Some("2023".to_string()),
            month: Some("01".to_string()),
            ..Default::default()
        };
        let range = resolve_date_range_from(&filters, today());
        assert_eq!(
            range,
            DateRange {
                start: "2024-03-05".to_string(),
                end: "2024-03-20".to_string()
            },
            "explicit desde/hasta must take precedence over year/month"
        );
    }

    #[test]
    fn test_resolve_range_desde_only_ends_today() {
        let filters = DashboardFilters {
            desde: Some("2025-01-01".to_string()),
            ..Default::default()
        };
        let range = resolve_date_range_from(&filters, today());
        assert_eq!(range.start, "2025-01-01");
        assert_eq!(range.end, "2025-06-15", "open hasta should close at today");
    }

    #[test]
    fn test_resolve_range_hasta_only_starts_at_floor() {
        let filters = DashboardFilters {
            hasta: Some("2025-02-28".to_string()),
            ..Default::default()
        };
        let range = resolve_date_range_from(&filters, today());
        assert_eq!(range.start, RANGE_START_FLOOR);
        assert_eq!(range.end, "2025-02-28");
    }

    #[test]
    fn test_resolve_range_leap_year_february() {
        let range = resolve_date_range_from(&filters_with(Some("2024"), Some("02")), today());
        assert_eq!(
            range,
            DateRange {
                start: "2024-02-01".to_string(),
                end: "2024-02-29".to_string()
            },
            "February 2024 is a leap month"
        );
    }

    #[test]
    fn test_resolve_range_december_rolls_into_next_year() {
        let range = resolve_date_range_from(&filters_with(Some("2023"), Some("12")), today());
        assert_eq!(range.start, "2023-12-01");
        assert_eq!(range.end, "2023-12-31");
    }

    #[test]
    fn test_resolve_range_year_only() {
        let range = resolve_date_range_from(&filters_with(Some("2022"), None), today());
        assert_eq!(range.start, "2022-01-01");
        assert_eq!(range.end, "2022-12-31");
    }

    #[test]
    fn test_resolve_range_defaults_to_current_month() {
        let range = resolve_date_range_from(&DashboardFilters::default(), today());
        assert_eq!(range.start, "2025-06-01");
        assert_eq!(range.end, "2025-06-30");
    }

    #[test]
    fn test_resolve_range_invalid_month_falls_back_to_year() {
        let range = resolve_date_range_from(&filters_with(Some("2024"), Some("13")), today());
        assert_eq!(
            range.start, "2024-01-01",
            "an impossible month should degrade to the year rule"
        );
        assert_eq!(range.end, "2024-12-31");
    }

    #[test]
    fn test_resolve_range_non_numeric_year_falls_back_to_current_month() {
        let range = resolve_date_range_from(&filters_with(Some("abcd"), None), today());
        assert_eq!(range.start, "2025-06-01");
        assert_eq!(range.end, "2025-06-30");
    }

    // --- Filters ---

    #[test]
    fn test_filters_accept_spanish_aliases() {
        let mut params = HashMap::new();
        params.insert("mes".to_string(), "7".to_string());
        params.insert("año".to_string(), "2024".to_string());
        let filters = DashboardFilters::from_query(&params);
        assert_eq!(filters.ref_month(), Some(7));
        assert_eq!(filters.ref_year(), Some(2024));
    }

    #[test]
    fn test_filters_treat_blank_values_as_absent() {
        let mut params = HashMap::new();
        params.insert("desde".to_string(), "  ".to_string());
        params.insert("dni".to_string(), String::new());
        let filters = DashboardFilters::from_query(&params);
        assert!(filters.desde.is_none(), "blank desde must not open a range");
        assert!(filters.dni.is_none());
    }

    // --- Shared helpers ---

    #[test]
    fn test_sum_hours_treats_missing_as_zero() {
        let entry = create_test_entry("2024-02-01", Some(8.0), None, None, None);
        assert_eq!(sum_hours(&entry), 8.0);

        let entry = create_test_entry("2024-02-01", None, None, None, None);
        assert_eq!(sum_hours(&entry), 0.0);

        let entry = create_test_entry("2024-02-01", Some(7.5), Some(1.5), None, None);
        assert_eq!(sum_hours(&entry), 9.0);
    }

    #[test]
    fn test_month_key_formats_year_month() {
        assert_eq!(month_key("2024-02-29"), "2024-02");
        assert_eq!(month_key("2023-12-01"), "2023-12");
        assert_eq!(
            month_key("not-a-date"),
            "not-a-date",
            "unparseable dates keep their raw key"
        );
    }

    #[test]
    fn test_dimension_label_fallback_chain() {
        let named = RefData {
            id: None,
            code: Some("CR01".to_string()),
            name: Some("Obras".to_string()),
        };
        assert_eq!(dimension_label(Some(&named), UNASSIGNED_CR), "Obras");

        let code_only = RefData {
            id: None,
            code: Some("CR01".to_string()),
            name: Some(String::new()),
        };
        assert_eq!(
            dimension_label(Some(&code_only), UNASSIGNED_CR),
            "CR01",
            "an empty name must fall back to the code"
        );

        assert_eq!(dimension_label(None, UNASSIGNED_CR), "Sin CR");
    }

    #[test]
    fn test_ref_source_tags() {
        let by_id = RefData {
            id: Some("x".to_string()),
            code: None,
            name: None,
        };
        assert_eq!(by_id.source(), RefSource::ById);

        let by_code = RefData {
            id: None,
            code: Some("SST1".to_string()),
            name: None,
        };
        assert_eq!(by_code.source(), RefSource::ByCode);

        assert_eq!(RefData::default().source(), RefSource::Unresolved);
    }

    // --- Aggregators ---

    #[test]
    fn test_aggregate_by_cr_groups_by_label_and_month() {
        let entries = vec![
            create_test_entry("2024-01-10", Some(8.0), Some(1.0), Some(("CR01", "Obras")), None),
            create_test_entry("2024-01-20", Some(4.0), None, Some(("CR01", "Obras")), None),
            create_test_entry("2024-02-05", Some(6.0), None, Some(("CR01", "Obras")), None),
            create_test_entry("2024-01-15", Some(5.0), None, None, None),
        ];
        let aggregated = aggregate_by_cr(&entries);

        assert_eq!(aggregated.monthly.len(), 3);
        let obras_jan = aggregated
            .monthly
            .iter()
            .find(|b| b.cr == "Obras" && b.month == "2024-01")
            .expect("Obras/2024-01 bucket must exist");
        assert_eq!(obras_jan.hours, 13.0);

        let months: Vec<&str> = aggregated.monthly.iter().map(|b| b.month.as_str()).collect();
        let mut sorted = months.clone();
        sorted.sort();
        assert_eq!(months, sorted, "monthly buckets must be sorted by month");

        assert_eq!(aggregated.totals.len(), 2);
        assert_eq!(aggregated.totals[0].cr, "Obras");
        assert_eq!(aggregated.totals[0].hours, 19.0);
        assert_eq!(aggregated.totals[1].cr, "Sin CR");
        assert_eq!(aggregated.totals[1].hours, 5.0);
    }

    #[test]
    fn test_aggregate_totals_truncate_to_top_ten() {
        let entries: Vec<EnrichedEntry> = (0..12)
            .map(|i| {
                let code = format!("SST{:02}", i);
                create_test_entry(
                    "2024-03-01",
                    Some(1.0 + i as f64),
                    None,
                    None,
                    Some((code.as_str(), "")),
                )
            })
            .collect();
        let aggregated = aggregate_by_sst(&entries);

        assert_eq!(aggregated.totals.len(), 10, "totals must cap at ten labels");
        for pair in aggregated.totals.windows(2) {
            assert!(
                pair[0].hours >= pair[1].hours,
                "totals must be non-increasing by hours"
            );
        }
        assert_eq!(aggregated.totals[0].sst, "SST11");
    }

    #[test]
    fn test_aggregate_by_day_conserves_hours_and_dates() {
        let entries = vec![
            create_test_entry("2024-02-02", Some(8.0), Some(2.0), None, None),
            create_test_entry("2024-02-01", Some(7.0), None, None, None),
            create_test_entry("2024-02-02", Some(3.0), None, None, None),
        ];
        let items = aggregate_by_day(&entries);

        assert_eq!(items.len(), 2, "each date appears exactly once");
        assert_eq!(items[0].date, "2024-02-01");
        assert_eq!(items[1].date, "2024-02-02");
        assert_eq!(items[1].hours, 13.0);

        let bucketed: f64 = items.iter().map(|i| i.hours).sum();
        let raw: f64 = entries.iter().map(sum_hours).sum();
        assert_eq!(bucketed, raw, "bucketed hours must equal the raw total");
    }

    #[test]
    fn test_summary_counts_reference_month_and_year() {
        let entries = vec![
            create_test_entry("2024-02-10", Some(8.0), None, Some(("CR01", "Obras")), None),
            create_test_entry("2024-02-11", Some(2.0), Some(1.0), Some(("CR02", "")), None),
            create_test_entry("2024-05-01", Some(4.0), None, None, None),
            create_test_entry("2023-02-10", Some(9.0), None, None, None),
        ];
        let summary = summarize(&entries, 2024, 2);

        assert_eq!(summary.month_hours, 11.0, "only Feb 2024 counts as month");
        assert_eq!(summary.year_hours, 15.0, "only 2024 counts as year");
        assert_eq!(summary.top_cr.len(), 3);
        assert_eq!(summary.top_cr[0].cr, "Sin CR");
        assert_eq!(summary.top_cr[0].hours, 13.0);
    }

    #[test]
    fn test_summary_tops_truncate_to_five() {
        let entries: Vec<EnrichedEntry> = (0..7)
            .map(|i| {
                let code = format!("CR{:02}", i);
                create_test_entry(
                    "2024-03-01",
                    Some(10.0 - i as f64),
                    None,
                    Some((code.as_str(), "")),
                    None,
                )
            })
            .collect();
        let summary = summarize(&entries, 2024, 3);

        assert_eq!(summary.top_cr.len(), 5);
        for pair in summary.top_cr.windows(2) {
            assert!(pair[0].hours >= pair[1].hours);
        }
        assert_eq!(summary.top_cr[0].cr, "CR00");
    }

    #[test]
    fn test_summary_skips_unparseable_dates_for_reference_totals() {
        let entries = vec![
            create_test_entry("garbage", Some(8.0), None, Some(("CR01", "")), None),
            create_test_entry("2024-02-01", Some(1.0), None, None, None),
        ];
        let summary = summarize(&entries, 2024, 2);

        assert_eq!(summary.month_hours, 1.0);
        assert_eq!(summary.year_hours, 1.0);
        // The label totals still see every entry.
        assert_eq!(summary.top_cr.iter().map(|t| t.hours).sum::<f64>(), 9.0);
    }
}
