use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::errors::JobsiftError;
use crate::models::{FilteredResult, IsFit, RemoteMode};
use crate::store::write_atomic;

pub const COLUMNS: [&str; 10] = [
    "addDate",
    "employerName",
    "positionTitle",
    "location",
    "salary",
    "remote",
    "skills",
    "descriptionURL",
    "isFit",
    "reason",
];

const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One line of the final table. Field order is the column order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportRow {
    #[serde(rename = "addDate", serialize_with = "serialize_date")]
    pub add_date: NaiveDateTime,
    #[serde(rename = "employerName")]
    pub employer_name: Option<String>,
    #[serde(rename = "positionTitle")]
    pub position_title: Option<String>,
    pub location: Option<String>,
    pub salary: Option<String>,
    pub remote: Option<RemoteMode>,
    pub skills: Option<String>,
    #[serde(rename = "descriptionURL")]
    pub description_url: String,
    #[serde(rename = "isFit")]
    pub is_fit: IsFit,
    pub reason: Option<String>,
}

fn serialize_date<S: serde::Serializer>(date: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(&date.format(DATE_FORMAT))
}

impl From<FilteredResult> for ReportRow {
    fn from(result: FilteredResult) -> Self {
        let listing = result.listing.unwrap_or_default();
        let position_title = Some(listing.position_title).filter(|t| !t.is_empty());
        Self {
            add_date: result.add_date,
            employer_name: listing.employer_name,
            position_title,
            location: listing.location,
            salary: listing.salary,
            remote: listing.remote,
            skills: result
                .skills
                .map(|skills| serde_json::to_string(&skills).unwrap_or_default()),
            description_url: result.description_url,
            is_fit: result.decision.is_fit(),
            reason: result.decision.reason(),
        }
    }
}

/// Merges the record streams into one table ordered by `addDate`.
/// Rows with equal timestamps keep their stream order.
pub fn assemble(
    deep_filtered: Vec<FilteredResult>,
    seen: Vec<FilteredResult>,
    skipped: Vec<FilteredResult>,
) -> Vec<ReportRow> {
    let mut rows: Vec<ReportRow> = deep_filtered
        .into_iter()
        .chain(seen)
        .chain(skipped)
        .map(ReportRow::from)
        .collect();
    rows.sort_by_key(|row| row.add_date);
    rows
}

pub fn render_csv(rows: &[ReportRow]) -> Result<Vec<u8>> {
    // Header is written explicitly so an empty report still carries the columns.
    let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(Vec::new());
    writer
        .write_record(COLUMNS)
        .map_err(|e| JobsiftError::Report(format!("Failed to write header: {}", e)))?;
    for row in rows {
        writer
            .serialize(row)
            .map_err(|e| JobsiftError::Report(format!("Failed to write row for {}: {}", row.description_url, e)))?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| JobsiftError::Report(format!("Failed to flush report: {}", e)))?;
    Ok(bytes)
}

pub fn report_file_name(timestamp: NaiveDateTime) -> String {
    format!("{}_result.csv", timestamp.format("%Y%m%d_%H%M"))
}

/// Renders the whole report in memory, then swaps it into place.
pub fn write_report(dir: &Path, file_name: &str, csv_bytes: &[u8]) -> Result<PathBuf> {
    fs::create_dir_all(dir).with_context(|| format!("Failed to create results directory {}", dir.display()))?;
    let path = dir.join(file_name);
    write_atomic(&path, csv_bytes)?;
    Ok(path)
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct Summary {
    pub total: usize,
    pub fit: usize,
    pub by_reason: BTreeMap<String, usize>,
}

pub fn summarize(rows: &[ReportRow]) -> Summary {
    let mut summary = Summary {
        total: rows.len(),
        ..Default::default()
    };
    for row in rows {
        if row.is_fit == IsFit::Yes {
            summary.fit += 1;
        }
        if let Some(reason) = &row.reason {
            let code = reason.split(" - ").next().unwrap_or(reason).to_string();
            *summary.by_reason.entry(code).or_default() += 1;
        }
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Decision, ListingFields, RejectCode, RejectReason, SkipReason};
    use chrono::{Duration, NaiveDate};

    fn at(second: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 10, 16).unwrap().and_hms_opt(9, 30, second).unwrap()
    }

    fn deep_filtered(id: &str, date: NaiveDateTime, decision: Decision) -> FilteredResult {
        FilteredResult {
            job_id: id.to_string(),
            description_url: crate::models::description_url(id),
            add_date: date,
            listing: Some(ListingFields {
                position_title: "Data Analyst".to_string(),
                employer_name: Some("Acme, Inc.".to_string()),
                location: Some("Boston, MA".to_string()),
                salary: None,
                remote: Some(RemoteMode::Hybrid),
            }),
            skills: Some(vec!["SQL".to_string(), "Python".to_string()]),
            decision,
        }
    }

    #[test]
    fn test_assemble_sorts_by_date() {
        let rows = assemble(
            vec![deep_filtered("3", at(20), Decision::Fit)],
            vec![FilteredResult::seen("1", at(5))],
            vec![deep_filtered("2", at(10), Decision::Skip(SkipReason::PreScreenFilteredOut))],
        );
        let urls: Vec<_> = rows.iter().map(|r| r.description_url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "https://www.linkedin.com/jobs/view/1/",
                "https://www.linkedin.com/jobs/view/2/",
                "https://www.linkedin.com/jobs/view/3/",
            ]
        );
    }

    #[test]
    fn test_assemble_keeps_stream_order_on_ties() {
        let rows = assemble(
            vec![deep_filtered("a", at(1), Decision::Fit)],
            vec![FilteredResult::seen("b", at(1))],
            vec![],
        );
        assert_eq!(rows[0].description_url, "https://www.linkedin.com/jobs/view/a/");
        assert_eq!(rows[1].description_url, "https://www.linkedin.com/jobs/view/b/");
    }

    #[test]
    fn test_csv_columns_for_every_bucket() {
        let rows = assemble(
            vec![deep_filtered(
                "3",
                at(2),
                Decision::Reject(RejectReason::with_detail(RejectCode::YearExceedMin, "5+ years")),
            )],
            vec![FilteredResult::seen("1", at(0))],
            vec![],
        );
        let csv = String::from_utf8(render_csv(&rows).unwrap()).unwrap();
        let lines: Vec<_> = csv.lines().collect();

        assert_eq!(
            lines[0],
            "addDate,employerName,positionTitle,location,salary,remote,skills,descriptionURL,isFit,reason"
        );
        assert_eq!(lines[1], "2026-10-16 09:30:00,,,,,,,https://www.linkedin.com/jobs/view/1/,skip,SEEN_JOB");
        assert_eq!(
            lines[2],
            "2026-10-16 09:30:02,\"Acme, Inc.\",Data Analyst,\"Boston, MA\",,Hybrid,\"[\"\"SQL\"\",\"\"Python\"\"]\",https://www.linkedin.com/jobs/view/3/,no,YEAR_EXCEED_MIN - 5+ years"
        );

        let mut reader = csv::Reader::from_reader(csv.as_bytes());
        for record in reader.records() {
            assert_eq!(record.unwrap().len(), COLUMNS.len());
        }
    }

    #[test]
    fn test_empty_report_still_has_header() {
        let csv = String::from_utf8(render_csv(&[]).unwrap()).unwrap();
        assert_eq!(csv.trim_end(), COLUMNS.join(","));
    }

    #[test]
    fn test_report_file_name_and_write() {
        let dir = tempfile::tempdir().unwrap();
        let name = report_file_name(at(0) + Duration::hours(5));
        assert_eq!(name, "20261016_1430_result.csv");

        let out_dir = dir.path().join("results");
        let path = write_report(&out_dir, &name, b"addDate\n").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "addDate\n");
        assert_eq!(fs::read_dir(&out_dir).unwrap().count(), 1);
    }

    #[test]
    fn test_summarize_counts_codes() {
        let rows = assemble(
            vec![
                deep_filtered("1", at(0), Decision::Fit),
                deep_filtered("2", at(1), Decision::Reject(RejectReason::with_detail(RejectCode::PreferenceViolate, "Dallas"))),
                deep_filtered("3", at(2), Decision::Reject(RejectReason::with_detail(RejectCode::PreferenceViolate, "travel"))),
            ],
            vec![FilteredResult::seen("4", at(3))],
            vec![],
        );
        let summary = summarize(&rows);
        assert_eq!(summary.total, 4);
        assert_eq!(summary.fit, 1);
        assert_eq!(summary.by_reason.get("PREFERENCE_VIOLATE"), Some(&2));
        assert_eq!(summary.by_reason.get("SEEN_JOB"), Some(&1));
    }
}
