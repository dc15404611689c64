//! Scan CSV export and re-import.
//!
//! A saved scan is `<scan_dir>/<scan_name>.csv`: a header of `description`
//! plus the analyzer's columns, then every result row in key order.

use crate::aggregate::ScanReport;
use chrono::{DateTime, Local};
use optscan_core::analysis::ResultRow;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("{path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("{path}: row {row} column {column} is not a number: {value:?}")]
    BadValue {
        path: String,
        row: usize,
        column: String,
        value: String,
    },

    #[error("{path}: scan file has no header")]
    MissingHeader { path: String },
}

/// `<kind>_<analyzer>_<YYYY-MM-DD>_<HHMMSS>`
pub fn scan_name(kind: &str, analyzer: &str, started: DateTime<Local>) -> String {
    format!("{kind}_{analyzer}_{}", started.format("%Y-%m-%d_%H%M%S"))
}

// ─── CSV export ─────────────────────────────────────────────────────

pub fn export_rows_csv<'a>(
    header: &[String],
    rows: impl IntoIterator<Item = &'a ResultRow>,
) -> Result<String, ExportError> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(header)?;
    for row in rows {
        let mut record = Vec::with_capacity(row.values.len() + 1);
        record.push(row.label.clone());
        record.extend(row.values.iter().map(|v| v.to_string()));
        wtr.write_record(&record)?;
    }
    let bytes = wtr.into_inner().map_err(|e| ExportError::Io {
        path: "<memory>".into(),
        source: e.into_error(),
    })?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Write the report to `<dir>/<scan_name>.csv` and return the path.
pub fn save_scan(dir: &Path, report: &ScanReport) -> Result<PathBuf, ExportError> {
    let io_err = |path: &Path, source| ExportError::Io {
        path: path.display().to_string(),
        source,
    };
    fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
    let path = dir.join(format!("{}.csv", report.scan_name));
    let csv = export_rows_csv(&report.header, report.rows())?;
    fs::write(&path, csv).map_err(|e| io_err(&path, e))?;
    Ok(path)
}

// ─── CSV import ─────────────────────────────────────────────────────

/// A scan read back from disk.
#[derive(Debug, Clone, PartialEq)]
pub struct SavedScan {
    pub path: PathBuf,
    pub header: Vec<String>,
    pub rows: Vec<ResultRow>,
}

impl SavedScan {
    pub fn columns(&self) -> &[String] {
        self.header.get(1..).unwrap_or(&[])
    }
}

pub fn load_scan(path: &Path) -> Result<SavedScan, ExportError> {
    let shown = path.display().to_string();
    let content = fs::read_to_string(path).map_err(|source| ExportError::Io {
        path: shown.clone(),
        source,
    })?;
    let mut rdr = csv::Reader::from_reader(content.as_bytes());
    let header: Vec<String> = rdr.headers()?.iter().map(str::to_string).collect();
    if header.is_empty() {
        return Err(ExportError::MissingHeader { path: shown });
    }

    let mut rows = Vec::new();
    for (i, record) in rdr.records().enumerate() {
        let record = record?;
        let label = record.get(0).unwrap_or_default().to_string();
        let mut values = Vec::with_capacity(record.len().saturating_sub(1));
        for (j, cell) in record.iter().enumerate().skip(1) {
            let value = cell.trim().parse::<f64>().map_err(|_| ExportError::BadValue {
                path: shown.clone(),
                row: i + 1,
                column: header.get(j).cloned().unwrap_or_default(),
                value: cell.to_string(),
            })?;
            values.push(value);
        }
        rows.push(ResultRow::new(label, values));
    }

    Ok(SavedScan {
        path: path.to_path_buf(),
        header,
        rows,
    })
}

/// Most recent saved scan whose name starts with `prefix`. Scan names
/// embed a sortable timestamp, so the lexically greatest name wins.
pub fn latest_scan(dir: &Path, prefix: &str) -> Option<PathBuf> {
    fs::read_dir(dir)
        .ok()?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.extension().and_then(|e| e.to_str()) == Some("csv")
                && p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with(prefix))
        })
        .max()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::ResultKey;
    use chrono::{NaiveDate, TimeZone};
    use std::collections::BTreeMap;

    fn report() -> ScanReport {
        let exp = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
        let mut results = BTreeMap::new();
        results.insert(
            ResultKey::option("BBB", exp),
            vec![ResultRow::new("BBB 2024-03-15 +40/-45", vec![5.0, 0.62])],
        );
        results.insert(
            ResultKey::option("AAA", exp),
            vec![
                ResultRow::new("AAA 2024-03-15 +90/-95", vec![5.0, 1.1]),
                ResultRow::new("AAA 2024-03-15 +85/-95", vec![10.0, 1.4]),
            ],
        );
        ScanReport {
            scan_name: "option_cps_2024-02-09_093000".into(),
            header: vec!["description".into(), "width".into(), "premium".into()],
            results,
            fetch_failure_count: 0,
            analysis_failure_count: 0,
            skipped_count: 0,
            cancelled: false,
            elapsed_secs: 1.0,
        }
    }

    #[test]
    fn scan_name_format() {
        let started = Local.with_ymd_and_hms(2024, 2, 9, 9, 30, 0).unwrap();
        assert_eq!(scan_name("option", "cps", started), "option_cps_2024-02-09_093000");
    }

    #[test]
    fn csv_has_header_and_rows_in_key_order() {
        let r = report();
        let csv = export_rows_csv(&r.header, r.rows()).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "description,width,premium");
        assert_eq!(lines[1], "AAA 2024-03-15 +90/-95,5,1.1");
        assert_eq!(lines[3], "BBB 2024-03-15 +40/-45,5,0.62");
        assert_eq!(lines.len(), 4);
    }

    #[test]
    fn save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let scan_dir = dir.path().join("scan");
        let r = report();
        let path = save_scan(&scan_dir, &r).unwrap();
        assert_eq!(path.file_name().unwrap(), "option_cps_2024-02-09_093000.csv");

        let saved = load_scan(&path).unwrap();
        assert_eq!(saved.header, r.header);
        assert_eq!(saved.columns(), &["width".to_string(), "premium".to_string()]);
        assert_eq!(saved.rows, r.rows().cloned().collect::<Vec<_>>());
    }

    #[test]
    fn load_rejects_non_numeric_cells() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.csv");
        fs::write(&path, "description,roc\nAAA,n/a\n").unwrap();
        assert!(matches!(
            load_scan(&path),
            Err(ExportError::BadValue { row: 1, .. })
        ));
    }

    #[test]
    fn latest_scan_picks_newest_matching() {
        let dir = tempfile::tempdir().unwrap();
        for name in [
            "option_wheel_2024-02-08_160000.csv",
            "option_wheel_2024-02-09_093000.csv",
            "option_cps_2024-02-10_093000.csv",
            "option_wheel_2024-02-11_093000.log",
        ] {
            fs::write(dir.path().join(name), "description\n").unwrap();
        }
        let latest = latest_scan(dir.path(), "option_wheel_").unwrap();
        assert!(latest.ends_with("option_wheel_2024-02-09_093000.csv"));
        assert!(latest_scan(dir.path(), "equity_").is_none());
    }
}
