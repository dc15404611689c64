//! Symbol universe: the ordered list of tickers a scan sweeps.
//!
//! Universes come from an explicit list, a CSV file (first column, with an
//! optional header row) or a TOML file of sectors and their tickers.
//! Duplicates are dropped; first occurrence wins the position.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum UniverseError {
    #[error("read universe file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("parse universe CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("parse universe TOML: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("universe is empty")]
    Empty,
}

/// Sector-organised universe file.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SectorFile {
    sectors: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Universe {
    symbols: Vec<String>,
}

impl Universe {
    pub fn from_list<I, S>(symbols: I) -> Result<Self, UniverseError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen = HashSet::new();
        let symbols: Vec<String> = symbols
            .into_iter()
            .map(|s| s.as_ref().trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .filter(|s| seen.insert(s.clone()))
            .collect();
        if symbols.is_empty() {
            return Err(UniverseError::Empty);
        }
        Ok(Self { symbols })
    }

    /// Load from `.csv` or `.toml`, by extension (CSV otherwise).
    pub fn from_file(path: &Path) -> Result<Self, UniverseError> {
        let content = std::fs::read_to_string(path).map_err(|source| UniverseError::Io {
            path: path.display().to_string(),
            source,
        })?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => Self::from_toml(&content),
            _ => Self::from_csv(&content),
        }
    }

    /// First column of each record. A first row whose cell reads like a
    /// column name ("Symbol", "ticker") is treated as a header.
    pub fn from_csv(content: &str) -> Result<Self, UniverseError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(content.as_bytes());

        let mut symbols = Vec::new();
        for (i, record) in reader.records().enumerate() {
            let record = record?;
            let Some(first) = record.get(0) else { continue };
            if i == 0 && is_header_cell(first) {
                continue;
            }
            symbols.push(first.to_string());
        }
        Self::from_list(symbols)
    }

    pub fn from_toml(content: &str) -> Result<Self, UniverseError> {
        let file: SectorFile = toml::from_str(content)?;
        Self::from_list(file.sectors.into_values().flatten())
    }

    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.symbols.iter().any(|s| s == symbol)
    }
}

fn is_header_cell(cell: &str) -> bool {
    let lower = cell.trim().to_ascii_lowercase();
    matches!(lower.as_str(), "symbol" | "symbols" | "ticker" | "tickers")
        || cell.chars().any(|c| c.is_ascii_lowercase() || c == ' ')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_dedupes_and_normalises() {
        let u = Universe::from_list(["aapl", "MSFT", " AAPL ", ""]).unwrap();
        assert_eq!(u.symbols(), &["AAPL".to_string(), "MSFT".to_string()]);
    }

    #[test]
    fn empty_list_is_an_error() {
        assert!(matches!(
            Universe::from_list(Vec::<String>::new()),
            Err(UniverseError::Empty)
        ));
    }

    #[test]
    fn csv_with_header() {
        let u = Universe::from_csv("Symbol,Name\nKO,Coca-Cola\nPEP,PepsiCo\n").unwrap();
        assert_eq!(u.len(), 2);
        assert!(u.contains("KO"));
    }

    #[test]
    fn csv_without_header() {
        let u = Universe::from_csv("KO\nPEP\nBRK.B\n").unwrap();
        assert_eq!(u.symbols()[2], "BRK.B");
    }

    #[test]
    fn toml_sectors_flatten() {
        let toml = r#"
            [sectors]
            Energy = ["XOM", "CVX"]
            Tech = ["AAPL", "XOM"]
        "#;
        let u = Universe::from_toml(toml).unwrap();
        assert_eq!(u.len(), 3);
    }

    #[test]
    fn from_file_dispatches_on_extension() {
        let dir = tempfile::tempdir().unwrap();
        let csv_path = dir.path().join("uni.csv");
        std::fs::write(&csv_path, "ticker\nSPY\nQQQ\n").unwrap();
        assert_eq!(Universe::from_file(&csv_path).unwrap().len(), 2);

        let toml_path = dir.path().join("uni.toml");
        std::fs::write(&toml_path, "[sectors]\nETFs = [\"SPY\"]\n").unwrap();
        assert_eq!(Universe::from_file(&toml_path).unwrap().len(), 1);

        let missing = dir.path().join("nope.csv");
        assert!(matches!(
            Universe::from_file(&missing),
            Err(UniverseError::Io { .. })
        ));
    }
}
