//! CSV ingestion into string-typed frames.
//!
//! Raw clinical extracts are read string-first: every cell is trimmed, BOM
//! markers stripped, and blanks become nulls. Type interpretation happens in
//! the mapping engine, never at read time.

use std::path::Path;

use anyhow::{Context, Result};
use csv::ReaderBuilder;
use polars::prelude::{Column, DataFrame, NamedFrom, Series};

use clinmap_core::frame::RawTable;

fn normalize_header(raw: &str) -> String {
    let trimmed = raw.trim().trim_matches('\u{feff}');
    trimmed.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn normalize_cell(raw: &str) -> Option<String> {
    let trimmed = raw.trim().trim_matches('\u{feff}');
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Read one CSV file as a named raw table.
pub fn read_raw_table(path: &Path, name: &str) -> Result<RawTable> {
    let mut reader = ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("failed to open {}", path.display()))?;

    let headers: Vec<String> = reader
        .headers()
        .with_context(|| format!("failed to read headers from {}", path.display()))?
        .iter()
        .map(normalize_header)
        .collect();

    let mut columns: Vec<Vec<Option<String>>> = vec![Vec::new(); headers.len()];
    for record in reader.records() {
        let record =
            record.with_context(|| format!("failed to read record from {}", path.display()))?;
        for (idx, column) in columns.iter_mut().enumerate() {
            column.push(record.get(idx).and_then(normalize_cell));
        }
    }

    let cols: Vec<Column> = headers
        .into_iter()
        .zip(columns)
        .map(|(header, values)| Series::new(header.into(), values).into())
        .collect();
    let data = DataFrame::new(cols)
        .with_context(|| format!("failed to build frame from {}", path.display()))?;
    Ok(RawTable::new(name, data))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headers_are_trimmed_and_blanks_become_null() {
        let dir = std::env::temp_dir().join(format!("clinmap-ingest-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("demog.csv");
        std::fs::write(&path, " SUBJ ,SEX\n001, F \n002,\n").unwrap();

        let table = read_raw_table(&path, "demog").unwrap();
        assert_eq!(table.name, "demog");
        assert_eq!(table.data.height(), 2);
        let names: Vec<String> = table
            .data
            .get_column_names()
            .iter()
            .map(|n| n.to_string())
            .collect();
        assert_eq!(names, vec!["SUBJ", "SEX"]);
        let sex = clinmap_common::opt_string_column(&table.data, "SEX").unwrap();
        assert_eq!(sex, vec![Some("F".to_string()), None]);

        std::fs::remove_dir_all(&dir).ok();
    }
}
