//! Upload boundary: filename validation and buffered CSV parsing into a [`RawTable`].

use std::collections::HashSet;

use encoding_rs::Encoding;
use log::debug;

use crate::{
    data::{Cell, Value},
    error::ImportError,
    io_utils,
};

#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    pub fn new(filename: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            filename: filename.into(),
            bytes: bytes.into(),
        }
    }
}

/// Header row plus every data row, each cell parsed once into a [`Value`].
#[derive(Debug, Clone, PartialEq)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub records: Vec<Vec<Cell>>,
}

impl RawTable {
    pub fn row_count(&self) -> usize {
        self.records.len()
    }

    pub fn column_count(&self) -> usize {
        self.headers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Values of one source column, in row order.
    pub fn column(&self, idx: usize) -> impl Iterator<Item = &Value> + '_ {
        self.records
            .iter()
            .filter_map(move |record| record.get(idx).map(|cell| &cell.value))
    }

    /// Header names made unique for use as keys in audit blobs: repeats become `name.1`, `name.2`, ...
    pub fn audit_keys(&self) -> Vec<String> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut keys = Vec::with_capacity(self.headers.len());
        for header in &self.headers {
            let mut candidate = header.clone();
            let mut suffix = 1usize;
            while seen.contains(&candidate) {
                candidate = format!("{header}.{suffix}");
                suffix += 1;
            }
            seen.insert(candidate.clone());
            keys.push(candidate);
        }
        keys
    }
}

pub fn validate_upload(file: &UploadedFile) -> Result<(), ImportError> {
    if file.filename.trim().is_empty() {
        return Err(ImportError::InputRejected("No selected file".to_string()));
    }
    if !file.filename.to_ascii_lowercase().ends_with(".csv") {
        return Err(ImportError::InputRejected(
            "Uploaded file is not a CSV".to_string(),
        ));
    }
    Ok(())
}

/// Parses buffered upload content. A header row with no data rows parses successfully; callers decide
/// whether an empty table is acceptable.
pub fn parse_csv(bytes: &[u8], encoding: &'static Encoding) -> Result<RawTable, ImportError> {
    let text = io_utils::decode_bytes(bytes, encoding).map_err(unreadable)?;
    let mut reader = io_utils::open_csv_reader(text.as_bytes());
    let headers = reader
        .headers()
        .map_err(unreadable)?
        .iter()
        .map(|h| h.to_string())
        .collect::<Vec<_>>();
    if headers.is_empty() || (headers.len() == 1 && headers[0].is_empty()) {
        return Err(ImportError::InputRejected(
            "Unable to read CSV: No columns to parse from file".to_string(),
        ));
    }

    let mut records = Vec::new();
    for (idx, result) in reader.records().enumerate() {
        let record = result.map_err(unreadable)?;
        if record.len() > headers.len() {
            return Err(ImportError::InputRejected(format!(
                "Unable to read CSV: Expected {} fields in line {}, saw {}",
                headers.len(),
                idx + 2,
                record.len()
            )));
        }
        let mut cells = record.iter().map(Cell::parse).collect::<Vec<_>>();
        cells.resize_with(headers.len(), Cell::null);
        records.push(cells);
    }
    debug!(
        "Parsed {} row(s) across {} column(s)",
        records.len(),
        headers.len()
    );
    Ok(RawTable { headers, records })
}

fn unreadable(err: impl std::fmt::Display) -> ImportError {
    ImportError::InputRejected(format!("Unable to read CSV: {err}"))
}
