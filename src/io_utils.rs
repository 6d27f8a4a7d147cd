//! I/O utilities for reading uploaded CSV content.
//!
//! Uploads arrive as fully buffered bytes. This module provides:
//!
//! - **Encoding**: input decoding via `encoding_rs`, defaulting to UTF-8, with
//!   any byte-order mark stripped.
//! - **Reader construction**: `open_csv_reader` configures the comma-delimited,
//!   header-row dialect every upload is read with.
//! - **File loading**: `read_upload` turns a path into an [`UploadedFile`].

use std::{fs, io::Read, path::Path};

use anyhow::{Context, Result, anyhow};
use encoding_rs::{Encoding, UTF_8};

use crate::upload::UploadedFile;

pub const DEFAULT_CSV_DELIMITER: u8 = b',';

pub fn resolve_encoding(label: Option<&str>) -> Result<&'static Encoding> {
    if let Some(value) = label {
        Encoding::for_label(value.trim().as_bytes())
            .ok_or_else(|| anyhow!("Unknown encoding '{value}'"))
    } else {
        Ok(UTF_8)
    }
}

pub fn open_csv_reader<R>(reader: R) -> csv::Reader<R>
where
    R: Read,
{
    let mut builder = csv::ReaderBuilder::new();
    builder
        .has_headers(true)
        .delimiter(DEFAULT_CSV_DELIMITER)
        .double_quote(true)
        .flexible(true);
    builder.from_reader(reader)
}

pub fn decode_bytes(bytes: &[u8], encoding: &'static Encoding) -> Result<String> {
    let (text, _, had_errors) = encoding.decode(bytes);
    if had_errors {
        Err(anyhow!(
            "Failed to decode text with encoding {}",
            encoding.name()
        ))
    } else {
        Ok(text.into_owned())
    }
}

/// Loads a file from disk as an upload. `filename` overrides the name taken from the path.
pub fn read_upload(path: &Path, filename: Option<&str>) -> Result<UploadedFile> {
    let bytes = fs::read(path).with_context(|| format!("Opening input file {path:?}"))?;
    let filename = match filename {
        Some(name) => name.to_string(),
        None => path
            .file_name()
            .and_then(|name| name.to_str())
            .map(|name| name.to_string())
            .unwrap_or_default(),
    };
    Ok(UploadedFile::new(filename, bytes))
}
