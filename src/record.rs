//! Decoding of the scanner's CSV artifact into [`FileDescription`]s.
//!
//! Columns are matched by header name, so their order does not matter and
//! extra columns are ignored. Records are split as raw bytes and each cell is
//! decoded and validated on its own; a bad row (including one with stray
//! fields or invalid UTF-8) is reported and skipped without affecting its
//! neighbours.

use std::{path::Path, str};

use chrono::NaiveDateTime;
use csv::{ByteRecord, ReaderBuilder};
use serde::{Deserialize, Serialize};

use crate::{
   Result,
   error::Error,
   types::{FileDescription, TIMESTAMP_FORMAT, normalize_keywords},
};

pub const DIRECTORY_PATH: &str = "DIRECTORY_PATH";
pub const FILE_NAME: &str = "FILE_NAME";
pub const EXTENSION: &str = "EXTENSION";
pub const CREATED_DATE: &str = "CREATED_DATE";
pub const MODIFIED_DATE: &str = "MODIFIED_DATE";
pub const SIZE_BYTES: &str = "SIZE_BYTES";
pub const SHA256_HASH: &str = "SHA256_HASH";
pub const KEYWORDS: &str = "KEYWORDS";

/// Columns every artifact header must name.
pub const REQUIRED_COLUMNS: [&str; 7] =
   [DIRECTORY_PATH, FILE_NAME, EXTENSION, CREATED_DATE, MODIFIED_DATE, SIZE_BYTES, SHA256_HASH];

pub const KEYWORD_SEPARATOR: char = ';';

/// A row that could not be turned into a [`FileDescription`].
///
/// Row 0 is the header; data rows count from 1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("row {row}: {field}: {reason}")]
pub struct RowError {
   pub row:    usize,
   pub field:  String,
   pub reason: String,
}

impl RowError {
   fn new(row: usize, field: &str, reason: impl Into<String>) -> Self {
      Self { row, field: field.to_string(), reason: reason.into() }
   }

   fn missing(row: usize, field: &str) -> Self {
      Self::new(row, field, "missing")
   }
}

/// Cells of one artifact row, `None` where the cell is absent or empty.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawRow<'a> {
   pub directory_path: Option<&'a str>,
   pub file_name:      Option<&'a str>,
   pub extension:      Option<&'a str>,
   pub created_date:   Option<&'a str>,
   pub modified_date:  Option<&'a str>,
   pub size_bytes:     Option<&'a str>,
   pub sha256_hash:    Option<&'a str>,
   pub keywords:       Option<&'a str>,
}

/// Valid records of an artifact plus the rows that were rejected.
#[derive(Debug, Default)]
pub struct ParsedArtifact {
   pub rows:    usize,
   pub records: Vec<FileDescription>,
   pub errors:  Vec<RowError>,
}

/// Builds a [`FileDescription`] from one row.
pub fn parse_row(row: usize, raw: &RawRow<'_>) -> Result<FileDescription, RowError> {
   let path = raw
      .directory_path
      .ok_or_else(|| RowError::missing(row, DIRECTORY_PATH))?;
   let name = raw
      .file_name
      .ok_or_else(|| RowError::missing(row, FILE_NAME))?;
   let created = parse_timestamp(row, CREATED_DATE, raw.created_date)?;
   let modified = parse_timestamp(row, MODIFIED_DATE, raw.modified_date)?;
   let size_bytes = parse_size(row, raw.size_bytes)?;
   let fingerprint = raw
      .sha256_hash
      .ok_or_else(|| RowError::missing(row, SHA256_HASH))?;

   let record = FileDescription {
      path: path.to_string(),
      name: name.to_string(),
      extension: raw.extension.unwrap_or_default().to_string(),
      created,
      modified,
      size_bytes,
      fingerprint: fingerprint.to_string(),
      keywords: Vec::new(),
   }
   .with_keywords(
      raw.keywords
         .unwrap_or_default()
         .split(KEYWORD_SEPARATOR),
   );

   validate(row, &record)?;
   Ok(record)
}

/// Checks the invariants a record must satisfy before it may be upserted.
///
/// Used for rows from the artifact and for records submitted by clients.
pub fn validate(row: usize, record: &FileDescription) -> Result<(), RowError> {
   if record.path.is_empty() {
      return Err(RowError::missing(row, DIRECTORY_PATH));
   }
   if !Path::new(&record.path).is_absolute() {
      return Err(RowError::new(row, DIRECTORY_PATH, "must be an absolute path"));
   }
   if record.name.is_empty() {
      return Err(RowError::missing(row, FILE_NAME));
   }
   if i64::try_from(record.size_bytes).is_err() {
      return Err(RowError::new(row, SIZE_BYTES, "exceeds the largest storable size"));
   }
   if record.fingerprint.is_empty() {
      return Err(RowError::missing(row, SHA256_HASH));
   }
   Ok(())
}

fn parse_timestamp(row: usize, field: &str, cell: Option<&str>) -> Result<NaiveDateTime, RowError> {
   let cell = cell.ok_or_else(|| RowError::missing(row, field))?;
   NaiveDateTime::parse_from_str(cell.trim(), TIMESTAMP_FORMAT).map_err(|e| {
      RowError::new(row, field, format!("expected YYYY-MM-DD HH:MM:SS, got {cell:?} ({e})"))
   })
}

fn parse_size(row: usize, cell: Option<&str>) -> Result<u64, RowError> {
   let cell = cell.ok_or_else(|| RowError::missing(row, SIZE_BYTES))?;
   let digits = cell.trim();
   if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
      return Err(RowError::new(
         row,
         SIZE_BYTES,
         format!("expected a non-negative integer, got {cell:?}"),
      ));
   }
   digits
      .parse::<u64>()
      .map_err(|e| RowError::new(row, SIZE_BYTES, e.to_string()))
}

/// Column positions of one artifact header.
struct ColumnMap {
   required: [usize; 7],
   keywords: Option<usize>,
   width:    usize,
}

impl ColumnMap {
   fn resolve(names: &[String]) -> Result<Self> {
      let position = |wanted: &str| {
         names
            .iter()
            .position(|name| name.trim().trim_start_matches('\u{feff}') == wanted)
      };

      let mut required = [0usize; 7];
      for (slot, column) in required.iter_mut().zip(REQUIRED_COLUMNS) {
         *slot = position(column).ok_or_else(|| {
            Error::from(RowError::new(0, column, "column missing from header"))
         })?;
      }
      Ok(Self { required, keywords: position(KEYWORDS), width: names.len() })
   }

   /// Cells of one record. A record wider than the header, or a needed cell
   /// that is not UTF-8, rejects the row.
   fn row<'a>(&self, row: usize, record: &'a ByteRecord) -> Result<RawRow<'a>, RowError> {
      if record.len() > self.width {
         return Err(RowError::new(
            row,
            "row",
            format!("expected at most {} fields, found {}", self.width, record.len()),
         ));
      }

      let [path, name, ext, created, modified, size, hash] = self.required;
      Ok(RawRow {
         directory_path: cell(record, Some(path), row, DIRECTORY_PATH)?,
         file_name:      cell(record, Some(name), row, FILE_NAME)?,
         extension:      cell(record, Some(ext), row, EXTENSION)?,
         created_date:   cell(record, Some(created), row, CREATED_DATE)?,
         modified_date:  cell(record, Some(modified), row, MODIFIED_DATE)?,
         size_bytes:     cell(record, Some(size), row, SIZE_BYTES)?,
         sha256_hash:    cell(record, Some(hash), row, SHA256_HASH)?,
         keywords:       cell(record, self.keywords, row, KEYWORDS)?,
      })
   }
}

/// Decodes one cell; absent (short row) and empty cells are `None`.
fn cell<'a>(
   record: &'a ByteRecord,
   idx: Option<usize>,
   row: usize,
   field: &str,
) -> Result<Option<&'a str>, RowError> {
   let Some(bytes) = idx.and_then(|i| record.get(i)) else {
      return Ok(None);
   };
   let text = str::from_utf8(bytes)
      .map_err(|e| RowError::new(row, field, format!("not valid UTF-8: {e}")))?;
   Ok(Some(text).filter(|s| !s.is_empty()))
}

/// Parses a whole artifact.
///
/// A header that lacks a required column fails the artifact. Every other
/// problem is scoped to its row: short rows report their first missing field,
/// and rows with extra fields or undecodable cells are rejected whole.
pub fn parse_artifact(data: &[u8]) -> Result<ParsedArtifact> {
   let mut reader = ReaderBuilder::new()
      .has_headers(true)
      .flexible(true)
      .from_reader(data);

   let names: Vec<String> = reader
      .byte_headers()?
      .iter()
      .map(|name| String::from_utf8_lossy(name).into_owned())
      .collect();
   let columns = ColumnMap::resolve(&names)?;

   let mut parsed = ParsedArtifact::default();
   let mut record = ByteRecord::new();
   loop {
      match reader.read_byte_record(&mut record) {
         Ok(true) => {},
         Ok(false) => break,
         // Reading from memory, so only a broken reader state gets here.
         Err(e) => {
            tracing::warn!("artifact decoding stopped after {} rows: {e}", parsed.rows);
            parsed
               .errors
               .push(RowError::new(parsed.rows + 1, "row", e.to_string()));
            break;
         },
      }

      parsed.rows += 1;
      let outcome = columns
         .row(parsed.rows, &record)
         .and_then(|raw| parse_row(parsed.rows, &raw));
      match outcome {
         Ok(description) => parsed.records.push(description),
         Err(e) => parsed.errors.push(e),
      }
   }

   tracing::debug!(
      rows = parsed.rows,
      valid = parsed.records.len(),
      rejected = parsed.errors.len(),
      "parsed artifact"
   );
   Ok(parsed)
}
