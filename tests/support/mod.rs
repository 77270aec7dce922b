#![allow(dead_code, reason = "each test binary uses a different subset")]

use std::{
   future::Future,
   path::{Path, PathBuf},
   sync::Arc,
   time::Duration,
};

use chrono::NaiveDateTime;
use findex::{
   store::{SqliteStore, Store, StoreOptions},
   types::{FileDescription, TIMESTAMP_FORMAT},
};

pub const HEADER: &str =
   "DIRECTORY_PATH,FILE_NAME,EXTENSION,CREATED_DATE,MODIFIED_DATE,SIZE_BYTES,SHA256_HASH,KEYWORDS";

pub fn ts(s: &str) -> NaiveDateTime {
   NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT).unwrap()
}

/// Opens a fresh database in `dir`.
pub async fn open_store(dir: &tempfile::TempDir) -> Arc<SqliteStore> {
   let mut options = StoreOptions::new(dir.path().join("index.db"));
   options.max_connections = 4;
   options.busy_timeout = Duration::from_secs(5);
   Arc::new(SqliteStore::open(&options).await.unwrap())
}

pub fn as_dyn(store: &Arc<SqliteStore>) -> Arc<dyn Store> {
   Arc::clone(store) as Arc<dyn Store>
}

pub fn description(path: &str, size: u64, keywords: &[&str]) -> FileDescription {
   let name = Path::new(path)
      .file_name()
      .map(|n| n.to_string_lossy().into_owned())
      .unwrap_or_default();
   let extension = Path::new(path)
      .extension()
      .map(|e| e.to_string_lossy().into_owned())
      .unwrap_or_default();
   FileDescription {
      path: path.to_string(),
      name,
      extension,
      created: ts("2024-01-01 00:00:00"),
      modified: ts("2024-01-02 00:00:00"),
      size_bytes: size,
      fingerprint: format!("fp-{size}"),
      keywords: Vec::new(),
   }
   .with_keywords(keywords)
}

/// Writes an artifact with the standard header and `rows` (already
/// comma-joined) to `dir/findex_cache.csv`.
pub fn write_artifact(dir: &Path, rows: &[&str]) -> PathBuf {
   let path = dir.join("findex_cache.csv");
   let mut text = String::from(HEADER);
   for row in rows {
      text.push('\n');
      text.push_str(row);
   }
   text.push('\n');
   std::fs::write(&path, text).unwrap();
   path
}

/// Polls `check` until it returns true or `deadline` elapses.
pub async fn wait_until<F, Fut>(deadline: Duration, mut check: F) -> bool
where
   F: FnMut() -> Fut,
   Fut: Future<Output = bool>,
{
   let start = tokio::time::Instant::now();
   loop {
      if check().await {
         return true;
      }
      if start.elapsed() >= deadline {
         return false;
      }
      tokio::time::sleep(Duration::from_millis(20)).await;
   }
}
