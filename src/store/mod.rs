//! Persistent index abstraction with a SQLite implementation.

mod sqlite;

use std::{path::PathBuf, time::Duration};

use async_trait::async_trait;

pub use self::sqlite::{SqliteStore, StoreError};
use crate::{
   Result,
   config::Config,
   types::{FileDescription, FileRecord, IndexDir, IndexStats, Upserted},
};

/// The index: files keyed by path, each owning an ordered keyword set.
///
/// Implementations must make every write atomic: a call either applies fully
/// or leaves the index as it was.
#[async_trait]
pub trait Store: Send + Sync {
   /// Inserts the record, or overwrites the record with the same path and
   /// replaces its keywords.
   async fn upsert(&self, record: &FileDescription) -> Result<Upserted>;

   /// Applies all records in one transaction, in order. Outcomes are returned
   /// in input order; on error nothing is applied.
   async fn upsert_batch(&self, records: &[FileDescription]) -> Result<Vec<Upserted>>;

   async fn get(&self, path: &str) -> Result<Option<FileRecord>>;

   /// Files whose path contains `query` (case-sensitive), ordered by path.
   async fn search(&self, query: &str, limit: usize) -> Result<Vec<FileRecord>>;

   /// Removes the file and its keywords. Returns whether the path existed.
   async fn delete(&self, path: &str) -> Result<bool>;

   /// Removes every file and keyword, returning the number of files removed.
   async fn reset(&self) -> Result<u64>;

   async fn stats(&self) -> Result<IndexStats>;

   /// Registers a directory, or updates the flag of an existing one.
   async fn add_index_dir(&self, path: &str, whitelisted: bool) -> Result<IndexDir>;

   async fn index_dirs(&self) -> Result<Vec<IndexDir>>;
}

/// Connection settings for [`SqliteStore::open`].
#[derive(Debug, Clone)]
pub struct StoreOptions {
   pub path:            PathBuf,
   pub max_connections: u32,
   pub busy_timeout:    Duration,
}

impl StoreOptions {
   pub fn new(path: impl Into<PathBuf>) -> Self {
      let defaults = Config::default();
      Self {
         path:            path.into(),
         max_connections: defaults.pool_max_connections,
         busy_timeout:    defaults.busy_timeout(),
      }
   }

   pub fn from_config(cfg: &Config) -> Self {
      Self {
         path:            cfg.effective_database_path(),
         max_connections: cfg.pool_max_connections.max(1),
         busy_timeout:    cfg.busy_timeout(),
      }
   }
}
