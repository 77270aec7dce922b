//! `SQLite` index store.
//!
//! Files and keywords live in two tables joined by a cascading foreign key.
//! Every write runs in a transaction; the insert-or-update decision is a single
//! `INSERT .. ON CONFLICT(path) DO UPDATE .. RETURNING id` statement so that
//! concurrent writers for one path can never produce two rows.

use std::{fs, io};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::{
   FromRow, Pool, Sqlite, SqliteConnection,
   sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous},
};
use uuid::Uuid;

use super::{Store, StoreOptions};
use crate::{
   Result,
   types::{
      FileDescription, FileRecord, IndexDir, IndexStats, KeywordRecord, UpsertOutcome, Upserted,
      normalize_keywords,
   },
};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
   #[error("failed to create database directory: {0}")]
   CreateDir(#[source] io::Error),

   #[error("failed to connect to database: {0}")]
   Connect(#[source] sqlx::Error),

   #[error("failed to migrate schema: {0}")]
   Migrate(#[source] sqlx::Error),

   #[error("failed to begin transaction: {0}")]
   Begin(#[source] sqlx::Error),

   #[error("failed to commit transaction: {0}")]
   Commit(#[source] sqlx::Error),

   #[error("failed to upsert {path}: {source}")]
   UpsertFile {
      path:   String,
      #[source]
      source: sqlx::Error,
   },

   #[error("failed to replace keywords of {path}: {source}")]
   ReplaceKeywords {
      path:   String,
      #[source]
      source: sqlx::Error,
   },

   #[error("size of {path} does not fit the index: {size}")]
   SizeOutOfRange { path: String, size: u64 },

   #[error("failed to query files: {0}")]
   Query(#[source] sqlx::Error),

   #[error("failed to delete {path}: {source}")]
   Delete {
      path:   String,
      #[source]
      source: sqlx::Error,
   },

   #[error("failed to reset index: {0}")]
   Reset(#[source] sqlx::Error),

   #[error("failed to read index statistics: {0}")]
   Stats(#[source] sqlx::Error),

   #[error("failed to write index directory {path}: {source}")]
   IndexDir {
      path:   String,
      #[source]
      source: sqlx::Error,
   },

   #[error("corrupt row in {table}: {reason}")]
   InvalidRow { table: &'static str, reason: String },
}

const SCHEMA: &[&str] = &[
   "CREATE TABLE IF NOT EXISTS files (
      id          TEXT PRIMARY KEY NOT NULL,
      path        TEXT NOT NULL UNIQUE,
      name        TEXT NOT NULL,
      extension   TEXT NOT NULL,
      created_at  TEXT NOT NULL,
      modified_at TEXT NOT NULL,
      size_bytes  INTEGER NOT NULL CHECK (size_bytes >= 0),
      fingerprint TEXT NOT NULL
   )",
   "CREATE TABLE IF NOT EXISTS keywords (
      id       TEXT PRIMARY KEY NOT NULL,
      file_id  TEXT NOT NULL REFERENCES files(id) ON DELETE CASCADE,
      position INTEGER NOT NULL,
      keyword  TEXT NOT NULL
   )",
   "CREATE INDEX IF NOT EXISTS idx_keywords_file ON keywords(file_id, position)",
   "CREATE TABLE IF NOT EXISTS index_dirs (
      id          TEXT PRIMARY KEY NOT NULL,
      path        TEXT NOT NULL UNIQUE,
      whitelisted INTEGER NOT NULL DEFAULT 1,
      created_at  TEXT NOT NULL
   )",
];

const UPSERT_FILE: &str = "INSERT INTO files
      (id, path, name, extension, created_at, modified_at, size_bytes, fingerprint)
   VALUES (?, ?, ?, ?, ?, ?, ?, ?)
   ON CONFLICT(path) DO UPDATE SET
      name = excluded.name,
      extension = excluded.extension,
      created_at = excluded.created_at,
      modified_at = excluded.modified_at,
      size_bytes = excluded.size_bytes,
      fingerprint = excluded.fingerprint
   RETURNING id";

const SELECT_JOINED: &str = "SELECT f.id, f.path, f.name, f.extension, f.created_at, \
                             f.modified_at, f.size_bytes, f.fingerprint, k.id AS keyword_id, \
                             k.keyword AS keyword";

/// Row of the `files` table.
#[derive(Debug, FromRow)]
struct FileRow {
   id:          String,
   path:        String,
   name:        String,
   extension:   String,
   created_at:  NaiveDateTime,
   modified_at: NaiveDateTime,
   size_bytes:  i64,
   fingerprint: String,
}

/// Row of the `keywords` table.
#[derive(Debug)]
struct KeywordRow {
   id:      String,
   keyword: String,
}

/// A file row left-joined with one of its keywords.
#[derive(Debug, FromRow)]
struct JoinedRow {
   #[sqlx(flatten)]
   file:       FileRow,
   keyword_id: Option<String>,
   keyword:    Option<String>,
}

#[derive(Debug, FromRow)]
struct IndexDirRow {
   id:          String,
   path:        String,
   whitelisted: bool,
   created_at:  DateTime<Utc>,
}

fn parse_id(table: &'static str, id: &str) -> Result<Uuid, StoreError> {
   Uuid::parse_str(id)
      .map_err(|e| StoreError::InvalidRow { table, reason: format!("bad id {id:?}: {e}") })
}

impl TryFrom<FileRow> for FileRecord {
   type Error = StoreError;

   fn try_from(row: FileRow) -> Result<Self, StoreError> {
      let size_bytes = u64::try_from(row.size_bytes).map_err(|_| StoreError::InvalidRow {
         table:  "files",
         reason: format!("negative size {} for {}", row.size_bytes, row.path),
      })?;
      Ok(Self {
         id: parse_id("files", &row.id)?,
         path: row.path,
         name: row.name,
         extension: row.extension,
         created: row.created_at,
         modified: row.modified_at,
         size_bytes,
         fingerprint: row.fingerprint,
         keywords: Vec::new(),
      })
   }
}

impl TryFrom<KeywordRow> for KeywordRecord {
   type Error = StoreError;

   fn try_from(row: KeywordRow) -> Result<Self, StoreError> {
      Ok(Self { id: parse_id("keywords", &row.id)?, keyword: row.keyword })
   }
}

impl TryFrom<IndexDirRow> for IndexDir {
   type Error = StoreError;

   fn try_from(row: IndexDirRow) -> Result<Self, StoreError> {
      Ok(Self {
         id:          parse_id("index_dirs", &row.id)?,
         path:        row.path,
         whitelisted: row.whitelisted,
         created_at:  row.created_at,
      })
   }
}

/// Folds path-ordered joined rows into records with their keywords.
fn collect_records(rows: Vec<JoinedRow>) -> Result<Vec<FileRecord>, StoreError> {
   let mut records: Vec<FileRecord> = Vec::new();
   for row in rows {
      let keyword = match (row.keyword_id, row.keyword) {
         (Some(id), Some(keyword)) => Some(KeywordRecord::try_from(KeywordRow { id, keyword })?),
         _ => None,
      };
      let file_id = parse_id("files", &row.file.id)?;
      if records.last().is_none_or(|last| last.id != file_id) {
         records.push(FileRecord::try_from(row.file)?);
      }
      if let (Some(keyword), Some(last)) = (keyword, records.last_mut()) {
         last.keywords.push(keyword);
      }
   }
   Ok(records)
}

/// `SQLite`-backed [`Store`].
pub struct SqliteStore {
   pool: Pool<Sqlite>,
}

impl SqliteStore {
   /// Opens (creating if needed) the database and applies the schema.
   pub async fn open(options: &StoreOptions) -> Result<Self> {
      if let Some(parent) = options.path.parent()
         && !parent.as_os_str().is_empty()
      {
         fs::create_dir_all(parent).map_err(StoreError::CreateDir)?;
      }

      let connect = SqliteConnectOptions::new()
         .filename(&options.path)
         .create_if_missing(true)
         .journal_mode(SqliteJournalMode::Wal)
         .synchronous(SqliteSynchronous::Normal)
         .foreign_keys(true)
         .busy_timeout(options.busy_timeout);

      let pool = SqlitePoolOptions::new()
         .max_connections(options.max_connections.max(1))
         .connect_with(connect)
         .await
         .map_err(StoreError::Connect)?;

      let store = Self { pool };
      store.migrate().await?;
      tracing::debug!(path = %options.path.display(), "opened index database");
      Ok(store)
   }

   /// Get a reference to the connection pool.
   pub fn pool(&self) -> &Pool<Sqlite> {
      &self.pool
   }

   async fn migrate(&self) -> Result<()> {
      for statement in SCHEMA {
         sqlx::query(statement)
            .execute(&self.pool)
            .await
            .map_err(StoreError::Migrate)?;
      }
      Ok(())
   }

   /// Upserts one record on an open transaction.
   async fn upsert_in(conn: &mut SqliteConnection, record: &FileDescription) -> Result<Upserted> {
      let size = i64::try_from(record.size_bytes).map_err(|_| StoreError::SizeOutOfRange {
         path: record.path.clone(),
         size: record.size_bytes,
      })?;

      let candidate = Uuid::new_v4();
      let id: String = sqlx::query_scalar(UPSERT_FILE)
         .bind(candidate.to_string())
         .bind(&record.path)
         .bind(&record.name)
         .bind(&record.extension)
         .bind(record.created)
         .bind(record.modified)
         .bind(size)
         .bind(&record.fingerprint)
         .fetch_one(&mut *conn)
         .await
         .map_err(|source| StoreError::UpsertFile { path: record.path.clone(), source })?;

      let file_id = parse_id("files", &id)?;
      let outcome = if file_id == candidate {
         UpsertOutcome::Inserted
      } else {
         UpsertOutcome::Updated
      };

      let replace_err =
         |source: sqlx::Error| StoreError::ReplaceKeywords { path: record.path.clone(), source };
      sqlx::query("DELETE FROM keywords WHERE file_id = ?")
         .bind(&id)
         .execute(&mut *conn)
         .await
         .map_err(replace_err)?;

      let mut keywords = Vec::with_capacity(record.keywords.len());
      for (position, keyword) in normalize_keywords(&record.keywords).into_iter().enumerate() {
         let keyword_id = Uuid::new_v4();
         sqlx::query("INSERT INTO keywords (id, file_id, position, keyword) VALUES (?, ?, ?, ?)")
            .bind(keyword_id.to_string())
            .bind(&id)
            .bind(position as i64)
            .bind(&keyword)
            .execute(&mut *conn)
            .await
            .map_err(replace_err)?;
         keywords.push(KeywordRecord { id: keyword_id, keyword });
      }

      tracing::trace!(path = %record.path, outcome = outcome.as_str(), "upserted file");
      Ok(Upserted {
         outcome,
         record: FileRecord {
            id: file_id,
            path: record.path.clone(),
            name: record.name.clone(),
            extension: record.extension.clone(),
            created: record.created,
            modified: record.modified,
            size_bytes: record.size_bytes,
            fingerprint: record.fingerprint.clone(),
            keywords,
         },
      })
   }
}

#[async_trait]
impl Store for SqliteStore {
   async fn upsert(&self, record: &FileDescription) -> Result<Upserted> {
      let mut tx = self.pool.begin().await.map_err(StoreError::Begin)?;
      let upserted = Self::upsert_in(&mut *tx, record).await?;
      tx.commit().await.map_err(StoreError::Commit)?;
      Ok(upserted)
   }

   async fn upsert_batch(&self, records: &[FileDescription]) -> Result<Vec<Upserted>> {
      if records.is_empty() {
         return Ok(Vec::new());
      }

      let mut tx = self.pool.begin().await.map_err(StoreError::Begin)?;
      let mut outcomes = Vec::with_capacity(records.len());
      for record in records {
         // An early return drops `tx`, which rolls the whole batch back.
         outcomes.push(Self::upsert_in(&mut *tx, record).await?);
      }
      tx.commit().await.map_err(StoreError::Commit)?;
      Ok(outcomes)
   }

   async fn get(&self, path: &str) -> Result<Option<FileRecord>> {
      let sql = format!(
         "{SELECT_JOINED} FROM files AS f LEFT JOIN keywords AS k ON k.file_id = f.id WHERE \
          f.path = ? ORDER BY k.position"
      );
      let rows: Vec<JoinedRow> = sqlx::query_as(&sql)
         .bind(path)
         .fetch_all(&self.pool)
         .await
         .map_err(StoreError::Query)?;
      Ok(collect_records(rows)?.into_iter().next())
   }

   async fn search(&self, query: &str, limit: usize) -> Result<Vec<FileRecord>> {
      let sql = format!(
         "{SELECT_JOINED} FROM (SELECT * FROM files WHERE (? = '' OR instr(path, ?) > 0) ORDER \
          BY path LIMIT ?) AS f LEFT JOIN keywords AS k ON k.file_id = f.id ORDER BY f.path, \
          k.position"
      );
      let limit = i64::try_from(limit).unwrap_or(i64::MAX);
      let rows: Vec<JoinedRow> = sqlx::query_as(&sql)
         .bind(query)
         .bind(query)
         .bind(limit)
         .fetch_all(&self.pool)
         .await
         .map_err(StoreError::Query)?;
      Ok(collect_records(rows)?)
   }

   async fn delete(&self, path: &str) -> Result<bool> {
      let result = sqlx::query("DELETE FROM files WHERE path = ?")
         .bind(path)
         .execute(&self.pool)
         .await
         .map_err(|source| StoreError::Delete { path: path.to_string(), source })?;
      Ok(result.rows_affected() > 0)
   }

   async fn reset(&self) -> Result<u64> {
      let mut tx = self.pool.begin().await.map_err(StoreError::Begin)?;
      let result = sqlx::query("DELETE FROM files")
         .execute(&mut *tx)
         .await
         .map_err(StoreError::Reset)?;
      tx.commit().await.map_err(StoreError::Commit)?;
      Ok(result.rows_affected())
   }

   async fn stats(&self) -> Result<IndexStats> {
      let (files, keywords, index_dirs): (i64, i64, i64) = sqlx::query_as(
         "SELECT (SELECT COUNT(*) FROM files), (SELECT COUNT(*) FROM keywords), (SELECT COUNT(*) \
          FROM index_dirs)",
      )
      .fetch_one(&self.pool)
      .await
      .map_err(StoreError::Stats)?;
      Ok(IndexStats {
         files:      files as u64,
         keywords:   keywords as u64,
         index_dirs: index_dirs as u64,
      })
   }

   async fn add_index_dir(&self, path: &str, whitelisted: bool) -> Result<IndexDir> {
      let row: IndexDirRow = sqlx::query_as(
         "INSERT INTO index_dirs (id, path, whitelisted, created_at) VALUES (?, ?, ?, ?)
          ON CONFLICT(path) DO UPDATE SET whitelisted = excluded.whitelisted
          RETURNING id, path, whitelisted, created_at",
      )
      .bind(Uuid::new_v4().to_string())
      .bind(path)
      .bind(whitelisted)
      .bind(Utc::now())
      .fetch_one(&self.pool)
      .await
      .map_err(|source| StoreError::IndexDir { path: path.to_string(), source })?;
      Ok(IndexDir::try_from(row)?)
   }

   async fn index_dirs(&self) -> Result<Vec<IndexDir>> {
      let rows: Vec<IndexDirRow> = sqlx::query_as(
         "SELECT id, path, whitelisted, created_at FROM index_dirs ORDER BY path",
      )
      .fetch_all(&self.pool)
      .await
      .map_err(StoreError::Query)?;
      rows
         .into_iter()
         .map(|row| IndexDir::try_from(row).map_err(Into::into))
         .collect()
   }
}
