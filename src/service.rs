//! API boundary of the index: integrity-checked inserts, client batches, and
//! queries, each bounded by a caller-supplied or default timeout.

use std::{path::Path, sync::Arc, time::Duration};

use tokio::time;

use crate::{
   Result,
   config::Config,
   error::Error,
   integrity, record,
   search::QueryService,
   store::Store,
   types::{BatchEntry, FileDescription, FileRecord, IndexDir, IndexStats, Upserted},
};

#[derive(Debug, Clone, Copy)]
pub struct ServiceOptions {
   pub request_timeout:    Duration,
   pub max_search_results: usize,
}

impl ServiceOptions {
   pub fn from_config(cfg: &Config) -> Self {
      Self {
         request_timeout:    cfg.request_timeout(),
         max_search_results: cfg.effective_max_search_results(),
      }
   }
}

impl Default for ServiceOptions {
   fn default() -> Self {
      Self::from_config(&Config::default())
   }
}

pub struct IndexService {
   store:           Arc<dyn Store>,
   query:           QueryService,
   request_timeout: Duration,
}

impl IndexService {
   pub fn new(store: Arc<dyn Store>, options: ServiceOptions) -> Self {
      let query = QueryService::new(Arc::clone(&store), options.max_search_results);
      Self { store, query, request_timeout: options.request_timeout }
   }

   pub fn store(&self) -> &Arc<dyn Store> {
      &self.store
   }

   /// Runs `fut` under the caller's timeout (or the default). On expiry the
   /// future is dropped, which rolls back any transaction it had open.
   async fn bounded<T>(
      &self,
      op: &'static str,
      timeout: Option<Duration>,
      fut: impl Future<Output = Result<T>>,
   ) -> Result<T> {
      let limit = timeout.unwrap_or(self.request_timeout);
      time::timeout(limit, fut).await.unwrap_or_else(|_| {
         tracing::debug!(op, ?limit, "request timed out");
         Err(Error::Cancelled { op })
      })
   }

   /// Verifies the record's fingerprint, then upserts it.
   ///
   /// A mismatch fails before the index is touched.
   pub async fn insert(
      &self,
      record: FileDescription,
      timeout: Option<Duration>,
   ) -> Result<Upserted> {
      integrity::verify(&record)?;
      record::validate(1, &record)?;

      let upserted = self
         .bounded("insert", timeout, self.store.upsert(&record))
         .await?;
      tracing::info!(path = %record.path, outcome = upserted.outcome.as_str(), "insert");
      Ok(upserted)
   }

   /// Upserts already-trusted records in one transaction, without the
   /// fingerprint check.
   ///
   /// Records that fail validation are reported as rejected and left out of
   /// the transaction; the rest commit or roll back together.
   pub async fn insert_batch(&self, records: Vec<FileDescription>) -> Result<Vec<BatchEntry>> {
      let mut slots = Vec::with_capacity(records.len());
      let mut valid = Vec::with_capacity(records.len());
      for (index, record) in records.into_iter().enumerate() {
         match record::validate(index + 1, &record) {
            Ok(()) => {
               slots.push(None);
               valid.push(record);
            },
            Err(e) => {
               slots.push(Some(BatchEntry::Rejected { index, field: e.field, reason: e.reason }));
            },
         }
      }

      let mut applied = self.store.upsert_batch(&valid).await?.into_iter();
      tracing::info!(applied = valid.len(), rejected = slots.len() - valid.len(), "batch insert");
      Ok(slots
         .into_iter()
         .filter_map(|slot| slot.or_else(|| applied.next().map(BatchEntry::Applied)))
         .collect())
   }

   pub async fn search(
      &self,
      query: &str,
      limit: Option<usize>,
      timeout: Option<Duration>,
   ) -> Result<Vec<FileRecord>> {
      self
         .bounded("search", timeout, self.query.search(query, limit))
         .await
   }

   pub async fn get(&self, path: &str) -> Result<Option<FileRecord>> {
      self.bounded("get", None, self.store.get(path)).await
   }

   pub async fn delete(&self, path: &str) -> Result<bool> {
      let removed = self.bounded("delete", None, self.store.delete(path)).await?;
      tracing::info!(path, removed, "delete");
      Ok(removed)
   }

   pub async fn reset(&self) -> Result<u64> {
      let removed = self.store.reset().await?;
      tracing::info!(removed, "index reset");
      Ok(removed)
   }

   pub async fn stats(&self) -> Result<IndexStats> {
      self.bounded("stats", None, self.store.stats()).await
   }

   pub async fn add_index_dir(&self, path: &str, whitelisted: bool) -> Result<IndexDir> {
      if !Path::new(path).is_absolute() {
         return Err(Error::MalformedRecord {
            row:    1,
            field:  "path".to_string(),
            reason: "must be an absolute path".to_string(),
         });
      }
      self
         .bounded("add_index_dir", None, self.store.add_index_dir(path, whitelisted))
         .await
   }

   pub async fn index_dirs(&self) -> Result<Vec<IndexDir>> {
      self.bounded("index_dirs", None, self.store.index_dirs()).await
   }
}
