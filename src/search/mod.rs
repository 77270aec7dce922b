//! Path substring search over the index.

use std::sync::Arc;

use crate::{error::Result, store::Store, types::FileRecord};

/// Read-side entry point of the index.
///
/// Matching is a case-sensitive substring test on the full path; `%` and `_`
/// are ordinary characters and an empty query matches every file. Results
/// are ordered by path and each carries its keywords in submission order.
pub struct QueryService {
   store:       Arc<dyn Store>,
   max_results: usize,
}

impl QueryService {
   pub fn new(store: Arc<dyn Store>, max_results: usize) -> Self {
      Self { store, max_results: max_results.max(1) }
   }

   /// Caller limits may only lower the configured cap.
   pub fn effective_limit(&self, requested: Option<usize>) -> usize {
      requested.map_or(self.max_results, |limit| limit.min(self.max_results))
   }

   pub async fn search(&self, query: &str, limit: Option<usize>) -> Result<Vec<FileRecord>> {
      let limit = self.effective_limit(limit);
      if limit == 0 {
         return Ok(Vec::new());
      }
      let files = self.store.search(query, limit).await?;
      tracing::debug!(query, limit, hits = files.len(), "search");
      Ok(files)
   }
}

#[cfg(test)]
mod tests {
   use async_trait::async_trait;

   use super::*;
   use crate::types::{FileDescription, IndexDir, IndexStats, Upserted};

   struct EmptyStore;

   #[async_trait]
   impl Store for EmptyStore {
      async fn upsert(&self, _record: &FileDescription) -> Result<Upserted> {
         unreachable!("read-only test store")
      }

      async fn upsert_batch(&self, _records: &[FileDescription]) -> Result<Vec<Upserted>> {
         unreachable!("read-only test store")
      }

      async fn get(&self, _path: &str) -> Result<Option<FileRecord>> {
         Ok(None)
      }

      async fn search(&self, _query: &str, limit: usize) -> Result<Vec<FileRecord>> {
         assert!(limit > 0, "zero limits never reach the store");
         Ok(Vec::new())
      }

      async fn delete(&self, _path: &str) -> Result<bool> {
         Ok(false)
      }

      async fn reset(&self) -> Result<u64> {
         Ok(0)
      }

      async fn stats(&self) -> Result<IndexStats> {
         Ok(IndexStats::default())
      }

      async fn add_index_dir(&self, _path: &str, _whitelisted: bool) -> Result<IndexDir> {
         unreachable!("read-only test store")
      }

      async fn index_dirs(&self) -> Result<Vec<IndexDir>> {
         Ok(Vec::new())
      }
   }

   #[test]
   fn caller_limit_cannot_exceed_the_cap() {
      let service = QueryService::new(Arc::new(EmptyStore), 50);
      assert_eq!(service.effective_limit(None), 50);
      assert_eq!(service.effective_limit(Some(10)), 10);
      assert_eq!(service.effective_limit(Some(500)), 50);
   }

   #[tokio::test]
   async fn zero_limit_returns_nothing() {
      let service = QueryService::new(Arc::new(EmptyStore), 50);
      let files = service.search("a", Some(0)).await.expect("search");
      assert!(files.is_empty());
   }
}
