//! Artifact reconciliation: read, parse, and upsert in logical batches.

use std::{path::Path, sync::Arc};

use indicatif::ProgressBar;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::{
   Result,
   error::Error,
   record::{self, RowError},
   store::Store,
   types::{FileDescription, UpsertOutcome},
};

const LOGGED_ROW_ERRORS: usize = 20;

/// Progress of the batch phase of a sync.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncProgress {
   pub processed: usize,
   pub total:     usize,
}

/// Result summary from a sync operation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncResult {
   pub rows:       usize,
   pub inserted:   usize,
   pub updated:    usize,
   pub batches:    usize,
   pub row_errors: Vec<RowError>,
}

impl SyncResult {
   pub const fn applied(&self) -> usize {
      self.inserted + self.updated
   }
}

/// Trait for receiving sync progress updates
pub trait SyncProgressCallback: Send {
   fn progress(&mut self, progress: SyncProgress);
}

impl<F: FnMut(SyncProgress) + Send> SyncProgressCallback for F {
   fn progress(&mut self, progress: SyncProgress) {
      self(progress);
   }
}

impl SyncProgressCallback for () {
   fn progress(&mut self, _progress: SyncProgress) {}
}

impl SyncProgressCallback for ProgressBar {
   fn progress(&mut self, progress: SyncProgress) {
      self.update(|state| {
         state.set_len(progress.total as u64);
         state.set_pos(progress.processed as u64);
      });
   }
}

/// Engine that reconciles the artifact into the index
#[derive(Clone)]
pub struct SyncEngine {
   store:      Arc<dyn Store>,
   batch_size: usize,
}

impl SyncEngine {
   pub fn new(store: Arc<dyn Store>, batch_size: usize) -> Self {
      Self { store, batch_size: batch_size.max(1) }
   }

   pub fn store(&self) -> &Arc<dyn Store> {
      &self.store
   }

   /// Reads the whole artifact, mapping any failure to
   /// [`Error::ArtifactUnavailable`].
   pub async fn read_artifact(path: &Path) -> Result<Vec<u8>> {
      tokio::fs::read(path)
         .await
         .map_err(|source| Error::ArtifactUnavailable { path: path.to_path_buf(), source })
   }

   /// Reads and applies the artifact at `path`.
   pub async fn sync_artifact(
      &self,
      path: &Path,
      cancel: &CancellationToken,
      callback: &mut dyn SyncProgressCallback,
   ) -> Result<SyncResult> {
      let data = Self::read_artifact(path).await?;
      self.sync_bytes(data, cancel, callback).await
   }

   /// Parses artifact contents and applies every valid row.
   ///
   /// Malformed rows are collected in [`SyncResult::row_errors`]; they never
   /// stop the other rows. A persistence failure stops the sync; batches
   /// committed before it stay committed.
   pub async fn sync_bytes(
      &self,
      data: Vec<u8>,
      cancel: &CancellationToken,
      callback: &mut dyn SyncProgressCallback,
   ) -> Result<SyncResult> {
      let parsed = tokio::task::spawn_blocking(move || record::parse_artifact(&data))
         .await
         .map_err(|e| Error::Server { op: "parse", reason: e.to_string() })??;

      for err in parsed.errors.iter().take(LOGGED_ROW_ERRORS) {
         tracing::warn!("skipping artifact {err}");
      }
      if parsed.errors.len() > LOGGED_ROW_ERRORS {
         tracing::warn!("{} more malformed rows", parsed.errors.len() - LOGGED_ROW_ERRORS);
      }

      let mut result = SyncResult {
         rows: parsed.rows,
         row_errors: parsed.errors,
         ..SyncResult::default()
      };
      self
         .apply(&parsed.records, cancel, callback, &mut result)
         .await?;

      tracing::info!(
         rows = result.rows,
         inserted = result.inserted,
         updated = result.updated,
         rejected = result.row_errors.len(),
         batches = result.batches,
         "artifact applied"
      );
      Ok(result)
   }

   /// Upserts `records` in transactions of at most `batch_size` records.
   ///
   /// Cancellation is observed between batches, never inside one.
   pub async fn apply(
      &self,
      records: &[FileDescription],
      cancel: &CancellationToken,
      callback: &mut dyn SyncProgressCallback,
      result: &mut SyncResult,
   ) -> Result<()> {
      let total = records.len();
      let mut processed = 0;
      callback.progress(SyncProgress { processed, total });

      for chunk in records.chunks(self.batch_size) {
         if cancel.is_cancelled() {
            tracing::info!(processed, total, "sync cancelled between batches");
            return Err(Error::Cancelled { op: "sync" });
         }

         let outcomes = self.store.upsert_batch(chunk).await?;
         for upserted in &outcomes {
            match upserted.outcome {
               UpsertOutcome::Inserted => result.inserted += 1,
               UpsertOutcome::Updated => result.updated += 1,
            }
         }
         result.batches += 1;
         processed += chunk.len();
         tracing::debug!(batch = result.batches, records = chunk.len(), "committed batch");
         callback.progress(SyncProgress { processed, total });
      }
      Ok(())
   }
}
