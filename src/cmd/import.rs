//! One-shot artifact reconciliation.
//!
//! Reads the scanner's artifact once and applies it to the index in-process,
//! without a daemon.

use std::{path::PathBuf, sync::Arc, time::Duration};

use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::signal;
use tokio_util::sync::CancellationToken;

use crate::{
   Result, config,
   store::{SqliteStore, StoreOptions},
   sync::SyncEngine,
};

pub async fn execute(artifact: Option<PathBuf>, batch_size: Option<usize>, json: bool) -> Result<()> {
   let cfg = config::get();
   let artifact = artifact.unwrap_or_else(|| cfg.effective_artifact_path());
   let store = SqliteStore::open(&StoreOptions::from_config(cfg)).await?;
   let engine = SyncEngine::new(Arc::new(store), batch_size.unwrap_or(cfg.sync_batch_size));

   let cancel = CancellationToken::new();
   let cancel_on_signal = {
      let cancel = cancel.clone();
      tokio::spawn(async move {
         if signal::ctrl_c().await.is_ok() {
            cancel.cancel();
         }
      })
   };

   let progress = (!json).then(|| {
      let pb = ProgressBar::new(0);
      pb.set_style(
         ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} records")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
      );
      pb.enable_steady_tick(Duration::from_millis(100));
      pb
   });

   let outcome = match &progress {
      Some(pb) => {
         engine
            .sync_artifact(&artifact, &cancel, &mut pb.clone())
            .await
      },
      None => engine.sync_artifact(&artifact, &cancel, &mut ()).await,
   };
   if let Some(pb) = progress {
      pb.finish_and_clear();
   }
   cancel_on_signal.abort();
   let result = outcome?;

   if json {
      println!("{}", serde_json::to_string_pretty(&result)?);
      return Ok(());
   }

   println!(
      "{} {} rows from {}",
      style("Imported").green().bold(),
      result.rows,
      style(artifact.display()).dim()
   );
   println!(
      "  inserted {}, updated {}, in {} batch(es)",
      style(result.inserted).cyan(),
      style(result.updated).cyan(),
      result.batches
   );
   if !result.row_errors.is_empty() {
      println!("  {} rows skipped:", style(result.row_errors.len()).yellow());
      for err in &result.row_errors {
         println!("    {}", style(err).dim());
      }
   }
   Ok(())
}
