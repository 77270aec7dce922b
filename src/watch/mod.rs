//! Artifact watcher.
//!
//! A [`ChangeSource`] reports that the artifact may have changed. The
//! [`ChangeWatcher`] coalesces bursts of such triggers within the debounce
//! window into one processing pass that re-reads the whole artifact and runs
//! the [`SyncEngine`] over it.

mod native;
mod poll;

use std::{
   path::{Path, PathBuf},
   sync::{
      Arc,
      atomic::{AtomicU8, AtomicU64, Ordering},
   },
   time::Duration,
};

use serde::{Deserialize, Serialize};
use tokio::{sync::mpsc, time};
use tokio_util::sync::CancellationToken;

pub use self::{native::NotifySource, poll::PollSource};
use crate::{
   Result,
   config::{ChangeSourceKind, Config},
   error::Error,
   integrity::Digest,
   sync::{SyncEngine, SyncResult},
};

/// Upper bound on how long a steady stream of triggers can postpone a pass,
/// in debounce windows.
pub const MAX_COALESCED_WINDOWS: u32 = 20;

/// Delivers a unit trigger whenever the artifact may have changed.
///
/// Spurious triggers are harmless; the watcher skips artifacts whose contents
/// did not change.
pub trait ChangeSource: Send {
   fn start(&mut self, artifact: &Path, tx: mpsc::UnboundedSender<()>) -> Result<()>;

   fn stop(&mut self);
}

/// Builds the change source selected by configuration.
pub fn source_for(kind: ChangeSourceKind, options: &WatchOptions) -> Box<dyn ChangeSource> {
   match kind {
      ChangeSourceKind::Notify => Box::new(NotifySource::new(options.debounce)),
      ChangeSourceKind::Poll => Box::new(PollSource::new(options.poll_interval)),
   }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum WatcherState {
   Idle = 0,
   Triggered = 1,
   Processing = 2,
}

impl WatcherState {
   const fn from_u8(value: u8) -> Self {
      match value {
         1 => Self::Triggered,
         2 => Self::Processing,
         _ => Self::Idle,
      }
   }

   pub const fn as_str(self) -> &'static str {
      match self {
         Self::Idle => "idle",
         Self::Triggered => "triggered",
         Self::Processing => "processing",
      }
   }
}

/// Snapshot of the watcher's counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatcherStatus {
   pub state:    WatcherState,
   /// Processing passes finished, whatever their outcome.
   pub passes:   u64,
   /// Passes that applied the artifact.
   pub applied:  u64,
   /// Passes skipped because the artifact was unchanged.
   pub skipped:  u64,
   pub failures: u64,
}

#[derive(Debug, Clone)]
pub struct WatchOptions {
   pub artifact:      PathBuf,
   pub debounce:      Duration,
   pub poll_interval: Duration,
}

impl WatchOptions {
   pub fn from_config(cfg: &Config) -> Self {
      Self {
         artifact:      cfg.effective_artifact_path(),
         debounce:      cfg.debounce(),
         poll_interval: cfg.poll_interval(),
      }
   }
}

#[derive(Default)]
struct Counters {
   state:    AtomicU8,
   passes:   AtomicU64,
   applied:  AtomicU64,
   skipped:  AtomicU64,
   failures: AtomicU64,
}

/// Debounced artifact processor: `Idle -> Triggered -> Processing -> Idle`.
pub struct ChangeWatcher {
   engine:   SyncEngine,
   options:  WatchOptions,
   counters: Arc<Counters>,
}

impl ChangeWatcher {
   pub fn new(engine: SyncEngine, options: WatchOptions) -> Self {
      Self { engine, options, counters: Arc::default() }
   }

   pub fn artifact(&self) -> &Path {
      &self.options.artifact
   }

   pub fn state(&self) -> WatcherState {
      WatcherState::from_u8(self.counters.state.load(Ordering::Acquire))
   }

   pub fn status(&self) -> WatcherStatus {
      WatcherStatus {
         state:    self.state(),
         passes:   self.counters.passes.load(Ordering::Acquire),
         applied:  self.counters.applied.load(Ordering::Relaxed),
         skipped:  self.counters.skipped.load(Ordering::Relaxed),
         failures: self.counters.failures.load(Ordering::Relaxed),
      }
   }

   fn set_state(&self, state: WatcherState) {
      self.counters.state.store(state as u8, Ordering::Release);
   }

   /// Starts `source`, runs one initial pass, and processes triggers until
   /// `shutdown` fires. The source is stopped before returning.
   pub async fn run_with_source(
      &self,
      mut source: Box<dyn ChangeSource>,
      shutdown: CancellationToken,
      abort: CancellationToken,
   ) -> Result<()> {
      let (tx, rx) = mpsc::unbounded_channel();
      let _ = tx.send(());
      source.start(&self.options.artifact, tx)?;
      tracing::info!(artifact = %self.options.artifact.display(), "watching artifact");

      self.run(rx, shutdown, abort).await;
      source.stop();
      Ok(())
   }

   /// Processes triggers from `rx` until `shutdown` fires or every sender is
   /// gone.
   ///
   /// Shutdown is only observed between passes, so an in-flight pass always
   /// finishes; a pass that has not started yet is dropped. `abort`
   /// interrupts a pass between two batches.
   pub async fn run(
      &self,
      mut rx: mpsc::UnboundedReceiver<()>,
      shutdown: CancellationToken,
      abort: CancellationToken,
   ) {
      let mut last_applied: Option<Digest> = None;

      loop {
         tokio::select! {
            biased;
            () = shutdown.cancelled() => break,
            msg = rx.recv() => {
               if msg.is_none() {
                  break;
               }
               self.set_state(WatcherState::Triggered);
               if !self.coalesce(&mut rx, &shutdown).await {
                  tracing::debug!("shutdown while triggered; pending pass dropped");
                  break;
               }

               self.set_state(WatcherState::Processing);
               let outcome = self.pass(&mut last_applied, &abort).await;
               self.record(outcome);
               self.set_state(WatcherState::Idle);
               self.counters.passes.fetch_add(1, Ordering::AcqRel);
            }
         }
      }

      self.set_state(WatcherState::Idle);
      tracing::debug!("watcher stopped");
   }

   /// Drains triggers until the debounce window passes quietly, the channel
   /// closes, or [`MAX_COALESCED_WINDOWS`] windows have elapsed. Returns
   /// `false` if `shutdown` fired first.
   async fn coalesce(
      &self,
      rx: &mut mpsc::UnboundedReceiver<()>,
      shutdown: &CancellationToken,
   ) -> bool {
      let deadline = time::Instant::now() + self.options.debounce * MAX_COALESCED_WINDOWS;
      loop {
         tokio::select! {
            biased;
            () = shutdown.cancelled() => return false,
            () = time::sleep_until(deadline) => return true,
            msg = time::timeout(self.options.debounce, rx.recv()) => match msg {
               Ok(Some(())) => {},
               Ok(None) | Err(_) => return true,
            },
         }
      }
   }

   /// One processing pass. Returns `None` when the artifact is byte-identical
   /// to the last one applied.
   async fn pass(
      &self,
      last_applied: &mut Option<Digest>,
      abort: &CancellationToken,
   ) -> Result<Option<SyncResult>> {
      let data = SyncEngine::read_artifact(&self.options.artifact).await?;
      let digest = Digest::sum(&data);
      if last_applied.as_ref() == Some(&digest) {
         return Ok(None);
      }

      let result = self.engine.sync_bytes(data, abort, &mut ()).await?;
      *last_applied = Some(digest);
      Ok(Some(result))
   }

   fn record(&self, outcome: Result<Option<SyncResult>>) {
      match outcome {
         Ok(Some(result)) => {
            self.counters.applied.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(applied = result.applied(), "watcher pass complete");
         },
         Ok(None) => {
            self.counters.skipped.fetch_add(1, Ordering::Relaxed);
            tracing::debug!("artifact unchanged; pass skipped");
         },
         Err(e @ Error::ArtifactUnavailable { .. }) => {
            self.counters.failures.fetch_add(1, Ordering::Relaxed);
            tracing::warn!("{e}; waiting for the next change");
         },
         Err(e @ Error::Cancelled { .. }) => {
            self.counters.failures.fetch_add(1, Ordering::Relaxed);
            tracing::info!("{e}");
         },
         Err(e) => {
            self.counters.failures.fetch_add(1, Ordering::Relaxed);
            tracing::error!("sync pass failed: {e}");
         },
      }
   }
}
