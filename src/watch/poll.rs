//! Polling fallback for filesystems without usable notifications.

use std::{
   path::{Path, PathBuf},
   time::{Duration, SystemTime},
};

use tokio::{sync::mpsc, time};
use tokio_util::sync::CancellationToken;

use super::ChangeSource;
use crate::Result;

/// Observed identity of the artifact; `None` while it does not exist.
type Stamp = Option<(SystemTime, u64)>;

async fn stamp(path: &Path) -> Stamp {
   let metadata = tokio::fs::metadata(path).await.ok()?;
   Some((metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH), metadata.len()))
}

/// Triggers when the artifact's modification time or length changes.
pub struct PollSource {
   interval: Duration,
   stop:     CancellationToken,
}

impl PollSource {
   pub fn new(interval: Duration) -> Self {
      Self { interval: interval.max(Duration::from_millis(1)), stop: CancellationToken::new() }
   }
}

impl ChangeSource for PollSource {
   fn start(&mut self, artifact: &Path, tx: mpsc::UnboundedSender<()>) -> Result<()> {
      self.stop.cancel();
      self.stop = CancellationToken::new();

      let stop = self.stop.clone();
      let artifact: PathBuf = artifact.to_path_buf();
      let interval = self.interval;
      tokio::spawn(async move {
         let mut last = stamp(&artifact).await;
         let mut ticker = time::interval(interval);
         ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
         ticker.tick().await;

         loop {
            tokio::select! {
               () = stop.cancelled() => break,
               _ = ticker.tick() => {
                  let current = stamp(&artifact).await;
                  if current != last {
                     last = current;
                     if tx.send(()).is_err() {
                        break;
                     }
                  }
               }
            }
         }
      });
      Ok(())
   }

   fn stop(&mut self) {
      self.stop.cancel();
   }
}

impl Drop for PollSource {
   fn drop(&mut self) {
      self.stop.cancel();
   }
}
