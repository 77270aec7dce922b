//! OS filesystem notifications for the artifact.

use std::{ffi::OsString, fs, path::Path, time::Duration};

use notify_debouncer_mini::{
   DebounceEventResult, Debouncer, new_debouncer,
   notify::{RecommendedWatcher, RecursiveMode, Watcher as _},
};
use tokio::sync::mpsc;

use super::ChangeSource;
use crate::{Result, error::Error};

/// Watches the artifact's parent directory (non-recursively) and triggers on
/// events that name the artifact.
///
/// Scanners usually replace the artifact by rename, which only shows up as an
/// event on the directory.
pub struct NotifySource {
   window:    Duration,
   debouncer: Option<Debouncer<RecommendedWatcher>>,
}

impl NotifySource {
   pub const fn new(window: Duration) -> Self {
      Self { window, debouncer: None }
   }
}

fn is_artifact(event_path: &Path, file_name: &OsString) -> bool {
   event_path.file_name() == Some(file_name.as_os_str())
}

impl ChangeSource for NotifySource {
   fn start(&mut self, artifact: &Path, tx: mpsc::UnboundedSender<()>) -> Result<()> {
      let Some(file_name) = artifact.file_name().map(ToOwned::to_owned) else {
         return Err(Error::Server {
            op:     "watch",
            reason: format!("artifact path {} has no file name", artifact.display()),
         });
      };
      let dir = artifact
         .parent()
         .filter(|p| !p.as_os_str().is_empty())
         .unwrap_or_else(|| Path::new("."));
      fs::create_dir_all(dir)?;

      let mut debouncer = new_debouncer(self.window, move |result: DebounceEventResult| {
         match result {
            Ok(events) => {
               if events.iter().any(|e| is_artifact(&e.path, &file_name)) {
                  let _ = tx.send(());
               }
            },
            Err(e) => tracing::warn!("artifact watch error: {e}"),
         }
      })?;
      debouncer
         .watcher()
         .watch(dir, RecursiveMode::NonRecursive)?;

      self.debouncer = Some(debouncer);
      Ok(())
   }

   fn stop(&mut self) {
      self.debouncer = None;
   }
}

#[cfg(test)]
mod tests {
   use super::*;

   #[test]
   fn matches_only_the_artifact_name() {
      let name = OsString::from("cache.csv");
      assert!(is_artifact(Path::new("/var/tmp/cache.csv"), &name));
      assert!(is_artifact(Path::new("/private/var/tmp/cache.csv"), &name));
      assert!(!is_artifact(Path::new("/var/tmp/cache.csv.tmp"), &name));
      assert!(!is_artifact(Path::new("/var/tmp"), &name));
   }
}
