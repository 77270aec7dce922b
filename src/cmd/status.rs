//! Daemon status command.

use console::style;

use crate::{
   Result,
   cmd::client::{RPC_TIMEOUT, Remote},
   config,
   error::Error,
   ipc::{Request, Response},
   usock,
};

pub async fn execute(json: bool) -> Result<()> {
   let cfg = config::get();
   let database = cfg.effective_database_path();
   let index_id = usock::index_id(&database);

   let Some(mut remote) = Remote::connect(&index_id, RPC_TIMEOUT).await? else {
      if json {
         println!("null");
      } else {
         println!("{}", style("No server running").dim());
         println!("  database: {}", style(database.display()).dim());
      }
      return Ok(());
   };

   let Response::Status(status) = remote.call(&Request::Status).await? else {
      return Err(Error::UnexpectedResponse("status"));
   };

   if json {
      println!("{}", serde_json::to_string_pretty(&status)?);
      return Ok(());
   }

   let watcher = status.watcher;
   println!("  {} {} {}", style("●").green(), index_id, style(format!("(pid {})", status.pid)).dim());
   println!("  database: {}", style(status.database.display()).dim());
   println!("  artifact: {}", style(status.artifact.display()).dim());
   println!(
      "  watcher:  {} (passes {}, applied {}, unchanged {}, failed {})",
      style(watcher.state.as_str()).cyan(),
      watcher.passes,
      watcher.applied,
      watcher.skipped,
      watcher.failures
   );
   println!(
      "  index:    {} files, {} keywords, {} dirs",
      status.stats.files, status.stats.keywords, status.stats.index_dirs
   );
   Ok(())
}
