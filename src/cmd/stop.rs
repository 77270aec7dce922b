//! Stop server command.
//!
//! Asks the daemon for the configured database to shut down, falling back to
//! a signal when it does not answer.

use console::style;

use crate::{
   Result,
   cmd::client::{RPC_TIMEOUT, Remote},
   config,
   ipc::{Request, Response},
   usock,
};

fn looks_like_findex_serve(pid: u32) -> bool {
   let Ok(bytes) = std::fs::read(format!("/proc/{pid}/cmdline")) else {
      return false;
   };
   let cmdline = String::from_utf8_lossy(&bytes);
   cmdline.contains("findex") && cmdline.contains("serve")
}

fn force_kill_if_possible(index_id: &str) -> bool {
   let Some(pid) = usock::read_pid(index_id) else {
      return false;
   };
   if !looks_like_findex_serve(pid) {
      return false;
   }

   #[cfg(unix)]
   {
      std::process::Command::new("kill")
         .arg("-TERM")
         .arg(pid.to_string())
         .status()
         .is_ok_and(|s| s.success())
   }

   #[cfg(not(unix))]
   {
      false
   }
}

fn clean_up(index_id: &str, message: &str) {
   let _ = std::fs::remove_file(usock::socket_path(index_id));
   usock::remove_pid(index_id);
   println!("{}", style(message).yellow());
}

pub async fn execute() -> Result<()> {
   let index_id = usock::index_id(&config::get().effective_database_path());

   if !usock::socket_path(&index_id).exists() {
      println!("{}", style("No server running for this index").yellow());
      return Ok(());
   }

   let Ok(Some(mut remote)) = Remote::connect(&index_id, RPC_TIMEOUT).await else {
      _ = force_kill_if_possible(&index_id);
      clean_up(&index_id, "Removed stale socket");
      return Ok(());
   };

   match remote.call(&Request::Shutdown).await {
      Ok(Response::Shutdown { success: true }) => {
         println!("{}", style("Server stopped").green());
      },
      Ok(_) => println!("{}", style("Unexpected response from server").yellow()),
      Err(_) => {
         _ = force_kill_if_possible(&index_id);
         clean_up(&index_id, "Server unresponsive; removed socket");
      },
   }
   Ok(())
}
