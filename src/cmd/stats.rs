//! Index row counts.

use console::style;

use crate::{
   Result,
   cmd::client::Client,
   config,
   error::Error,
   ipc::{Request, Response},
};

pub async fn execute(json: bool) -> Result<()> {
   let cfg = config::get();
   let mut client = Client::connect(cfg).await?;
   let Response::Stats(stats) = client.call(Request::Stats).await? else {
      return Err(Error::UnexpectedResponse("stats"));
   };

   if json {
      println!("{}", serde_json::to_string_pretty(&stats)?);
      return Ok(());
   }

   println!("{}", style("Index").bold());
   println!("  database:   {}", style(cfg.effective_database_path().display()).dim());
   println!("  files:      {}", style(stats.files).cyan());
   println!("  keywords:   {}", style(stats.keywords).cyan());
   println!("  index dirs: {}", style(stats.index_dirs).cyan());
   Ok(())
}
