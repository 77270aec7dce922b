//! Registry of directories the scanner covers.

use std::path::{self, PathBuf};

use console::style;

use crate::{
   Result,
   cmd::client::Client,
   config,
   error::Error,
   ipc::{Request, Response},
};

pub async fn add(path: PathBuf, excluded: bool) -> Result<()> {
   let path = path::absolute(&path)?.to_string_lossy().into_owned();
   let mut client = Client::connect(config::get()).await?;
   let Response::IndexDir(dir) = client
      .call(Request::AddIndexDir { path, whitelisted: !excluded })
      .await?
   else {
      return Err(Error::UnexpectedResponse("add_index_dir"));
   };

   let flag = if dir.whitelisted { "whitelisted" } else { "excluded" };
   println!("{} {} {}", style("Registered").green(), dir.path, style(format!("({flag})")).dim());
   Ok(())
}

pub async fn list(json: bool) -> Result<()> {
   let mut client = Client::connect(config::get()).await?;
   let Response::IndexDirs { dirs } = client.call(Request::IndexDirs).await? else {
      return Err(Error::UnexpectedResponse("index_dirs"));
   };

   if json {
      println!("{}", serde_json::to_string_pretty(&dirs)?);
      return Ok(());
   }
   if dirs.is_empty() {
      println!("{}", style("No directories registered").dim());
      return Ok(());
   }
   for dir in &dirs {
      let marker = if dir.whitelisted { style("●").green() } else { style("●").red() };
      println!("  {marker} {} {}", dir.path, style(dir.created_at.format("%Y-%m-%d")).dim());
   }
   Ok(())
}
