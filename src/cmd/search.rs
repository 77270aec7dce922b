//! Path search command.

use console::style;

use crate::{
   Result,
   cmd::{client::Client, format_record},
   config,
   error::Error,
   ipc::{Request, Response},
};

pub async fn execute(
   query: String,
   limit: Option<usize>,
   timeout_ms: Option<u64>,
   json: bool,
) -> Result<()> {
   let mut client = Client::connect(config::get()).await?;
   let Response::Files { files } = client
      .call(Request::Search { query, limit, timeout_ms })
      .await?
   else {
      return Err(Error::UnexpectedResponse("search"));
   };

   if json {
      println!("{}", serde_json::to_string_pretty(&files)?);
      return Ok(());
   }

   if files.is_empty() {
      println!("{}", style("No matches").dim());
      return Ok(());
   }
   for file in &files {
      println!("{}", format_record(file, false));
   }
   Ok(())
}
