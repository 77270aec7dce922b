//! Empty the index.

use console::style;

use crate::{
   Result,
   cmd::client::Client,
   config,
   error::Error,
   ipc::{Request, Response},
};

pub async fn execute(yes: bool) -> Result<()> {
   if !yes {
      println!("{}", style("Refusing to reset the index without --yes").yellow());
      return Ok(());
   }

   let mut client = Client::connect(config::get()).await?;
   let Response::Reset { removed } = client.call(Request::Reset).await? else {
      return Err(Error::UnexpectedResponse("reset"));
   };
   println!("{} {removed} files", style("Removed").green());
   Ok(())
}
