//! Remove one file (and its keywords) from the index.

use console::style;

use crate::{
   Result,
   cmd::client::Client,
   config,
   error::Error,
   ipc::{Request, Response},
};

pub async fn execute(path: String) -> Result<()> {
   let mut client = Client::connect(config::get()).await?;
   let Response::Deleted { removed } = client.call(Request::Delete { path: path.clone() }).await?
   else {
      return Err(Error::UnexpectedResponse("delete"));
   };

   if removed {
      println!("{} {}", style("Deleted").green(), path);
   } else {
      println!("{} {}", style("Not indexed:").yellow(), path);
   }
   Ok(())
}
