//! Show one indexed file.

use console::style;

use crate::{
   Result,
   cmd::{client::Client, format_record},
   config,
   error::Error,
   ipc::{Request, Response},
};

pub async fn execute(path: String, json: bool) -> Result<()> {
   let mut client = Client::connect(config::get()).await?;
   let Response::File { file } = client.call(Request::Get { path: path.clone() }).await? else {
      return Err(Error::UnexpectedResponse("get"));
   };

   match file {
      Some(file) if json => println!("{}", serde_json::to_string_pretty(&file)?),
      Some(file) => println!("{}", format_record(&file, true)),
      None => {
         println!("{} {}", style("Not indexed:").yellow(), path);
      },
   }
   Ok(())
}
