//! Insert command.
//!
//! Single records go through the integrity-checked insert; `--batch` submits a
//! JSON array of records as one trusted batch.

use std::{
   fs,
   path::{self, Path, PathBuf},
};

use chrono::{DateTime, Local, NaiveDateTime};
use console::style;

use crate::{
   Result,
   cmd::client::Client,
   config,
   error::Error,
   integrity,
   ipc::{Request, Response},
   types::{BatchEntry, FileDescription},
};

/// Record fields given on the command line. Anything omitted is taken from
/// the file's metadata when the file exists.
#[derive(Debug, Default)]
pub struct InsertArgs {
   pub path:        PathBuf,
   pub name:        Option<String>,
   pub extension:   Option<String>,
   pub created:     Option<NaiveDateTime>,
   pub modified:    Option<NaiveDateTime>,
   pub size:        Option<u64>,
   pub fingerprint: Option<String>,
   pub keywords:    Vec<String>,
   pub timeout_ms:  Option<u64>,
}

fn local_time(time: std::io::Result<std::time::SystemTime>) -> Option<NaiveDateTime> {
   time.ok().map(|t| DateTime::<Local>::from(t).naive_local())
}

fn missing(field: &str) -> Error {
   Error::MalformedRecord {
      row:    1,
      field:  field.to_string(),
      reason: "not given and the file does not exist".to_string(),
   }
}

/// Builds the record to submit, filling gaps from the filesystem.
pub fn describe(args: InsertArgs) -> Result<FileDescription> {
   let path = path::absolute(&args.path)?;
   let path_str = path
      .to_str()
      .ok_or_else(|| Error::MalformedRecord {
         row:    1,
         field:  "path".to_string(),
         reason: "not valid UTF-8".to_string(),
      })?
      .to_string();
   let meta = fs::metadata(&path).ok();

   let name = args
      .name
      .or_else(|| Some(path.file_name()?.to_string_lossy().into_owned()))
      .ok_or_else(|| missing("name"))?;
   let extension = args.extension.unwrap_or_else(|| extension_of(&path));
   let modified = args
      .modified
      .or_else(|| local_time(meta.as_ref()?.modified()))
      .ok_or_else(|| missing("modified"))?;
   let created = args
      .created
      .or_else(|| local_time(meta.as_ref()?.created()))
      .unwrap_or(modified);
   let size_bytes = args
      .size
      .or_else(|| meta.as_ref().map(fs::Metadata::len))
      .ok_or_else(|| missing("size"))?;
   let fingerprint = args
      .fingerprint
      .unwrap_or_else(|| integrity::path_fingerprint(&path_str));

   Ok(FileDescription {
      path: path_str,
      name,
      extension,
      created,
      modified,
      size_bytes,
      fingerprint,
      keywords: Vec::new(),
   }
   .with_keywords(&args.keywords))
}

fn extension_of(path: &Path) -> String {
   path
      .extension()
      .map(|ext| ext.to_string_lossy().into_owned())
      .unwrap_or_default()
}

pub async fn execute(args: InsertArgs, json: bool) -> Result<()> {
   let timeout_ms = args.timeout_ms;
   let record = describe(args)?;
   let mut client = Client::connect(config::get()).await?;

   let Response::Stored(upserted) = client.call(Request::Insert { record, timeout_ms }).await?
   else {
      return Err(Error::UnexpectedResponse("insert"));
   };

   if json {
      println!("{}", serde_json::to_string_pretty(&upserted)?);
   } else {
      println!(
         "{} {}",
         style(upserted.outcome.as_str()).green().bold(),
         style(&upserted.record.path).cyan()
      );
   }
   Ok(())
}

pub async fn execute_batch(file: PathBuf, json: bool) -> Result<()> {
   let records: Vec<FileDescription> = serde_json::from_str(&fs::read_to_string(&file)?)?;

   let mut client = Client::connect(config::get()).await?;
   let Response::Batch { entries } = client.call(Request::InsertBatch { records }).await? else {
      return Err(Error::UnexpectedResponse("insert_batch"));
   };

   if json {
      println!("{}", serde_json::to_string_pretty(&entries)?);
      return Ok(());
   }

   let mut applied = 0usize;
   for entry in &entries {
      match entry {
         BatchEntry::Applied(_) => applied += 1,
         BatchEntry::Rejected { index, field, reason } => {
            println!("  {} record {index}: {field}: {reason}", style("rejected").yellow());
         },
      }
   }
   println!(
      "{} {applied} of {} records",
      style("Applied").green().bold(),
      entries.len()
   );
   Ok(())
}
