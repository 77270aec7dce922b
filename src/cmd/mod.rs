//! CLI command implementations for findex.
//!
//! Each module corresponds to a subcommand. Index commands go through
//! [`client::Client`], which prefers a running daemon.

pub mod client;
pub mod delete;
pub mod dirs;
pub mod get;
pub mod import;
pub mod insert;
pub mod reset;
pub mod search;
pub mod serve;
pub mod stats;
pub mod status;
pub mod stop;

use std::fmt::Write as _;

use console::style;

use crate::types::FileRecord;

/// Human-readable rendering of one record, shared by `get` and `search`.
pub(crate) fn format_record(file: &FileRecord, detailed: bool) -> String {
   let mut out = style(&file.path).green().to_string();
   if detailed {
      let _ = write!(
         out,
         "\n  id:          {}\n  name:        {}\n  extension:   {}\n  created:     {}\n  modified:    \
          {}\n  size:        {} bytes\n  fingerprint: {}",
         file.id,
         file.name,
         file.extension,
         file.created,
         file.modified,
         file.size_bytes,
         file.fingerprint,
      );
   } else {
      let _ = write!(out, " {}", style(format!("({} bytes)", file.size_bytes)).dim());
   }
   let keywords: Vec<&str> = file.keyword_texts().collect();
   if !keywords.is_empty() {
      let _ = write!(out, "\n  keywords:    {}", style(keywords.join(", ")).cyan());
   }
   out
}
