use std::path::PathBuf;

use chrono::NaiveDateTime;
use clap::{Parser, Subcommand};
use findex::{
   Result,
   cmd::{self, insert::InsertArgs},
   config,
   types::TIMESTAMP_FORMAT,
};
use tracing::Level;
use tracing_subscriber::EnvFilter;

fn parse_timestamp(s: &str) -> std::result::Result<NaiveDateTime, String> {
   NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT)
      .map_err(|e| format!("expected YYYY-MM-DD HH:MM:SS: {e}"))
}

/// Command-line arguments for the findex application
#[derive(Parser)]
#[command(name = "findex")]
#[command(about = "Keep a searchable index of scanned files in sync with the scanner's artifact")]
#[command(version)]
struct Cli {
   #[command(subcommand)]
   command: Cmd,
}

#[derive(Subcommand)]
enum DirsCmd {
   #[command(about = "Register a directory (or update its flag)")]
   Add {
      path: PathBuf,

      #[arg(long, help = "Register the directory as excluded instead of whitelisted")]
      exclude: bool,
   },

   #[command(about = "List registered directories")]
   List {
      #[arg(long, help = "JSON output")]
      json: bool,
   },
}

/// Available subcommands for findex
#[derive(Subcommand)]
enum Cmd {
   #[command(about = "Run the daemon: watch the artifact and serve requests")]
   Serve,

   #[command(about = "Apply the artifact to the index once")]
   Import {
      #[arg(help = "Artifact to read (default: configured artifact_path)")]
      artifact: Option<PathBuf>,

      #[arg(long, help = "Records per transaction")]
      batch_size: Option<usize>,

      #[arg(long, help = "JSON output")]
      json: bool,
   },

   #[command(about = "Insert or update one file record")]
   Insert {
      #[arg(help = "File path", required_unless_present = "batch")]
      path: Option<PathBuf>,

      #[arg(long, help = "Display name (default: file name)")]
      name: Option<String>,

      #[arg(long, help = "Extension without the dot (default: from the path)")]
      extension: Option<String>,

      #[arg(long, value_parser = parse_timestamp, help = "Creation time, YYYY-MM-DD HH:MM:SS")]
      created: Option<NaiveDateTime>,

      #[arg(long, value_parser = parse_timestamp, help = "Modification time, YYYY-MM-DD HH:MM:SS")]
      modified: Option<NaiveDateTime>,

      #[arg(long, help = "Size in bytes")]
      size: Option<u64>,

      #[arg(long, help = "Fingerprint (default: SHA-256 of the path)")]
      fingerprint: Option<String>,

      #[arg(short = 'k', long = "keyword", help = "Keyword (repeatable)")]
      keywords: Vec<String>,

      #[arg(long, help = "Request timeout in milliseconds")]
      timeout_ms: Option<u64>,

      #[arg(long, conflicts_with = "path", help = "Submit a JSON array of records as one batch")]
      batch: Option<PathBuf>,

      #[arg(long, help = "JSON output")]
      json: bool,
   },

   #[command(about = "Find files whose path contains QUERY")]
   Search {
      #[arg(help = "Substring to look for (case-sensitive)")]
      query: String,

      #[arg(short = 'm', long, help = "Maximum results")]
      limit: Option<usize>,

      #[arg(long, help = "Request timeout in milliseconds")]
      timeout_ms: Option<u64>,

      #[arg(long, help = "JSON output")]
      json: bool,
   },

   #[command(about = "Show one indexed file")]
   Get {
      path: String,

      #[arg(long, help = "JSON output")]
      json: bool,
   },

   #[command(about = "Remove one file from the index")]
   Delete { path: String },

   #[command(about = "Remove every file from the index")]
   Reset {
      #[arg(long, help = "Confirm the reset")]
      yes: bool,
   },

   #[command(about = "Show index row counts")]
   Stats {
      #[arg(long, help = "JSON output")]
      json: bool,
   },

   #[command(about = "Manage the directories the scanner covers")]
   Dirs {
      #[command(subcommand)]
      command: DirsCmd,
   },

   #[command(about = "Show the daemon's status")]
   Status {
      #[arg(long, help = "JSON output")]
      json: bool,
   },

   #[command(about = "Stop the daemon")]
   Stop,
}

#[tokio::main]
async fn main() {
   tracing_subscriber::fmt()
      .with_env_filter(EnvFilter::from_default_env().add_directive(Level::WARN.into()))
      .init();

   let cli = Cli::parse();
   if let Err(err) = run(cli).await {
      eprintln!("{err}");
      std::process::exit(err.exit_code());
   }
}

async fn run(cli: Cli) -> Result<()> {
   config::get().validate()?;

   match cli.command {
      Cmd::Serve => cmd::serve::execute().await,
      Cmd::Import { artifact, batch_size, json } => {
         cmd::import::execute(artifact, batch_size, json).await
      },
      Cmd::Insert { batch: Some(file), json, .. } => cmd::insert::execute_batch(file, json).await,
      Cmd::Insert {
         path,
         name,
         extension,
         created,
         modified,
         size,
         fingerprint,
         keywords,
         timeout_ms,
         batch: None,
         json,
      } => {
         let args = InsertArgs {
            path: path.unwrap_or_default(),
            name,
            extension,
            created,
            modified,
            size,
            fingerprint,
            keywords,
            timeout_ms,
         };
         cmd::insert::execute(args, json).await
      },
      Cmd::Search { query, limit, timeout_ms, json } => {
         cmd::search::execute(query, limit, timeout_ms, json).await
      },
      Cmd::Get { path, json } => cmd::get::execute(path, json).await,
      Cmd::Delete { path } => cmd::delete::execute(path).await,
      Cmd::Reset { yes } => cmd::reset::execute(yes).await,
      Cmd::Stats { json } => cmd::stats::execute(json).await,
      Cmd::Dirs { command: DirsCmd::Add { path, exclude } } => cmd::dirs::add(path, exclude).await,
      Cmd::Dirs { command: DirsCmd::List { json } } => cmd::dirs::list(json).await,
      Cmd::Status { json } => cmd::status::execute(json).await,
      Cmd::Stop => cmd::stop::execute().await,
   }
}
