use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Timestamp layout used by the scanner's artifact and the CLI.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Trims keyword texts, drops empty ones and collapses duplicates, keeping the
/// first occurrence's position.
pub fn normalize_keywords<I, S>(keywords: I) -> Vec<String>
where
   I: IntoIterator<Item = S>,
   S: AsRef<str>,
{
   let mut out: Vec<String> = Vec::new();
   for keyword in keywords {
      let keyword = keyword.as_ref().trim();
      if keyword.is_empty() || out.iter().any(|k| k == keyword) {
         continue;
      }
      out.push(keyword.to_string());
   }
   out
}

/// A file as reported by the scanner or an API client, before it has an
/// identity in the index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDescription {
   pub path:        String,
   pub name:        String,
   pub extension:   String,
   pub created:     NaiveDateTime,
   pub modified:    NaiveDateTime,
   pub size_bytes:  u64,
   pub fingerprint: String,
   pub keywords:    Vec<String>,
}

impl FileDescription {
   /// Replaces the keyword set, normalizing it.
   pub fn with_keywords<I, S>(mut self, keywords: I) -> Self
   where
      I: IntoIterator<Item = S>,
      S: AsRef<str>,
   {
      self.keywords = normalize_keywords(keywords);
      self
   }
}

/// Keyword owned by exactly one [`FileRecord`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordRecord {
   pub id:      Uuid,
   pub keyword: String,
}

/// A file as stored in the index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
   pub id:          Uuid,
   pub path:        String,
   pub name:        String,
   pub extension:   String,
   pub created:     NaiveDateTime,
   pub modified:    NaiveDateTime,
   pub size_bytes:  u64,
   pub fingerprint: String,
   pub keywords:    Vec<KeywordRecord>,
}

impl FileRecord {
   pub fn keyword_texts(&self) -> impl Iterator<Item = &str> {
      self.keywords.iter().map(|k| k.keyword.as_str())
   }
}

/// Whether an upsert created the path's record or overwrote it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpsertOutcome {
   Inserted,
   Updated,
}

impl UpsertOutcome {
   pub const fn as_str(self) -> &'static str {
      match self {
         Self::Inserted => "inserted",
         Self::Updated => "updated",
      }
   }
}

/// Result of one successful upsert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Upserted {
   pub outcome: UpsertOutcome,
   pub record:  FileRecord,
}

/// Per-record outcome of a client batch, in submission order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatchEntry {
   Applied(Upserted),
   Rejected { index: usize, field: String, reason: String },
}

/// Directory registered for the scanner to cover.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDir {
   pub id:          Uuid,
   pub path:        String,
   pub whitelisted: bool,
   pub created_at:  DateTime<Utc>,
}

/// Row counts of the index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexStats {
   pub files:      u64,
   pub keywords:   u64,
   pub index_dirs: u64,
}
