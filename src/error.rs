use std::{io, path::PathBuf};

use thiserror::Error;

use crate::{record::RowError, store::StoreError, usock::SocketError};

/// Main error type for findex.
///
/// The first five variants form the taxonomy that crosses the API boundary;
/// their [`Error::code`] is what travels on the wire. The rest are ambient
/// failures of the process itself (I/O, configuration, transport).
#[derive(Debug, Error)]
pub enum Error {
   /// A row of the artifact (or a submitted record) is missing a field or has
   /// an unparseable one.
   #[error("malformed record at row {row}: {field}: {reason}")]
   MalformedRecord { row: usize, field: String, reason: String },

   /// The submitted fingerprint does not match the fingerprint computed from
   /// the record's path.
   #[error("integrity mismatch for {path}")]
   IntegrityMismatch { path: String },

   /// The index database rejected or failed an operation. The enclosing
   /// transaction has been rolled back.
   #[error("persistence error: {0}")]
   Persistence(#[from] StoreError),

   /// The artifact could not be read.
   #[error("artifact unavailable at {}: {source}", .path.display())]
   ArtifactUnavailable {
      path:   PathBuf,
      #[source]
      source: io::Error,
   },

   /// The operation was abandoned (timeout or abort) without partial effect.
   #[error("{op} cancelled")]
   Cancelled { op: &'static str },

   /// An error reported by a running daemon, carried by its wire code.
   #[error("{message}")]
   Remote { code: String, message: String },

   /// I/O error occurred during file or network operations.
   #[error("io error: {0}")]
   Io(#[from] io::Error),

   /// Configuration-related error occurred.
   #[error("config error: {0}")]
   Config(#[from] ConfigError),

   /// JSON serialization or deserialization error occurred.
   #[error("json error: {0}")]
   Json(#[from] serde_json::Error),

   /// Postcard serialization or deserialization error occurred.
   #[error("postcard error: {0}")]
   Postcard(#[from] postcard::Error),

   /// Inter-process communication error occurred.
   #[error("ipc error: {0}")]
   Ipc(#[from] IpcError),

   /// Socket communication error occurred.
   #[error("socket error: {0}")]
   Socket(#[from] SocketError),

   /// The artifact's CSV header could not be read.
   #[error("csv error: {0}")]
   Csv(#[from] csv::Error),

   /// Filesystem notification backend failed.
   #[error("watch error: {0}")]
   Notify(#[from] notify_debouncer_mini::notify::Error),

   /// Server error occurred during a specific operation.
   #[error("server error during {op}: {reason}")]
   Server { op: &'static str, reason: String },

   /// Unexpected response received from the server during an operation.
   #[error("unexpected response from server during {0}")]
   UnexpectedResponse(&'static str),
}

impl Error {
   /// Stable name of the error kind, used as the IPC error code.
   pub fn code(&self) -> &str {
      match self {
         Self::MalformedRecord { .. } => "malformed_record",
         Self::IntegrityMismatch { .. } => "integrity_mismatch",
         Self::Persistence(_) => "persistence",
         Self::ArtifactUnavailable { .. } => "artifact_unavailable",
         Self::Cancelled { .. } => "cancelled",
         Self::Remote { code, .. } => code,
         Self::Config(_) => "config",
         _ => "internal",
      }
   }

   pub fn exit_code(&self) -> i32 {
      match self.code() {
         "malformed_record" => 3,
         "integrity_mismatch" => 4,
         "persistence" => 5,
         "artifact_unavailable" => 6,
         "config" => 7,
         "cancelled" => 12,
         _ => 1,
      }
   }
}

impl From<RowError> for Error {
   fn from(e: RowError) -> Self {
      Self::MalformedRecord { row: e.row, field: e.field, reason: e.reason }
   }
}

/// Errors that can occur during inter-process communication (IPC).
///
/// These errors are related to message serialization, deserialization, and I/O
/// operations when communicating between processes.
#[derive(Debug, Error)]
pub enum IpcError {
   /// The message size exceeds the maximum allowed size.
   #[error("message too large: {0} bytes")]
   MessageTooLarge(usize),

   /// Failed to serialize a message for IPC transmission.
   #[error("failed to serialize: {0}")]
   Serialize(#[source] postcard::Error),

   /// Failed to deserialize a message received via IPC.
   #[error("failed to deserialize: {0}")]
   Deserialize(#[source] postcard::Error),

   /// Failed to read data from the IPC channel.
   #[error("failed to read: {0}")]
   Read(#[source] io::Error),

   /// Failed to write data to the IPC channel.
   #[error("failed to write: {0}")]
   Write(#[source] io::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
   /// Failed to retrieve user directories (e.g., home directory).
   #[error("failed to get user directories")]
   GetUserDirectories,

   /// A configured value is out of its accepted range.
   #[error("invalid config: {0}")]
   Invalid(String),
}

/// Standard result type using [`enum@Error`] as the default error type
pub type Result<T, E = Error> = std::result::Result<T, E>;
