//! IPC protocol for client-server communication over sockets

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::{
   Result,
   error::{Error, IpcError},
   types::{BatchEntry, FileDescription, FileRecord, IndexDir, IndexStats, Upserted},
   watch::WatcherStatus,
};

pub const PROTOCOL_VERSIONS: &[u32] = &[1];

pub const DEFAULT_MAX_MESSAGE_BYTES: usize = 16 * 1024 * 1024;

pub fn negotiate_protocol(client_versions: &[u32]) -> Option<u32> {
   client_versions
      .iter()
      .copied()
      .filter(|version| PROTOCOL_VERSIONS.contains(version))
      .max()
}

pub fn client_hello() -> Request {
   Request::Hello { protocol_versions: PROTOCOL_VERSIONS.to_vec() }
}

/// Client request messages
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Request {
   Hello {
      protocol_versions: Vec<u32>,
   },
   /// Integrity-checked single-record upsert.
   Insert {
      record:     FileDescription,
      timeout_ms: Option<u64>,
   },
   /// Trusted batch upsert, one transaction, no integrity check.
   InsertBatch {
      records: Vec<FileDescription>,
   },
   Search {
      query:      String,
      limit:      Option<usize>,
      timeout_ms: Option<u64>,
   },
   Get {
      path: String,
   },
   Delete {
      path: String,
   },
   Reset,
   Stats,
   AddIndexDir {
      path:        String,
      whitelisted: bool,
   },
   IndexDirs,
   Status,
   Shutdown,
}

impl Request {
   pub const fn name(&self) -> &'static str {
      match self {
         Self::Hello { .. } => "hello",
         Self::Insert { .. } => "insert",
         Self::InsertBatch { .. } => "insert_batch",
         Self::Search { .. } => "search",
         Self::Get { .. } => "get",
         Self::Delete { .. } => "delete",
         Self::Reset => "reset",
         Self::Stats => "stats",
         Self::AddIndexDir { .. } => "add_index_dir",
         Self::IndexDirs => "index_dirs",
         Self::Status => "status",
         Self::Shutdown => "shutdown",
      }
   }
}

/// Server response messages
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Response {
   Hello {
      protocol_version: u32,
      binary_version:   String,
   },
   Stored(Upserted),
   Batch {
      entries: Vec<BatchEntry>,
   },
   Files {
      files: Vec<FileRecord>,
   },
   File {
      file: Option<FileRecord>,
   },
   Deleted {
      removed: bool,
   },
   Reset {
      removed: u64,
   },
   Stats(IndexStats),
   IndexDir(IndexDir),
   IndexDirs {
      dirs: Vec<IndexDir>,
   },
   Status(ServerStatus),
   Shutdown {
      success: bool,
   },
   Error {
      code:    String,
      message: String,
   },
}

impl Response {
   pub fn from_error(err: &Error) -> Self {
      Self::Error { code: err.code().to_string(), message: err.to_string() }
   }

   /// Turns an error response back into an [`Error::Remote`].
   pub fn into_result(self) -> Result<Self> {
      match self {
         Self::Error { code, message } => Err(Error::Remote { code, message }),
         other => Ok(other),
      }
   }
}

/// Daemon status information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerStatus {
   pub pid:      u32,
   pub database: PathBuf,
   pub artifact: PathBuf,
   pub watcher:  WatcherStatus,
   pub stats:    IndexStats,
}

/// Stack-allocated buffer for socket I/O operations
pub struct SocketBuffer {
   buf: SmallVec<[u8; 2048]>,
}

impl Extend<u8> for &mut SocketBuffer {
   fn extend<I: IntoIterator<Item = u8>>(&mut self, iter: I) {
      self.buf.extend(iter);
   }
}

impl Default for SocketBuffer {
   fn default() -> Self {
      Self::new()
   }
}

impl SocketBuffer {
   pub fn new() -> Self {
      Self { buf: SmallVec::new() }
   }

   #[allow(
      clippy::future_not_send,
      reason = "Generic async function with references - Send bound would be too restrictive for \
                trait"
   )]
   /// Serializes and sends a message with length prefix
   pub async fn send<W, T>(&mut self, writer: &mut W, msg: &T) -> Result<()>
   where
      W: AsyncWrite + Unpin,
      T: Serialize,
   {
      self.buf.clear();
      self.buf.resize(4, 0u8);
      _ = postcard::to_extend(msg, &mut *self).map_err(IpcError::Serialize)?;
      let payload_len = u32::try_from(self.buf.len() - 4)
         .map_err(|_| IpcError::MessageTooLarge(self.buf.len() - 4))?;
      self.buf[..4].copy_from_slice(&payload_len.to_le_bytes());
      writer.write_all(&self.buf).await.map_err(IpcError::Write)?;
      writer.flush().await.map_err(IpcError::Write)?;
      Ok(())
   }

   /// Receives and deserializes a message with length prefix
   pub async fn recv<'de, R, T>(&'de mut self, reader: &mut R) -> Result<T>
   where
      R: AsyncRead + Unpin,
      T: Deserialize<'de>,
   {
      self
         .recv_with_limit(reader, DEFAULT_MAX_MESSAGE_BYTES)
         .await
   }

   /// Like [`SocketBuffer::recv`], rejecting frames larger than `max_len`
   /// before reading their payload.
   pub async fn recv_with_limit<'de, R, T>(
      &'de mut self,
      reader: &mut R,
      max_len: usize,
   ) -> Result<T>
   where
      R: AsyncRead + Unpin,
      T: Deserialize<'de>,
   {
      let mut len_buf = [0u8; 4];
      reader
         .read_exact(&mut len_buf)
         .await
         .map_err(IpcError::Read)?;
      let len = u32::from_le_bytes(len_buf) as usize;

      if len > max_len {
         return Err(IpcError::MessageTooLarge(len).into());
      }

      self.buf.resize(len, 0u8);
      reader
         .read_exact(self.buf.as_mut_slice())
         .await
         .map_err(IpcError::Read)?;
      postcard::from_bytes(&self.buf).map_err(|e| IpcError::Deserialize(e).into())
   }
}
