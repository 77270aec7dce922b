//! Unix domain socket and TCP socket abstractions for IPC
//!
//! Each index database gets its own daemon; sockets, port files and pid files
//! are named after [`index_id`].

use std::{
   fs, io,
   path::{Path, PathBuf},
};

use sha2::{Digest, Sha256};

/// Errors that can occur during socket operations
#[derive(Debug, thiserror::Error)]
pub enum SocketError {
   #[error("server already running")]
   AlreadyRunning,

   #[error("failed to connect: {0}")]
   Connect(#[source] io::Error),

   #[error("failed to bind: {0}")]
   Bind(#[source] io::Error),

   #[error("accept failed: {0}")]
   Accept(#[source] io::Error),

   #[error("failed to create socket directory: {0}")]
   CreateDir(#[source] io::Error),

   #[error("failed to remove stale socket: {0}")]
   RemoveStale(#[source] io::Error),

   #[error("failed to read port file: {0}")]
   ReadPort(#[source] io::Error),

   #[error("invalid port in port file: {0}")]
   InvalidPort(#[source] io::Error),

   #[error("failed to write port file: {0}")]
   WritePort(#[source] io::Error),
}

#[cfg(unix)]
mod unix;

#[cfg(unix)]
pub use unix::*;

#[cfg(not(unix))]
mod tcp;
#[cfg(not(unix))]
pub use tcp::*;

const MAX_SOCKET_PATH_LEN: usize = 100;
const INDEX_HASH_LEN: usize = 12;

fn short_hash(input: &[u8]) -> String {
   let digest = hex::encode(Sha256::digest(input));
   digest[..INDEX_HASH_LEN].to_string()
}

/// Stable daemon name for the index stored at `database`.
pub fn index_id(database: &Path) -> String {
   let canonical = fs::canonicalize(database).unwrap_or_else(|_| database.to_path_buf());
   format!("findex-{}", short_hash(canonical.as_os_str().as_encoded_bytes()))
}

fn socket_dir() -> PathBuf {
   let base_dir = crate::config::socket_dir().clone();
   if base_dir.join("findex-000000000000.sock").to_string_lossy().len() <= MAX_SOCKET_PATH_LEN {
      return base_dir;
   }
   temp_socket_dir()
}

fn temp_socket_dir() -> PathBuf {
   #[cfg(unix)]
   {
      // SAFETY: geteuid has no preconditions and cannot fail.
      let uid = unsafe { libc::geteuid() };
      PathBuf::from(format!("/tmp/findex-{uid}"))
   }

   #[cfg(not(unix))]
   {
      crate::config::socket_dir().clone()
   }
}

pub fn socket_path_for(index_id: &str, ext: &str) -> PathBuf {
   socket_dir().join(format!("{index_id}.{ext}"))
}

pub fn pid_path(index_id: &str) -> PathBuf {
   socket_path_for(index_id, "pid")
}

pub fn write_pid(index_id: &str) {
   let path = pid_path(index_id);
   if let Some(parent) = path.parent() {
      let _ = fs::create_dir_all(parent);
   }
   let _ = fs::write(path, format!("{}", std::process::id()));
}

pub fn read_pid(index_id: &str) -> Option<u32> {
   let text = fs::read_to_string(pid_path(index_id)).ok()?;
   text.trim().parse::<u32>().ok()
}

pub fn remove_pid(index_id: &str) {
   let _ = fs::remove_file(pid_path(index_id));
}
