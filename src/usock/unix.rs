//! Unix domain socket transport

use std::{
   fs, io,
   os::unix::fs::PermissionsExt,
   path::PathBuf,
   pin::Pin,
   task::{self, Poll},
};

use tokio::{
   io::ReadBuf,
   net::{UnixListener, UnixStream},
};

use super::{SocketError, socket_path_for};
use crate::Result;

pub fn socket_path(index_id: &str) -> PathBuf {
   socket_path_for(index_id, "sock")
}

/// Listening socket of one index daemon. The socket file is removed on drop.
pub struct Listener {
   inner: UnixListener,
   path:  PathBuf,
}

impl Listener {
   /// Binds the daemon socket for `index_id`.
   ///
   /// An existing socket file that still accepts connections belongs to a
   /// live daemon and is left alone; otherwise it is stale and replaced.
   pub async fn bind(index_id: &str) -> Result<Self> {
      let path = socket_path(index_id);

      if let Some(parent) = path.parent() {
         fs::create_dir_all(parent).map_err(SocketError::CreateDir)?;
         let _ = fs::set_permissions(parent, fs::Permissions::from_mode(0o700));
      }

      if path.exists() {
         if Stream::connect(index_id).await.is_ok() {
            return Err(SocketError::AlreadyRunning.into());
         }
         fs::remove_file(&path).map_err(SocketError::RemoveStale)?;
      }

      let inner = UnixListener::bind(&path).map_err(SocketError::Bind)?;
      fs::set_permissions(&path, fs::Permissions::from_mode(0o600)).map_err(SocketError::Bind)?;
      Ok(Self { inner, path })
   }

   pub async fn accept(&self) -> Result<Stream> {
      let (inner, _) = self.inner.accept().await.map_err(SocketError::Accept)?;
      Ok(Stream { inner })
   }

   pub fn local_addr(&self) -> String {
      self.path.display().to_string()
   }
}

impl Drop for Listener {
   fn drop(&mut self) {
      let _ = fs::remove_file(&self.path);
   }
}

#[repr(transparent)]
pub struct Stream {
   inner: UnixStream,
}

impl Stream {
   pub async fn connect(index_id: &str) -> Result<Self> {
      let inner = UnixStream::connect(socket_path(index_id))
         .await
         .map_err(SocketError::Connect)?;
      Ok(Self { inner })
   }
}

impl tokio::io::AsyncRead for Stream {
   fn poll_read(
      mut self: Pin<&mut Self>,
      cx: &mut task::Context<'_>,
      buf: &mut ReadBuf<'_>,
   ) -> Poll<io::Result<()>> {
      Pin::new(&mut self.inner).poll_read(cx, buf)
   }
}

impl tokio::io::AsyncWrite for Stream {
   fn poll_write(
      mut self: Pin<&mut Self>,
      cx: &mut task::Context<'_>,
      buf: &[u8],
   ) -> Poll<io::Result<usize>> {
      Pin::new(&mut self.inner).poll_write(cx, buf)
   }

   fn poll_flush(mut self: Pin<&mut Self>, cx: &mut task::Context<'_>) -> Poll<io::Result<()>> {
      Pin::new(&mut self.inner).poll_flush(cx)
   }

   fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut task::Context<'_>) -> Poll<io::Result<()>> {
      Pin::new(&mut self.inner).poll_shutdown(cx)
   }
}
