//! Loopback TCP transport for platforms without Unix sockets.
//!
//! The daemon binds an ephemeral port and publishes it in a port file named
//! after the index id.

use std::{
   fs, io,
   path::PathBuf,
   pin::Pin,
   task::{self, Poll},
};

use tokio::{
   io::ReadBuf,
   net::{TcpListener, TcpStream},
};

use super::{SocketError, socket_path_for};
use crate::Result;

pub fn socket_path(index_id: &str) -> PathBuf {
   socket_path_for(index_id, "port")
}

fn read_port(index_id: &str) -> Result<u16> {
   let text = fs::read_to_string(socket_path(index_id)).map_err(SocketError::ReadPort)?;
   let port = text
      .trim()
      .parse()
      .map_err(|e: std::num::ParseIntError| SocketError::InvalidPort(io::Error::other(e)))?;
   Ok(port)
}

pub struct Listener {
   inner:     TcpListener,
   port_file: PathBuf,
   port:      u16,
}

impl Listener {
   pub async fn bind(index_id: &str) -> Result<Self> {
      let port_file = socket_path(index_id);

      if let Some(parent) = port_file.parent() {
         fs::create_dir_all(parent).map_err(SocketError::CreateDir)?;
      }

      if port_file.exists() {
         if Stream::connect(index_id).await.is_ok() {
            return Err(SocketError::AlreadyRunning.into());
         }
         fs::remove_file(&port_file).map_err(SocketError::RemoveStale)?;
      }

      let inner = TcpListener::bind("127.0.0.1:0")
         .await
         .map_err(SocketError::Bind)?;
      let port = inner.local_addr().map_err(SocketError::Bind)?.port();
      fs::write(&port_file, port.to_string()).map_err(SocketError::WritePort)?;

      Ok(Self { inner, port_file, port })
   }

   pub async fn accept(&self) -> Result<Stream> {
      let (inner, _) = self.inner.accept().await.map_err(SocketError::Accept)?;
      Ok(Stream { inner })
   }

   pub fn local_addr(&self) -> String {
      format!("127.0.0.1:{}", self.port)
   }
}

impl Drop for Listener {
   fn drop(&mut self) {
      let _ = fs::remove_file(&self.port_file);
   }
}

#[repr(transparent)]
pub struct Stream {
   inner: TcpStream,
}

impl Stream {
   pub async fn connect(index_id: &str) -> Result<Self> {
      let port = read_port(index_id)?;
      let inner = TcpStream::connect(("127.0.0.1", port))
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
