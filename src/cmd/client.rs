//! Daemon connection with in-process fallback.
//!
//! Commands talk to the daemon that owns the configured database when one is
//! running; otherwise they open the database themselves and run the same
//! request handler in-process.

use std::{sync::Arc, time::Duration};

use tokio::time;

use crate::{
   Result,
   cmd::serve,
   config::Config,
   error::Error,
   ipc::{self, Request, Response, SocketBuffer},
   service::{IndexService, ServiceOptions},
   store::{SqliteStore, StoreOptions},
   usock,
};

/// Timeout when establishing a socket connection.
const CONNECT_TIMEOUT: Duration = Duration::from_millis(500);
/// Timeout for control-plane RPCs (hello/status/shutdown).
pub const RPC_TIMEOUT: Duration = Duration::from_millis(2000);
/// Slack on top of the request timeout before a daemon is deemed hung.
const RESPONSE_GRACE: Duration = Duration::from_secs(5);

/// Opens the configured database in-process.
pub async fn open_service(cfg: &Config) -> Result<IndexService> {
   let store = SqliteStore::open(&StoreOptions::from_config(cfg)).await?;
   Ok(IndexService::new(Arc::new(store), ServiceOptions::from_config(cfg)))
}

/// Connection to a running daemon, past the protocol handshake.
pub struct Remote {
   stream:  usock::Stream,
   buffer:  SocketBuffer,
   timeout: Duration,
}

impl Remote {
   /// Connects to the daemon for `index_id`. Returns `None` when no daemon
   /// accepts the connection or it stops responding during the handshake.
   pub async fn connect(index_id: &str, timeout: Duration) -> Result<Option<Self>> {
      let stream = match time::timeout(CONNECT_TIMEOUT, usock::Stream::connect(index_id)).await {
         Ok(Ok(s)) => s,
         Ok(Err(_)) | Err(_) => return Ok(None),
      };

      let mut remote = Self { stream, buffer: SocketBuffer::new(), timeout: RPC_TIMEOUT };
      match remote.call(&ipc::client_hello()).await {
         Ok(Response::Hello { protocol_version, binary_version }) => {
            tracing::debug!(protocol_version, %binary_version, "connected to daemon");
            remote.timeout = timeout;
            Ok(Some(remote))
         },
         Ok(_) => Err(Error::UnexpectedResponse("hello")),
         Err(e @ Error::Remote { .. }) => Err(e),
         Err(e) => {
            tracing::warn!("daemon unresponsive during handshake: {e}");
            Ok(None)
         },
      }
   }

   /// Sends `request` and waits for its response. Error responses come back
   /// as [`Error::Remote`].
   pub async fn call(&mut self, request: &Request) -> Result<Response> {
      let op = request.name();
      let timeout = self.timeout;
      let exchange = async {
         self.buffer.send(&mut self.stream, request).await?;
         self.buffer.recv::<_, Response>(&mut self.stream).await
      };
      let response = time::timeout(timeout, exchange).await.map_err(|_| Error::Server {
         op,
         reason: "daemon did not respond in time".to_string(),
      })??;
      response.into_result()
   }
}

pub enum Client {
   Remote(Remote),
   Local(IndexService),
}

impl Client {
   pub async fn connect(cfg: &Config) -> Result<Self> {
      let index_id = usock::index_id(&cfg.effective_database_path());
      let timeout = cfg.request_timeout() + RESPONSE_GRACE;
      if let Some(remote) = Remote::connect(&index_id, timeout).await? {
         return Ok(Self::Remote(remote));
      }
      tracing::debug!("no daemon for {index_id}; opening the index in-process");
      Ok(Self::Local(open_service(cfg).await?))
   }

   pub const fn is_remote(&self) -> bool {
      matches!(self, Self::Remote(_))
   }

   pub async fn call(&mut self, request: Request) -> Result<Response> {
      match self {
         Self::Remote(remote) => remote.call(&request).await,
         Self::Local(service) => serve::dispatch(service, request).await.into_result(),
      }
   }
}
