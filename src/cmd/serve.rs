//! Long-running daemon server command.
//!
//! Owns the index for one database: answers IPC requests and runs the change
//! watcher over the scanner's artifact until stopped.

use std::{path::PathBuf, sync::Arc, time::Duration};

use console::style;
use tokio::{
   io::{AsyncRead, AsyncWrite},
   signal,
};
use tokio_util::sync::CancellationToken;

use crate::{
   Result, config,
   error::{Error, IpcError},
   ipc::{self, Request, Response, ServerStatus, SocketBuffer},
   service::{IndexService, ServiceOptions},
   store::{SqliteStore, Store, StoreOptions},
   sync::SyncEngine,
   usock::{self, SocketError},
   watch::{self, ChangeWatcher, WatchOptions},
};

struct PidFileGuard {
   index_id: String,
}

impl Drop for PidFileGuard {
   fn drop(&mut self) {
      usock::remove_pid(&self.index_id);
   }
}

/// Request handler shared by every client connection of a daemon.
pub struct Server {
   service:           IndexService,
   watcher:           Arc<ChangeWatcher>,
   database:          PathBuf,
   shutdown:          CancellationToken,
   max_message_bytes: usize,
}

impl Server {
   pub fn new(
      service: IndexService,
      watcher: Arc<ChangeWatcher>,
      database: PathBuf,
      shutdown: CancellationToken,
   ) -> Self {
      Self {
         service,
         watcher,
         database,
         shutdown,
         max_message_bytes: ipc::DEFAULT_MAX_MESSAGE_BYTES,
      }
   }

   #[must_use]
   pub fn with_max_message_bytes(mut self, max_message_bytes: usize) -> Self {
      self.max_message_bytes = max_message_bytes;
      self
   }

   /// Serves requests from one connection until the client hangs up, sends
   /// an unreadable frame, or asks the daemon to shut down.
   pub async fn handle_client<S>(&self, mut stream: S)
   where
      S: AsyncRead + AsyncWrite + Unpin,
   {
      let mut buffer = SocketBuffer::new();

      loop {
         let request: Request = match buffer
            .recv_with_limit(&mut stream, self.max_message_bytes)
            .await
         {
            Ok(req) => req,
            Err(Error::Ipc(IpcError::Read(_))) => break,
            Err(e) => {
               tracing::debug!("rejecting client frame: {e}");
               let _ = buffer.send(&mut stream, &Response::from_error(&e)).await;
               break;
            },
         };

         let op = request.name();
         let (response, shutting_down) = self.respond(request).await;
         if let Response::Error { code, message } = &response {
            tracing::debug!(op, code = code.as_str(), "request failed: {message}");
         }

         if let Err(e) = buffer.send(&mut stream, &response).await {
            tracing::debug!("client write error: {e}");
            break;
         }

         if shutting_down {
            self.shutdown.cancel();
            break;
         }
      }
   }

   async fn respond(&self, request: Request) -> (Response, bool) {
      match request {
         Request::Hello { protocol_versions } => {
            let response = match ipc::negotiate_protocol(&protocol_versions) {
               Some(protocol_version) => Response::Hello {
                  protocol_version,
                  binary_version: env!("CARGO_PKG_VERSION").to_string(),
               },
               None => Response::Error {
                  code:    "unsupported_protocol".to_string(),
                  message: format!(
                     "no common protocol version (client {protocol_versions:?}, server {:?})",
                     ipc::PROTOCOL_VERSIONS
                  ),
               },
            };
            (response, false)
         },
         Request::Status => {
            let response = self
               .status()
               .await
               .map_or_else(|e| Response::from_error(&e), Response::Status);
            (response, false)
         },
         Request::Shutdown => (Response::Shutdown { success: true }, true),
         other => (dispatch(&self.service, other).await, false),
      }
   }

   async fn status(&self) -> Result<ServerStatus> {
      Ok(ServerStatus {
         pid:      std::process::id(),
         database: self.database.clone(),
         artifact: self.watcher.artifact().to_path_buf(),
         watcher:  self.watcher.status(),
         stats:    self.service.stats().await?,
      })
   }
}

/// Runs an index request against `service`, folding failures into
/// [`Response::Error`].
///
/// Daemon-only requests (`Hello`, `Status`, `Shutdown`) are answered with an
/// error.
pub async fn dispatch(service: &IndexService, request: Request) -> Response {
   let op = request.name();
   let result = match request {
      Request::Insert { record, timeout_ms } => service
         .insert(record, timeout_ms.map(Duration::from_millis))
         .await
         .map(Response::Stored),
      Request::InsertBatch { records } => service
         .insert_batch(records)
         .await
         .map(|entries| Response::Batch { entries }),
      Request::Search { query, limit, timeout_ms } => service
         .search(&query, limit, timeout_ms.map(Duration::from_millis))
         .await
         .map(|files| Response::Files { files }),
      Request::Get { path } => service.get(&path).await.map(|file| Response::File { file }),
      Request::Delete { path } => service
         .delete(&path)
         .await
         .map(|removed| Response::Deleted { removed }),
      Request::Reset => service.reset().await.map(|removed| Response::Reset { removed }),
      Request::Stats => service.stats().await.map(Response::Stats),
      Request::AddIndexDir { path, whitelisted } => service
         .add_index_dir(&path, whitelisted)
         .await
         .map(Response::IndexDir),
      Request::IndexDirs => service.index_dirs().await.map(|dirs| Response::IndexDirs { dirs }),
      Request::Hello { .. } | Request::Status | Request::Shutdown => {
         Err(Error::Server { op, reason: "requires a running daemon".to_string() })
      },
   };
   result.unwrap_or_else(|e| Response::from_error(&e))
}

/// Executes the serve command, starting a long-running daemon server.
pub async fn execute() -> Result<()> {
   let cfg = config::get();
   let database = cfg.effective_database_path();
   let index_id = usock::index_id(&database);

   let listener = match usock::Listener::bind(&index_id).await {
      Ok(l) => l,
      Err(Error::Socket(SocketError::AlreadyRunning)) => {
         println!("{}", style("Server already running").yellow());
         return Ok(());
      },
      Err(e) => return Err(e),
   };

   usock::write_pid(&index_id);
   let _pid_guard = PidFileGuard { index_id: index_id.clone() };

   let store: Arc<dyn Store> = Arc::new(SqliteStore::open(&StoreOptions::from_config(cfg)).await?);
   let service = IndexService::new(Arc::clone(&store), ServiceOptions::from_config(cfg));
   let options = WatchOptions::from_config(cfg);
   let watcher = Arc::new(ChangeWatcher::new(
      SyncEngine::new(store, cfg.sync_batch_size),
      options.clone(),
   ));

   println!("{}", style("Starting findex server...").green().bold());
   println!("Listening: {}", style(listener.local_addr()).cyan());
   println!("Database: {}", style(database.display()).dim());
   println!("Artifact: {}", style(options.artifact.display()).dim());

   let shutdown = CancellationToken::new();
   let abort = CancellationToken::new();

   let watch_handle = {
      let watcher = Arc::clone(&watcher);
      let source = watch::source_for(cfg.change_source, &options);
      let (shutdown, abort) = (shutdown.clone(), abort.clone());
      tokio::spawn(async move {
         if let Err(e) = watcher.run_with_source(source, shutdown, abort).await {
            tracing::error!("change watcher failed to start: {e}");
         }
      })
   };

   let server = Arc::new(
      Server::new(service, watcher, database, shutdown.clone())
         .with_max_message_bytes(cfg.max_message_bytes),
   );

   let accept_shutdown = shutdown.clone();
   let accept_handle = tokio::spawn(async move {
      loop {
         tokio::select! {
            () = accept_shutdown.cancelled() => break,
            result = listener.accept() => {
               match result {
                  Ok(stream) => {
                     let client_server = Arc::clone(&server);
                     tokio::spawn(async move { client_server.handle_client(stream).await });
                  },
                  Err(e) => tracing::error!("accept error: {e}"),
               }
            }
         }
      }
   });

   println!("\n{}", style("Server listening").green());
   println!("{}", style("Press Ctrl+C to stop").dim());

   tokio::select! {
      _ = signal::ctrl_c() => {
         println!("\n{}", style("Shutting down...").yellow());
         shutdown.cancel();
      }
      () = shutdown.cancelled() => {}
   }

   // The watcher finishes its current pass; a second interrupt cuts it short
   // at the next batch boundary.
   let abort_on_signal = tokio::spawn(async move {
      if signal::ctrl_c().await.is_ok() {
         println!("{}", style("Aborting in-flight sync...").yellow());
         abort.cancel();
      }
   });

   let _ = accept_handle.await;
   let _ = watch_handle.await;
   abort_on_signal.abort();

   println!("{}", style("Server stopped").green());
   Ok(())
}
