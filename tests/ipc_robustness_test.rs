mod support;

use std::{path::PathBuf, sync::Arc, time::Duration};

use findex::{
   cmd::serve::Server,
   integrity,
   ipc::{self, Request, Response, SocketBuffer},
   service::{IndexService, ServiceOptions},
   sync::SyncEngine,
   watch::{ChangeWatcher, WatchOptions},
};
use support::{as_dyn, description, open_store};
use tokio::io::{AsyncWriteExt, DuplexStream};
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn test_ipc_rejects_truncated_length_prefix() {
   let (mut client, mut server) = tokio::io::duplex(16);
   client.write_all(&[0x01, 0x02]).await.unwrap();
   drop(client);

   let mut buffer = SocketBuffer::new();
   let err = buffer
      .recv_with_limit::<_, Request>(&mut server, 1024)
      .await
      .unwrap_err();
   assert!(err.to_string().contains("failed to read"));
}

#[tokio::test]
async fn test_ipc_rejects_truncated_payload() {
   let (mut client, mut server) = tokio::io::duplex(32);
   let len: u32 = 10;
   client.write_all(&len.to_le_bytes()).await.unwrap();
   client.write_all(&[0xaa; 5]).await.unwrap();
   drop(client);

   let mut buffer = SocketBuffer::new();
   let err = buffer
      .recv_with_limit::<_, Request>(&mut server, 1024)
      .await
      .unwrap_err();
   assert!(err.to_string().contains("failed to read"));
}

#[tokio::test]
async fn test_ipc_rejects_garbage_payload() {
   let (mut client, mut server) = tokio::io::duplex(64);
   let payload = [0xffu8; 16];
   let len = payload.len() as u32;
   client.write_all(&len.to_le_bytes()).await.unwrap();
   client.write_all(&payload).await.unwrap();
   drop(client);

   let mut buffer = SocketBuffer::new();
   let err = buffer
      .recv_with_limit::<_, Request>(&mut server, 1024)
      .await
      .unwrap_err();
   assert!(err.to_string().contains("failed to deserialize"));
}

#[tokio::test]
async fn test_ipc_rejects_oversized_payload() {
   let (mut client, mut server) = tokio::io::duplex(32);
   let len: u32 = 2048;
   client.write_all(&len.to_le_bytes()).await.unwrap();
   drop(client);

   let mut buffer = SocketBuffer::new();
   let err = buffer
      .recv_with_limit::<_, Request>(&mut server, 16)
      .await
      .unwrap_err();
   assert!(err.to_string().contains("message too large"));
}

struct Daemon {
   _dir:     tempfile::TempDir,
   shutdown: CancellationToken,
   client:   DuplexStream,
   buffer:   SocketBuffer,
   handle:   tokio::task::JoinHandle<()>,
}

impl Daemon {
   async fn start(max_message_bytes: usize) -> Self {
      let dir = tempfile::tempdir().unwrap();
      let store = open_store(&dir).await;
      let service = IndexService::new(as_dyn(&store), ServiceOptions::default());
      let watcher = Arc::new(ChangeWatcher::new(SyncEngine::new(as_dyn(&store), 10), WatchOptions {
         artifact:      dir.path().join("findex_cache.csv"),
         debounce:      Duration::from_millis(10),
         poll_interval: Duration::from_millis(10),
      }));
      let shutdown = CancellationToken::new();
      let server = Server::new(service, watcher, PathBuf::from("index.db"), shutdown.clone())
         .with_max_message_bytes(max_message_bytes);

      let (client, server_end) = tokio::io::duplex(64 * 1024);
      let handle = tokio::spawn(async move { server.handle_client(server_end).await });
      Self { _dir: dir, shutdown, client, buffer: SocketBuffer::new(), handle }
   }

   async fn call(&mut self, request: &Request) -> Response {
      self.buffer.send(&mut self.client, request).await.unwrap();
      self
         .buffer
         .recv::<_, Response>(&mut self.client)
         .await
         .unwrap()
   }
}

#[tokio::test]
async fn test_server_negotiates_protocol() {
   let mut daemon = Daemon::start(ipc::DEFAULT_MAX_MESSAGE_BYTES).await;

   match daemon.call(&ipc::client_hello()).await {
      Response::Hello { protocol_version, .. } => assert_eq!(protocol_version, 1),
      other => panic!("unexpected response: {other:?}"),
   }
   match daemon
      .call(&Request::Hello { protocol_versions: vec![99] })
      .await
   {
      Response::Error { code, .. } => assert_eq!(code, "unsupported_protocol"),
      other => panic!("unexpected response: {other:?}"),
   }
}

#[tokio::test]
async fn test_server_round_trips_index_requests() {
   let mut daemon = Daemon::start(ipc::DEFAULT_MAX_MESSAGE_BYTES).await;

   let mut record = description("/a/b.txt", 10, &["k"]);
   record.fingerprint = integrity::path_fingerprint("/a/b.txt");
   let Response::Stored(stored) = daemon
      .call(&Request::Insert { record, timeout_ms: Some(5_000) })
      .await
   else {
      panic!("insert failed");
   };
   assert_eq!(stored.record.keyword_texts().collect::<Vec<_>>(), ["k"]);

   let Response::Files { files } = daemon
      .call(&Request::Search { query: "b.txt".to_string(), limit: None, timeout_ms: None })
      .await
   else {
      panic!("search failed");
   };
   assert_eq!(files, vec![stored.record.clone()]);

   let Response::Status(status) = daemon.call(&Request::Status).await else {
      panic!("status failed");
   };
   assert_eq!(status.stats.files, 1);
   assert_eq!(status.watcher.passes, 0);
}

#[tokio::test]
async fn test_server_reports_errors_by_code() {
   let mut daemon = Daemon::start(ipc::DEFAULT_MAX_MESSAGE_BYTES).await;

   let record = description("/a/b.txt", 10, &[]);
   match daemon
      .call(&Request::Insert { record, timeout_ms: None })
      .await
   {
      Response::Error { code, message } => {
         assert_eq!(code, "integrity_mismatch");
         assert!(message.contains("/a/b.txt"));
      },
      other => panic!("unexpected response: {other:?}"),
   }

   // The connection stays usable after an error.
   assert!(matches!(daemon.call(&Request::Stats).await, Response::Stats(_)));
}

#[tokio::test]
async fn test_server_answers_oversized_frame_with_error() {
   let mut daemon = Daemon::start(64).await;

   let records = (0..16)
      .map(|i| description(&format!("/big/{i}.txt"), i, &["padding"]))
      .collect();
   match daemon.call(&Request::InsertBatch { records }).await {
      Response::Error { message, .. } => assert!(message.contains("message too large")),
      other => panic!("unexpected response: {other:?}"),
   }
   tokio::time::timeout(Duration::from_secs(5), daemon.handle)
      .await
      .expect("connection closed after a bad frame")
      .unwrap();
}

#[tokio::test]
async fn test_shutdown_request_cancels_daemon() {
   let mut daemon = Daemon::start(ipc::DEFAULT_MAX_MESSAGE_BYTES).await;

   assert!(matches!(daemon.call(&Request::Shutdown).await, Response::Shutdown { success: true }));
   tokio::time::timeout(Duration::from_secs(5), daemon.shutdown.cancelled())
      .await
      .expect("shutdown token fired");
}
