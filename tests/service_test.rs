mod support;

use std::{sync::Arc, time::Duration};

use findex::{
   Error,
   integrity,
   service::{IndexService, ServiceOptions},
   store::{SqliteStore, Store},
   types::{BatchEntry, FileDescription, UpsertOutcome},
};
use support::{as_dyn, description, open_store};

fn service(store: &Arc<SqliteStore>) -> IndexService {
   IndexService::new(as_dyn(store), ServiceOptions {
      request_timeout:    Duration::from_secs(10),
      max_search_results: 100,
   })
}

fn trusted(path: &str, size: u64, keywords: &[&str]) -> FileDescription {
   FileDescription { fingerprint: integrity::path_fingerprint(path), ..description(path, size, keywords) }
}

#[tokio::test]
async fn test_insert_verifies_fingerprint_then_upserts() {
   let dir = tempfile::tempdir().unwrap();
   let store = open_store(&dir).await;
   let service = service(&store);

   let first = service
      .insert(trusted("/a/b.txt", 10, &["x", "y", "x"]), None)
      .await
      .unwrap();
   assert_eq!(first.outcome, UpsertOutcome::Inserted);
   assert_eq!(first.record.keyword_texts().collect::<Vec<_>>(), ["x", "y"]);

   let second = service
      .insert(trusted("/a/b.txt", 12, &[]), None)
      .await
      .unwrap();
   assert_eq!(second.outcome, UpsertOutcome::Updated);
   assert_eq!(second.record.id, first.record.id);

   let stored = store.get("/a/b.txt").await.unwrap().unwrap();
   assert_eq!(stored.size_bytes, 12);
   assert!(stored.keywords.is_empty());
}

#[tokio::test]
async fn test_integrity_mismatch_writes_nothing() {
   let dir = tempfile::tempdir().unwrap();
   let store = open_store(&dir).await;
   let service = service(&store);

   let mut record = trusted("/a/b.txt", 10, &["k"]);
   record.fingerprint = integrity::path_fingerprint("/a/other.txt");
   let err = service.insert(record, None).await.unwrap_err();

   assert!(matches!(err, Error::IntegrityMismatch { ref path } if path == "/a/b.txt"));
   assert_eq!(err.exit_code(), 4);
   let stats = store.stats().await.unwrap();
   assert_eq!((stats.files, stats.keywords), (0, 0));
}

#[tokio::test]
async fn test_insert_rejects_relative_path() {
   let dir = tempfile::tempdir().unwrap();
   let store = open_store(&dir).await;
   let service = service(&store);

   let err = service
      .insert(trusted("relative/b.txt", 10, &[]), None)
      .await
      .unwrap_err();
   assert_eq!(err.code(), "malformed_record");
   assert_eq!(store.stats().await.unwrap().files, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_expired_timeout_cancels_without_effect() {
   let dir = tempfile::tempdir().unwrap();
   let store = open_store(&dir).await;
   let service = service(&store);

   // Hold the database write lock so the insert has to wait for it.
   let mut blocker = store.pool().acquire().await.unwrap();
   sqlx::query("BEGIN IMMEDIATE")
      .execute(&mut *blocker)
      .await
      .unwrap();

   let err = service
      .insert(trusted("/slow/a.txt", 1, &["k"]), Some(Duration::from_millis(50)))
      .await
      .unwrap_err();
   assert!(matches!(err, Error::Cancelled { op: "insert" }), "{err:?}");
   assert_eq!(err.code(), "cancelled");

   sqlx::query("ROLLBACK")
      .execute(&mut *blocker)
      .await
      .unwrap();
   drop(blocker);

   tokio::time::sleep(Duration::from_millis(200)).await;
   assert!(store.get("/slow/a.txt").await.unwrap().is_none());
   assert_eq!(store.stats().await.unwrap().files, 0);
}

#[tokio::test]
async fn test_insert_batch_reports_rejections_in_order() {
   let dir = tempfile::tempdir().unwrap();
   let store = open_store(&dir).await;
   let service = service(&store);

   let mut nameless = description("/batch/2.txt", 2, &[]);
   nameless.name.clear();
   let entries = service
      .insert_batch(vec![
         description("/batch/1.txt", 1, &["one"]),
         nameless,
         description("relative.txt", 3, &[]),
         description("/batch/4.txt", 4, &[]),
      ])
      .await
      .unwrap();

   assert_eq!(entries.len(), 4);
   assert!(matches!(&entries[0], BatchEntry::Applied(u) if u.record.path == "/batch/1.txt"));
   assert!(matches!(&entries[1], BatchEntry::Rejected { index: 1, field, .. } if field == "FILE_NAME"));
   assert!(matches!(&entries[2], BatchEntry::Rejected { index: 2, field, .. } if field == "DIRECTORY_PATH"));
   assert!(matches!(&entries[3], BatchEntry::Applied(u) if u.record.path == "/batch/4.txt"));
   assert_eq!(store.stats().await.unwrap().files, 2);
}

#[tokio::test]
async fn test_insert_batch_skips_integrity_check() {
   let dir = tempfile::tempdir().unwrap();
   let store = open_store(&dir).await;
   let service = service(&store);

   let entries = service
      .insert_batch(vec![description("/trusted/a.txt", 1, &[])])
      .await
      .unwrap();
   assert!(matches!(&entries[0], BatchEntry::Applied(_)));
   assert_eq!(store.get("/trusted/a.txt").await.unwrap().unwrap().fingerprint, "fp-1");
}

#[tokio::test]
async fn test_search_get_delete_round() {
   let dir = tempfile::tempdir().unwrap();
   let store = open_store(&dir).await;
   let service = service(&store);

   service
      .insert(trusted("/a/b.txt", 10, &["k"]), None)
      .await
      .unwrap();
   service
      .insert(trusted("/x/y.txt", 10, &[]), None)
      .await
      .unwrap();

   let files = service.search("b.txt", None, None).await.unwrap();
   assert_eq!(files.len(), 1);
   assert_eq!(files[0].path, "/a/b.txt");

   assert!(service.get("/x/y.txt").await.unwrap().is_some());
   assert!(service.delete("/x/y.txt").await.unwrap());
   assert!(service.get("/x/y.txt").await.unwrap().is_none());
   assert_eq!(service.reset().await.unwrap(), 1);
   assert!(service.search("", None, None).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_index_dirs_require_absolute_paths() {
   let dir = tempfile::tempdir().unwrap();
   let store = open_store(&dir).await;
   let service = service(&store);

   assert_eq!(
      service
         .add_index_dir("data", true)
         .await
         .unwrap_err()
         .code(),
      "malformed_record"
   );
   let added = service.add_index_dir("/data", false).await.unwrap();
   assert!(!added.whitelisted);
   assert_eq!(service.index_dirs().await.unwrap(), vec![added]);
   assert_eq!(service.stats().await.unwrap().index_dirs, 1);
}
