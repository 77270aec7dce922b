mod support;

use findex::{search::QueryService, store::Store};
use support::{as_dyn, description, open_store};

async fn seeded(dir: &tempfile::TempDir, paths: &[&str]) -> QueryService {
   let store = open_store(dir).await;
   for (i, path) in paths.iter().enumerate() {
      store
         .upsert(&description(path, i as u64, &["kw1", "kw2"]))
         .await
         .unwrap();
   }
   QueryService::new(as_dyn(&store), 100)
}

fn paths(files: &[findex::types::FileRecord]) -> Vec<&str> {
   files.iter().map(|f| f.path.as_str()).collect()
}

#[tokio::test]
async fn test_search_matches_path_substring() {
   let dir = tempfile::tempdir().unwrap();
   let query = seeded(&dir, &["/a/b.txt", "/x/y.txt"]).await;

   let files = query.search("b.txt", None).await.unwrap();
   assert_eq!(paths(&files), ["/a/b.txt"]);
   assert_eq!(files[0].keyword_texts().collect::<Vec<_>>(), ["kw1", "kw2"]);
}

#[tokio::test]
async fn test_search_is_case_sensitive() {
   let dir = tempfile::tempdir().unwrap();
   let query = seeded(&dir, &["/docs/Report.pdf", "/docs/report.txt"]).await;

   assert_eq!(paths(&query.search("Report", None).await.unwrap()), ["/docs/Report.pdf"]);
   assert_eq!(paths(&query.search("report", None).await.unwrap()), ["/docs/report.txt"]);
   assert!(query.search("REPORT", None).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_like_wildcards_are_literal() {
   let dir = tempfile::tempdir().unwrap();
   let query = seeded(&dir, &["/w/100%.txt", "/w/a_b.txt", "/w/axb.txt", "/w/1000.txt"]).await;

   assert_eq!(paths(&query.search("%", None).await.unwrap()), ["/w/100%.txt"]);
   assert_eq!(paths(&query.search("a_b", None).await.unwrap()), ["/w/a_b.txt"]);
}

#[tokio::test]
async fn test_results_are_ordered_by_path_and_limited() {
   let dir = tempfile::tempdir().unwrap();
   let query = seeded(&dir, &["/z/3.txt", "/a/1.txt", "/m/2.txt", "/b/4.log"]).await;

   let all = query.search(".txt", None).await.unwrap();
   assert_eq!(paths(&all), ["/a/1.txt", "/m/2.txt", "/z/3.txt"]);

   let limited = query.search(".txt", Some(2)).await.unwrap();
   assert_eq!(paths(&limited), ["/a/1.txt", "/m/2.txt"]);
   assert!(limited.iter().all(|f| f.keywords.len() == 2), "limit applies to files, not keywords");
}

#[tokio::test]
async fn test_empty_query_matches_everything() {
   let dir = tempfile::tempdir().unwrap();
   let query = seeded(&dir, &["/b", "/a"]).await;

   assert_eq!(paths(&query.search("", None).await.unwrap()), ["/a", "/b"]);
}

#[tokio::test]
async fn test_configured_cap_bounds_caller_limit() {
   let dir = tempfile::tempdir().unwrap();
   let store = open_store(&dir).await;
   for i in 0..5 {
      store
         .upsert(&description(&format!("/cap/{i}.txt"), i, &[]))
         .await
         .unwrap();
   }
   let query = QueryService::new(as_dyn(&store), 3);

   assert_eq!(query.search("/cap/", Some(50)).await.unwrap().len(), 3);
   assert_eq!(query.search("/cap/", None).await.unwrap().len(), 3);
}
