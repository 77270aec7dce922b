use findex::record::{self, RawRow, SIZE_BYTES};
use proptest::prelude::*;

const HEADER: &str =
   "DIRECTORY_PATH,FILE_NAME,EXTENSION,CREATED_DATE,MODIFIED_DATE,SIZE_BYTES,SHA256_HASH,KEYWORDS";

fn raw_with_size(size: &str) -> RawRow<'_> {
   RawRow {
      directory_path: Some("/p/f.txt"),
      file_name: Some("f.txt"),
      extension: Some("txt"),
      created_date: Some("2024-01-01 00:00:00"),
      modified_date: Some("2024-01-02 00:00:00"),
      size_bytes: Some(size),
      sha256_hash: Some("h"),
      keywords: None,
   }
}

#[derive(Debug, Clone)]
enum Row {
   Valid { name: String, size: u32, keywords: Vec<String> },
   BadSize { name: String, size: String },
   BadDate { name: String },
   ExtraField { name: String },
}

fn name_strategy() -> impl Strategy<Value = String> {
   "[a-z]{1,8}\\.(txt|rs|md)"
}

fn row_strategy() -> impl Strategy<Value = Row> {
   prop_oneof![
      3 => (name_strategy(), any::<u32>(), prop::collection::vec("[a-z]{1,5}", 0..4))
         .prop_map(|(name, size, keywords)| Row::Valid { name, size, keywords }),
      1 => (name_strategy(), "-[0-9]{1,4}|[0-9]\\.[0-9]|x[0-9]")
         .prop_map(|(name, size)| Row::BadSize { name, size }),
      1 => name_strategy().prop_map(|name| Row::BadDate { name }),
      1 => name_strategy().prop_map(|name| Row::ExtraField { name }),
   ]
}

fn render(i: usize, row: &Row) -> String {
   match row {
      Row::Valid { name, size, keywords } => format!(
         "/r/{i}/{name},{name},txt,2024-01-01 00:00:00,2024-01-02 00:00:00,{size},h{i},{}",
         keywords.join(";")
      ),
      Row::BadSize { name, size } => {
         format!("/r/{i}/{name},{name},txt,2024-01-01 00:00:00,2024-01-02 00:00:00,{size},h{i},")
      },
      Row::BadDate { name } => {
         format!("/r/{i}/{name},{name},txt,01/01/2024,2024-01-02 00:00:00,1,h{i},")
      },
      Row::ExtraField { name } => {
         format!("/r/{i}/{name},{name},txt,2024-01-01 00:00:00,2024-01-02 00:00:00,1,h{i},,stray")
      },
   }
}

proptest! {
   #[test]
   fn size_accepts_every_storable_integer(size in 0u64..=i64::MAX as u64) {
      let text = size.to_string();
      let record = record::parse_row(1, &raw_with_size(&text)).unwrap();
      prop_assert_eq!(record.size_bytes, size);
   }

   #[test]
   fn size_beyond_storable_range_is_rejected(size in (i64::MAX as u64 + 1)..=u64::MAX) {
      let text = size.to_string();
      let err = record::parse_row(1, &raw_with_size(&text)).unwrap_err();
      prop_assert_eq!(err.field, SIZE_BYTES);
   }

   #[test]
   fn non_digit_sizes_are_rejected(size in "[0-9]{0,3}[a-zA-Z.+-][0-9]{0,3}") {
      let err = record::parse_row(7, &raw_with_size(&size)).unwrap_err();
      prop_assert_eq!(err.row, 7);
      prop_assert_eq!(err.field, SIZE_BYTES);
   }

   #[test]
   fn arbitrary_bytes_never_panic(data in prop::collection::vec(any::<u8>(), 0..512)) {
      let _ = record::parse_artifact(&data);
   }

   #[test]
   fn rows_are_kept_or_reported_individually(rows in prop::collection::vec(row_strategy(), 0..40)) {
      let mut text = String::from(HEADER);
      for (i, row) in rows.iter().enumerate() {
         text.push('\n');
         text.push_str(&render(i, row));
      }
      text.push('\n');

      let parsed = record::parse_artifact(text.as_bytes()).unwrap();
      prop_assert_eq!(parsed.rows, rows.len());

      let valid: Vec<usize> = rows
         .iter()
         .enumerate()
         .filter(|(_, row)| matches!(row, Row::Valid { .. }))
         .map(|(i, _)| i)
         .collect();
      prop_assert_eq!(parsed.records.len(), valid.len());
      prop_assert_eq!(parsed.errors.len(), rows.len() - valid.len());

      for (record, i) in parsed.records.iter().zip(&valid) {
         let prefix = format!("/r/{i}/");
         prop_assert!(record.path.starts_with(&prefix));
         if let Row::Valid { size, keywords, .. } = &rows[*i] {
            prop_assert_eq!(record.size_bytes, u64::from(*size));
            let mut expected: Vec<String> = Vec::new();
            for keyword in keywords {
               if !expected.contains(keyword) {
                  expected.push(keyword.clone());
               }
            }
            prop_assert_eq!(&record.keywords, &expected);
         }
      }
      let rejected: Vec<usize> = parsed.errors.iter().map(|err| err.row).collect();
      let expected: Vec<usize> = (1..=rows.len()).filter(|row| !valid.contains(&(row - 1))).collect();
      prop_assert_eq!(rejected, expected);
   }
}
