//! Fingerprint verification for records submitted at the API boundary.
//!
//! The expected fingerprint is the SHA-256 of the record's path string, not of
//! the file's contents, so a passing check only says the submitter knew the
//! path.

use std::fmt;

use sha2::{Digest as _, Sha256};

use crate::{Result, error::Error, types::FileDescription};

/// SHA-256 digest of arbitrary bytes.
#[derive(Copy, Clone, Default, Eq, PartialEq, Hash)]
#[repr(transparent)]
pub struct Digest([u8; 32]);

impl Digest {
   /// Computes SHA-256 hash of data
   pub fn sum(dat: impl AsRef<[u8]>) -> Self {
      Self(Sha256::digest(dat.as_ref()).into())
   }

   pub fn to_hex(&self) -> String {
      hex::encode(self.0)
   }
}

impl AsRef<[u8]> for Digest {
   fn as_ref(&self) -> &[u8] {
      &self.0
   }
}

impl fmt::Debug for Digest {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      write!(f, "Digest({})", self.to_hex())
   }
}

impl fmt::Display for Digest {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.write_str(&self.to_hex())
   }
}

/// Lowercase hex SHA-256 of the path's UTF-8 bytes.
pub fn path_fingerprint(path: &str) -> String {
   Digest::sum(path).to_hex()
}

/// Fails with [`Error::IntegrityMismatch`] unless the record's fingerprint is
/// exactly [`path_fingerprint`] of its path.
pub fn verify(record: &FileDescription) -> Result<()> {
   if path_fingerprint(&record.path).as_bytes() == record.fingerprint.as_bytes() {
      Ok(())
   } else {
      tracing::debug!(path = %record.path, "fingerprint does not match path");
      Err(Error::IntegrityMismatch { path: record.path.clone() })
   }
}

#[cfg(test)]
mod tests {
   use chrono::NaiveDate;

   use super::*;

   const AB_TXT_SHA256: &str = "3af167d37e3712f45bcc830edb5a2eb3d668398e005bf82717b6400ad43f766f";

   fn record(path: &str, fingerprint: &str) -> FileDescription {
      let ts = NaiveDate::from_ymd_opt(2024, 1, 1)
         .and_then(|d| d.and_hms_opt(0, 0, 0))
         .expect("valid timestamp");
      FileDescription {
         path:        path.to_string(),
         name:        "b.txt".to_string(),
         extension:   "txt".to_string(),
         created:     ts,
         modified:    ts,
         size_bytes:  10,
         fingerprint: fingerprint.to_string(),
         keywords:    Vec::new(),
      }
   }

   #[test]
   fn fingerprint_is_lowercase_hex_of_path() {
      assert_eq!(path_fingerprint("/a/b.txt"), AB_TXT_SHA256);
      assert_eq!(
         path_fingerprint(""),
         "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
      );
   }

   #[test]
   fn matching_fingerprint_passes() {
      verify(&record("/a/b.txt", AB_TXT_SHA256)).expect("fingerprint should match");
   }

   #[test]
   fn mismatch_names_the_path() {
      let err = verify(&record("/a/b.txt", "abc123")).expect_err("must not match");
      assert!(matches!(err, Error::IntegrityMismatch { ref path } if path == "/a/b.txt"));
   }

   #[test]
   fn comparison_is_byte_exact() {
      let upper = AB_TXT_SHA256.to_uppercase();
      assert!(verify(&record("/a/b.txt", &upper)).is_err());
      let padded = format!(" {AB_TXT_SHA256}");
      assert!(verify(&record("/a/b.txt", &padded)).is_err());
   }

   #[test]
   fn contents_do_not_matter() {
      let mut r = record("/a/b.txt", AB_TXT_SHA256);
      r.size_bytes = 999_999;
      r.name = "other".to_string();
      verify(&r).expect("only the path is authenticated");
   }
}
