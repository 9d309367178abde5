//! Filesystem [`ProofStore`] implementation.
//!
//! Proof artifacts land in a single upload directory with a
//! timestamp-prefixed, sanitised file name; the stored reference is the
//! path relative to that directory.

use std::path::PathBuf;

use arogya_core::{payment::ProofReference, store::ProofStore};
use chrono::Utc;

/// Stores proof uploads under one directory on local disk.
#[derive(Clone)]
pub struct FsProofStore {
  dir: PathBuf,
}

impl FsProofStore {
  pub fn new(dir: impl Into<PathBuf>) -> Self { Self { dir: dir.into() } }

  /// Create the upload directory if it does not exist yet.
  pub async fn ensure_dir(&self) -> std::io::Result<()> {
    tokio::fs::create_dir_all(&self.dir).await
  }
}

/// Strip path separators and shell-hostile characters from a client-supplied
/// file name.
fn sanitize(name: &str) -> String {
  let cleaned: String = name
    .chars()
    .map(|c| {
      if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
        c
      } else {
        '_'
      }
    })
    .collect();
  if cleaned.is_empty() { "proof".to_string() } else { cleaned }
}

impl ProofStore for FsProofStore {
  type Error = std::io::Error;

  async fn store_proof(
    &self,
    file_name: &str,
    bytes: &[u8],
  ) -> Result<ProofReference, Self::Error> {
    let name =
      format!("payment-{}-{}", Utc::now().timestamp_millis(), sanitize(file_name));
    tokio::fs::write(self.dir.join(&name), bytes).await?;
    Ok(ProofReference(name))
  }
}
