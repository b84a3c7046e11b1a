//! Filesystem blob store issuing HMAC-SHA256 signed retrieval links.
//!
//! Every object is stored under the hex SHA-256 digest of its key, next to a
//! JSON sidecar holding the key, the original file name and content type.
//! Retrieval links carry an expiry timestamp and a signature over
//! `key.expires`.

use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    time::Duration,
};

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::BlobStorage;
use crate::{error::NoteError, models::Attachment};

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, thiserror::Error)]
pub enum BlobAccessError {
    #[error("signature does not match")]
    BadSignature,

    #[error("retrieval link expired")]
    Expired,

    #[error("blob not found: {0}")]
    NotFound(String),

    #[error("storage i/o error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Serialize, Deserialize)]
struct BlobMeta {
    #[serde(default)]
    key: String,
    file_name: String,
    content_type: Option<String>,
}

/// Blob contents served through a verified retrieval link.
#[derive(Debug)]
pub struct SignedBlob {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

pub struct FsBlobStorage {
    root: PathBuf,
    public_base_url: String,
    signing_secret: String,
    url_ttl: Duration,
}

impl FsBlobStorage {
    pub fn new(
        root: impl Into<PathBuf>,
        public_base_url: impl Into<String>,
        signing_secret: impl Into<String>,
        url_ttl: Duration,
    ) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
            signing_secret: signing_secret.into(),
            url_ttl,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Fixed-length file stem, whatever the key's length or characters.
    fn stem(key: &str) -> String {
        hex::encode(Sha256::digest(key.as_bytes()))
    }

    fn data_path(&self, key: &str) -> PathBuf {
        self.root.join(Self::stem(key))
    }

    fn meta_path(&self, key: &str) -> PathBuf {
        self.root.join(format!("{}.meta.json", Self::stem(key)))
    }

    fn mac(&self, key: &str, expires: i64) -> HmacSha256 {
        let mut mac = HmacSha256::new_from_slice(self.signing_secret.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(key.as_bytes());
        mac.update(b".");
        mac.update(expires.to_string().as_bytes());
        mac
    }

    /// Hex signature authorizing retrieval of `key` until `expires` (unix seconds).
    pub fn sign(&self, key: &str, expires: i64) -> String {
        hex::encode(self.mac(key, expires).finalize().into_bytes())
    }

    /// Verifies a retrieval link and reads the blob it points to.
    pub async fn open_signed(
        &self,
        key: &str,
        expires: i64,
        signature: &str,
    ) -> Result<SignedBlob, BlobAccessError> {
        let signature = hex::decode(signature).map_err(|_| BlobAccessError::BadSignature)?;
        self.mac(key, expires)
            .verify_slice(&signature)
            .map_err(|_| BlobAccessError::BadSignature)?;

        if expires < chrono::Utc::now().timestamp() {
            return Err(BlobAccessError::Expired);
        }

        let bytes = match tokio::fs::read(self.data_path(key)).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(BlobAccessError::NotFound(key.to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        let meta = match tokio::fs::read(self.meta_path(key)).await {
            Ok(raw) => serde_json::from_slice::<BlobMeta>(&raw).ok(),
            Err(_) => None,
        };

        Ok(match meta {
            Some(meta) => SignedBlob {
                file_name: meta.file_name,
                content_type: meta.content_type,
                bytes,
            },
            None => SignedBlob {
                file_name: key.to_string(),
                content_type: None,
                bytes,
            },
        })
    }
}

async fn remove_if_present(path: &Path) -> std::io::Result<bool> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

#[async_trait]
impl BlobStorage for FsBlobStorage {
    async fn resolve_retrieval_url(&self, key: &str) -> Result<String, NoteError> {
        if !tokio::fs::try_exists(self.data_path(key)).await? {
            return Err(NoteError::NotFound(key.to_string()));
        }

        let ttl = i64::try_from(self.url_ttl.as_secs()).unwrap_or(i64::MAX);
        let expires = chrono::Utc::now().timestamp().saturating_add(ttl);

        Ok(format!(
            "{}/blobs/{}?expires={}&signature={}",
            self.public_base_url,
            urlencoding::encode(key),
            expires,
            self.sign(key, expires)
        ))
    }

    async fn upload(&self, key: &str, attachment: &Attachment) -> Result<(), NoteError> {
        if key.is_empty() {
            return Err(NoteError::Validation("blob key must not be empty".to_string()));
        }

        tokio::fs::create_dir_all(&self.root).await?;

        let meta = serde_json::to_vec(&BlobMeta {
            key: key.to_string(),
            file_name: attachment.file_name.clone(),
            content_type: attachment.content_type.clone(),
        })?;

        let data_path = self.data_path(key);
        tokio::fs::write(&data_path, &attachment.bytes).await?;
        if let Err(e) = tokio::fs::write(self.meta_path(key), meta).await {
            if let Err(cleanup) = remove_if_present(&data_path).await {
                tracing::warn!("failed to remove partial blob '{}': {}", key, cleanup);
            }
            return Err(e.into());
        }

        tracing::debug!(
            "stored blob '{}' ({} bytes)",
            key,
            attachment.bytes.len()
        );

        Ok(())
    }

    /// Deleting a missing key succeeds.
    async fn delete(&self, key: &str) -> Result<(), NoteError> {
        let removed = remove_if_present(&self.data_path(key)).await?;
        remove_if_present(&self.meta_path(key)).await?;

        if !removed {
            tracing::debug!("blob '{}' was already absent", key);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn storage(dir: &Path) -> FsBlobStorage {
        FsBlobStorage::new(
            dir,
            "http://localhost:8000/",
            "test-secret",
            Duration::from_secs(60),
        )
    }

    fn query_param<'a>(url: &'a str, name: &str) -> &'a str {
        let query = url.split_once('?').map(|(_, q)| q).unwrap_or_default();
        query
            .split('&')
            .find_map(|pair| pair.strip_prefix(&format!("{name}=")))
            .unwrap_or_default()
    }

    #[tokio::test]
    async fn given_missing_key_when_resolving_then_returns_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let blobs = storage(dir.path());

        let result = blobs.resolve_retrieval_url("nothing").await;

        assert!(matches!(result, Err(NoteError::NotFound(key)) if key == "nothing"));
    }

    #[tokio::test]
    async fn given_uploaded_blob_when_resolving_then_link_opens_it() {
        let dir = tempfile::tempdir().unwrap();
        let blobs = storage(dir.path());
        let attachment =
            Attachment::new("cat.png", b"png-bytes".to_vec()).with_content_type("image/png");
        blobs.upload("my note", &attachment).await.unwrap();

        let url = blobs.resolve_retrieval_url("my note").await.unwrap();

        assert!(url.starts_with("http://localhost:8000/blobs/my%20note?expires="));
        let expires: i64 = query_param(&url, "expires").parse().unwrap();
        let signature = query_param(&url, "signature");
        let blob = blobs.open_signed("my note", expires, signature).await.unwrap();
        assert_eq!(blob.bytes, b"png-bytes");
        assert_eq!(blob.file_name, "cat.png");
        assert_eq!(blob.content_type.as_deref(), Some("image/png"));
    }

    #[tokio::test]
    async fn given_existing_blob_when_uploading_again_then_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let blobs = storage(dir.path());
        blobs
            .upload("k", &Attachment::new("a.txt", b"first".to_vec()))
            .await
            .unwrap();

        blobs
            .upload("k", &Attachment::new("b.txt", b"second".to_vec()))
            .await
            .unwrap();

        let expires = chrono::Utc::now().timestamp() + 30;
        let blob = blobs
            .open_signed("k", expires, &blobs.sign("k", expires))
            .await
            .unwrap();
        assert_eq!(blob.bytes, b"second");
        assert_eq!(blob.file_name, "b.txt");
    }

    #[tokio::test]
    async fn given_tampered_signature_when_opening_then_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let blobs = storage(dir.path());
        blobs
            .upload("k", &Attachment::new("a.txt", b"data".to_vec()))
            .await
            .unwrap();
        let expires = chrono::Utc::now().timestamp() + 30;
        let forged = blobs.sign("other", expires);

        let result = blobs.open_signed("k", expires, &forged).await;

        assert!(matches!(result, Err(BlobAccessError::BadSignature)));
        let result = blobs.open_signed("k", expires, "not-hex").await;
        assert!(matches!(result, Err(BlobAccessError::BadSignature)));
    }

    #[tokio::test]
    async fn given_past_expiry_when_opening_then_expired() {
        let dir = tempfile::tempdir().unwrap();
        let blobs = storage(dir.path());
        blobs
            .upload("k", &Attachment::new("a.txt", b"data".to_vec()))
            .await
            .unwrap();
        let expires = chrono::Utc::now().timestamp() - 10;

        let result = blobs.open_signed("k", expires, &blobs.sign("k", expires)).await;

        assert!(matches!(result, Err(BlobAccessError::Expired)));
    }

    #[tokio::test]
    async fn given_deleted_blob_when_resolving_then_not_found_and_second_delete_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let blobs = storage(dir.path());
        blobs
            .upload("k", &Attachment::new("a.txt", b"data".to_vec()))
            .await
            .unwrap();

        blobs.delete("k").await.unwrap();

        assert!(matches!(
            blobs.resolve_retrieval_url("k").await,
            Err(NoteError::NotFound(_))
        ));
        assert!(blobs.delete("k").await.is_ok());
    }

    #[tokio::test]
    async fn given_path_like_key_when_uploading_then_stays_inside_root() {
        let dir = tempfile::tempdir().unwrap();
        let blobs = storage(dir.path());

        blobs
            .upload("../escape", &Attachment::new("a.txt", b"data".to_vec()))
            .await
            .unwrap();

        assert!(blobs.data_path("../escape").starts_with(dir.path()));
        assert!(blobs.resolve_retrieval_url("../escape").await.is_ok());
    }

    #[tokio::test]
    async fn given_long_key_when_uploading_then_stored_and_served() {
        let dir = tempfile::tempdir().unwrap();
        let blobs = storage(dir.path());
        let key = "n".repeat(200);

        blobs
            .upload(&key, &Attachment::new("long.png", b"long".to_vec()))
            .await
            .unwrap();

        let url = blobs.resolve_retrieval_url(&key).await.unwrap();
        let expires: i64 = query_param(&url, "expires").parse().unwrap();
        let blob = blobs
            .open_signed(&key, expires, query_param(&url, "signature"))
            .await
            .unwrap();
        assert_eq!(blob.bytes, b"long");
        assert_eq!(blob.file_name, "long.png");
    }

    #[tokio::test]
    async fn given_uploaded_blob_when_reading_sidecar_then_key_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        let blobs = storage(dir.path());

        blobs
            .upload("my note", &Attachment::new("a.txt", b"data".to_vec()))
            .await
            .unwrap();

        let raw = std::fs::read(blobs.meta_path("my note")).unwrap();
        let meta: BlobMeta = serde_json::from_slice(&raw).unwrap();
        assert_eq!(meta.key, "my note");
        assert_eq!(blobs.data_path("my note").file_name().unwrap().len(), 64);
    }
}
