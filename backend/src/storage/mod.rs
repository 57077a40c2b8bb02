//! Upload storage.
//!
//! Each upload gets a UUID and a directory `<media_root>/<id>/` holding the
//! original file and any conversion output. Metadata lives next to it in
//! `<media_root>/<id>.json`.
//!
//! ```text
//! media/
//! ├── 6f1c…e2.json          { id, name, size, createdAt }
//! └── 6f1c…e2/
//!     ├── grants.csv        original upload
//!     ├── csv_dir/grants.csv
//!     └── unflattened.json
//! ```

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{StorageError, StorageResult};
use crate::models::UploadedArtifact;

/// Default retention period for uploads, in days.
pub const DEFAULT_RETENTION_DAYS: i64 = 7;

/// Access to stored uploads.
pub trait Storage: Send + Sync {
    /// Look up an upload. Fails with `NotFound` for unknown ids and
    /// `Expired` once the file has been removed.
    fn open(&self, id: &str) -> StorageResult<UploadedArtifact>;

    /// Working directory for an upload's conversion output.
    fn directory_for(&self, id: &str) -> PathBuf;

    /// Public URL of an upload's directory.
    fn public_url_for(&self, id: &str) -> String;
}

/// Metadata stored next to each upload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredUpload {
    id: String,
    name: String,
    size: u64,
    created_at: DateTime<Utc>,
}

/// Uploads kept on the local filesystem.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    media_root: PathBuf,
    media_url: String,
    retention: Option<Duration>,
}

impl LocalStorage {
    pub fn new(media_root: impl AsRef<Path>, media_url: impl Into<String>) -> Self {
        Self {
            media_root: media_root.as_ref().to_path_buf(),
            media_url: media_url.into().trim_end_matches('/').to_string(),
            retention: Duration::try_days(DEFAULT_RETENTION_DAYS),
        }
    }

    /// Uploads older than `days` are treated as expired. `None` keeps them.
    pub fn with_retention_days(mut self, days: Option<i64>) -> Self {
        self.retention = days.and_then(Duration::try_days);
        self
    }

    /// Store `bytes` as a new upload called `name`.
    pub fn save(&self, name: &str, bytes: &[u8]) -> StorageResult<UploadedArtifact> {
        let id = Uuid::new_v4().to_string();
        let name = sanitize_name(name);

        let dir = self.directory_for(&id);
        fs::create_dir_all(&dir)?;
        let path = dir.join(&name);
        fs::write(&path, bytes)?;

        let stored = StoredUpload {
            id: id.clone(),
            name: name.clone(),
            size: bytes.len() as u64,
            created_at: Utc::now(),
        };
        fs::write(self.metadata_path(&id), serde_json::to_string_pretty(&stored)?)?;

        info!(id = %id, name = %name, size = stored.size, "upload stored");
        Ok(UploadedArtifact {
            id,
            name,
            path,
            size: stored.size,
        })
    }

    /// Store a file from disk, keeping its file name.
    pub fn save_file(&self, path: &Path) -> StorageResult<UploadedArtifact> {
        let bytes = fs::read(path)?;
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("upload");
        self.save(name, &bytes)
    }

    fn metadata_path(&self, id: &str) -> PathBuf {
        self.media_root.join(format!("{}.json", id))
    }

    fn load_metadata(&self, id: &str) -> StorageResult<StoredUpload> {
        // Ids are UUIDs; anything else cannot name an upload.
        Uuid::parse_str(id).map_err(|_| StorageError::NotFound(id.to_string()))?;

        let content = match fs::read_to_string(self.metadata_path(id)) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::NotFound(id.to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_str(&content)?)
    }

    fn is_expired(&self, stored: &StoredUpload) -> bool {
        self.retention
            .is_some_and(|retention| Utc::now() - stored.created_at > retention)
    }
}

impl Storage for LocalStorage {
    fn open(&self, id: &str) -> StorageResult<UploadedArtifact> {
        let stored = self.load_metadata(id)?;
        let path = self.directory_for(id).join(&stored.name);

        if self.is_expired(&stored) || !path.is_file() {
            debug!(id, path = %path.display(), "upload no longer available");
            return Err(StorageError::Expired(id.to_string()));
        }

        Ok(UploadedArtifact {
            id: stored.id,
            name: stored.name,
            path,
            size: stored.size,
        })
    }

    fn directory_for(&self, id: &str) -> PathBuf {
        self.media_root.join(id)
    }

    fn public_url_for(&self, id: &str) -> String {
        format!("{}/{}", self.media_url, id)
    }
}

/// Keep only the final path component of an uploaded name.
fn sanitize_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default().trim();
    match base {
        "" | "." | ".." => "upload".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_save_then_open() {
        let dir = tempdir().unwrap();
        let storage = LocalStorage::new(dir.path(), "/media/");

        let saved = storage.save("grants.csv", b"id\n1\n").unwrap();
        let opened = storage.open(&saved.id).unwrap();

        assert_eq!(opened.name, "grants.csv");
        assert_eq!(opened.size, 5);
        assert_eq!(std::fs::read(&opened.path).unwrap(), b"id\n1\n");
        assert_eq!(storage.public_url_for(&saved.id), format!("/media/{}", saved.id));
        assert!(storage.directory_for(&saved.id).is_dir());
    }

    #[test]
    fn test_unknown_and_malformed_ids_are_not_found() {
        let dir = tempdir().unwrap();
        let storage = LocalStorage::new(dir.path(), "/media");

        let missing = Uuid::new_v4().to_string();
        assert!(matches!(storage.open(&missing), Err(StorageError::NotFound(_))));
        assert!(matches!(storage.open("../etc/passwd"), Err(StorageError::NotFound(_))));
    }

    #[test]
    fn test_removed_file_is_expired() {
        let dir = tempdir().unwrap();
        let storage = LocalStorage::new(dir.path(), "/media");

        let saved = storage.save("data.json", b"{}").unwrap();
        std::fs::remove_file(&saved.path).unwrap();
        assert!(matches!(storage.open(&saved.id), Err(StorageError::Expired(_))));
    }

    #[test]
    fn test_old_upload_is_expired() {
        let dir = tempdir().unwrap();
        let storage = LocalStorage::new(dir.path(), "/media");
        let saved = storage.save("data.json", b"{}").unwrap();

        let stored = StoredUpload {
            id: saved.id.clone(),
            name: saved.name.clone(),
            size: saved.size,
            created_at: Utc::now() - Duration::days(8),
        };
        std::fs::write(
            storage.metadata_path(&saved.id),
            serde_json::to_string(&stored).unwrap(),
        )
        .unwrap();

        assert!(matches!(storage.open(&saved.id), Err(StorageError::Expired(_))));

        let keep_forever = storage.clone().with_retention_days(None);
        assert!(keep_forever.open(&saved.id).is_ok());
    }

    #[test]
    fn test_upload_names_are_sanitized() {
        assert_eq!(sanitize_name("../../evil.csv"), "evil.csv");
        assert_eq!(sanitize_name("C:\\data\\grants.xlsx"), "grants.xlsx");
        assert_eq!(sanitize_name(".."), "upload");
    }
}
