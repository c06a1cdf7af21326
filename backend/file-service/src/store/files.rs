//! Content directory: file metadata index plus content on disk
//!
//! Content for a record lives at `<root>/<id><ext>`, where `<ext>` is the
//! title's extension including the dot. The metadata index is in memory and
//! guarded by a read/write lock; content I/O never happens under that lock.

use crate::error::{FileServiceError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::io::AsyncRead;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Reader over a stored file's content
pub type ContentReader = Box<dyn AsyncRead + Send + Unpin>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Owner {
    pub id: String,
    pub name: String,
}

/// Metadata of a persisted file. Never mutated after save.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub id: Uuid,
    pub title: String,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub owner: Owner,
    content_path: PathBuf,
}

impl FileRecord {
    pub fn content_path(&self) -> &Path {
        &self.content_path
    }
}

/// What the uploader supplies; everything else is assigned on save
#[derive(Debug, Clone)]
pub struct FileDraft {
    pub title: String,
    pub owner: Owner,
}

#[async_trait]
pub trait FileStore: Send + Sync {
    /// Persist `content` under a fresh id
    ///
    /// ## Errors
    ///
    /// - `InvalidArgument` if the title has no usable basename
    /// - `Storage` if the content cannot be written (no record is kept)
    async fn save(&self, draft: FileDraft, content: Vec<u8>) -> Result<FileRecord>;

    async fn find(&self, id: &str) -> Result<Option<FileRecord>>;

    /// Every record whose owner name equals `owner_name` exactly
    async fn list_by_owner(&self, owner_name: &str) -> Result<Vec<FileRecord>>;

    async fn open(&self, record: &FileRecord) -> Result<ContentReader>;
}

/// Strip any directory components, accepting both `/` and `\` separators
pub fn sanitize_title(raw: &str) -> Result<String> {
    let base = raw.rsplit(['/', '\\']).next().unwrap_or_default();

    match base {
        "" | "." | ".." => Err(FileServiceError::InvalidArgument(format!(
            "invalid file title: {:?}",
            raw
        ))),
        _ => Ok(base.to_string()),
    }
}

/// Extension of `title` including the dot, or empty when there is none
pub fn extension_of(title: &str) -> &str {
    title.rfind('.').map(|i| &title[i..]).unwrap_or("")
}

/// File store backed by a directory on local disk
#[derive(Debug)]
pub struct DiskFileStore {
    root: PathBuf,
    index: RwLock<HashMap<Uuid, FileRecord>>,
}

impl DiskFileStore {
    /// Open (creating if needed) the storage directory at `root`
    pub async fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        info!(root = %root.display(), "File storage ready");

        Ok(Self {
            root,
            index: RwLock::new(HashMap::new()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl FileStore for DiskFileStore {
    async fn save(&self, draft: FileDraft, content: Vec<u8>) -> Result<FileRecord> {
        let title = sanitize_title(&draft.title)?;
        let id = Uuid::new_v4();
        let content_path = self.root.join(format!("{}{}", id, extension_of(&title)));

        if let Err(e) = tokio::fs::write(&content_path, &content).await {
            warn!(file_id = %id, error = %e, "Failed to write file content");
            if let Err(cleanup) = tokio::fs::remove_file(&content_path).await {
                debug!(file_id = %id, error = %cleanup, "No partial content to remove");
            }
            return Err(e.into());
        }

        let now = Utc::now();
        let record = FileRecord {
            id,
            title,
            size_bytes: content.len() as u64,
            created_at: now,
            updated_at: now,
            owner: draft.owner,
            content_path,
        };

        self.index.write().await.insert(id, record.clone());

        info!(
            file_id = %record.id,
            owner = %record.owner.name,
            bytes = record.size_bytes,
            "Saved file"
        );

        Ok(record)
    }

    async fn find(&self, id: &str) -> Result<Option<FileRecord>> {
        let Ok(id) = Uuid::parse_str(id) else {
            return Ok(None);
        };
        Ok(self.index.read().await.get(&id).cloned())
    }

    async fn list_by_owner(&self, owner_name: &str) -> Result<Vec<FileRecord>> {
        let mut records: Vec<FileRecord> = self
            .index
            .read()
            .await
            .values()
            .filter(|record| record.owner.name == owner_name)
            .cloned()
            .collect();

        records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(records)
    }

    async fn open(&self, record: &FileRecord) -> Result<ContentReader> {
        let file = tokio::fs::File::open(&record.content_path).await?;
        Ok(Box::new(file))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    fn owner(name: &str) -> Owner {
        Owner {
            id: String::new(),
            name: name.to_string(),
        }
    }

    fn draft(title: &str, owner_name: &str) -> FileDraft {
        FileDraft {
            title: title.to_string(),
            owner: owner(owner_name),
        }
    }

    #[test]
    fn test_sanitize_title() {
        assert_eq!(sanitize_title("report.pdf").unwrap(), "report.pdf");
        assert_eq!(sanitize_title("/home/admin/report.pdf").unwrap(), "report.pdf");
        assert_eq!(sanitize_title("C:\\Users\\admin\\report.pdf").unwrap(), "report.pdf");
        assert_eq!(sanitize_title("../../etc/passwd").unwrap(), "passwd");

        for bad in ["", ".", "..", "dir/", "dir\\..", "/"] {
            assert!(sanitize_title(bad).is_err(), "{:?} should be rejected", bad);
        }
    }

    #[test]
    fn test_extension_of() {
        assert_eq!(extension_of("report.pdf"), ".pdf");
        assert_eq!(extension_of("archive.tar.gz"), ".gz");
        assert_eq!(extension_of("README"), "");
    }

    #[tokio::test]
    async fn test_save_assigns_fresh_id_and_path() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskFileStore::new(dir.path()).await.unwrap();

        let record = store
            .save(draft("/tmp/report.pdf", "admin"), vec![7u8; 100])
            .await
            .unwrap();

        assert_eq!(record.title, "report.pdf");
        assert_eq!(record.size_bytes, 100);
        assert_eq!(record.created_at, record.updated_at);
        assert_eq!(
            record.content_path(),
            dir.path().join(format!("{}.pdf", record.id))
        );

        let on_disk = tokio::fs::read(record.content_path()).await.unwrap();
        assert_eq!(on_disk, vec![7u8; 100]);
    }

    #[tokio::test]
    async fn test_title_without_extension() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskFileStore::new(dir.path()).await.unwrap();

        let record = store.save(draft("Makefile", "admin"), b"all:".to_vec()).await.unwrap();
        assert_eq!(record.content_path(), dir.path().join(record.id.to_string()));
    }

    #[tokio::test]
    async fn test_invalid_title_saves_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskFileStore::new(dir.path()).await.unwrap();

        let result = store.save(draft("..", "admin"), vec![1, 2, 3]).await;
        assert!(matches!(result, Err(FileServiceError::InvalidArgument(_))));
        assert!(store.list_by_owner("admin").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_write_leaves_no_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskFileStore::new(dir.path().join("root")).await.unwrap();
        tokio::fs::remove_dir(store.root()).await.unwrap();

        let result = store.save(draft("a.txt", "admin"), vec![1]).await;
        assert!(matches!(result, Err(FileServiceError::Storage(_))));
        assert!(store.list_by_owner("admin").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_find_and_open() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskFileStore::new(dir.path()).await.unwrap();
        let record = store.save(draft("a.txt", "admin"), b"hello".to_vec()).await.unwrap();

        let found = store.find(&record.id.to_string()).await.unwrap().unwrap();
        assert_eq!(found, record);

        let mut content = Vec::new();
        store.open(&found).await.unwrap().read_to_end(&mut content).await.unwrap();
        assert_eq!(content, b"hello");

        assert!(store.find(&Uuid::new_v4().to_string()).await.unwrap().is_none());
        assert!(store.find("not-a-uuid").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_by_owner_exact_match() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskFileStore::new(dir.path()).await.unwrap();

        let first = store.save(draft("a.txt", "admin"), vec![1]).await.unwrap();
        let second = store.save(draft("b.txt", "admin"), vec![2]).await.unwrap();
        store.save(draft("c.txt", "admin1"), vec![3]).await.unwrap();
        store.save(draft("d.txt", "Admin"), vec![4]).await.unwrap();

        let listed = store.list_by_owner("admin").await.unwrap();
        let mut ids: Vec<Uuid> = listed.iter().map(|r| r.id).collect();
        ids.sort();
        let mut expected = vec![first.id, second.id];
        expected.sort();
        assert_eq!(ids, expected);

        assert!(store.list_by_owner("nobody").await.unwrap().is_empty());
    }
}
