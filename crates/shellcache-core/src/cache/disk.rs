//! On-disk cache storage.
//!
//! Each named cache is a directory under the storage root; each entry is a
//! JSON file named by the SHA-256 of its request key, holding the key, the
//! response snapshot and the time it was written.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use super::storage::{check_name, CacheStorage};
use crate::error::CacheError;
use crate::net::{RequestKey, Response};

const ENTRY_EXTENSION: &str = "json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedData<T> {
    pub data: T,
    pub cached_at: DateTime<Utc>,
}

impl<T> CachedData<T> {
    pub fn new(data: T) -> Self {
        Self {
            data,
            cached_at: Utc::now(),
        }
    }

    pub fn age_minutes(&self) -> i64 {
        (Utc::now() - self.cached_at).num_minutes()
    }

    pub fn age_display(&self) -> String {
        let minutes = self.age_minutes();
        if minutes < 1 {
            // Also covers clock skew (negative ages)
            "just now".to_string()
        } else if minutes < 60 {
            format!("{}m ago", minutes)
        } else if minutes < 1440 {
            let hours = minutes / 60;
            if minutes % 60 >= 30 {
                format!("{}h ago", hours + 1)
            } else {
                format!("{}h ago", hours)
            }
        } else {
            let days = minutes / 1440;
            if (minutes % 1440) / 60 >= 12 {
                format!("{}d ago", days + 1)
            } else {
                format!("{}d ago", days)
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheRecord {
    key: RequestKey,
    response: Response,
}

/// One line of `DiskCacheStorage::entries` output.
#[derive(Debug, Clone)]
pub struct EntrySummary {
    pub key: RequestKey,
    pub status: u16,
    pub size: usize,
    pub age: String,
}

pub struct DiskCacheStorage {
    root: PathBuf,
    tmp_counter: AtomicU64,
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> CacheError + '_ {
    move |source| CacheError::Io {
        path: path.to_path_buf(),
        source,
    }
}

impl DiskCacheStorage {
    pub fn new(root: PathBuf) -> Result<Self, CacheError> {
        std::fs::create_dir_all(&root).map_err(io_error(&root))?;
        Ok(Self {
            root,
            tmp_counter: AtomicU64::new(0),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn cache_dir(&self, name: &str) -> Result<PathBuf, CacheError> {
        check_name(name)?;
        Ok(self.root.join(name))
    }

    fn entry_path(&self, name: &str, key: &RequestKey) -> Result<PathBuf, CacheError> {
        let digest = Sha256::digest(key.to_string().as_bytes());
        Ok(self
            .cache_dir(name)?
            .join(format!("{}.{}", hex::encode(digest), ENTRY_EXTENSION)))
    }

    fn tmp_path(&self, path: &Path) -> PathBuf {
        let n = self.tmp_counter.fetch_add(1, Ordering::Relaxed);
        path.with_extension(format!("tmp{}", n))
    }

    async fn read_record(path: &Path) -> Result<Option<CachedData<CacheRecord>>, CacheError> {
        let contents = match tokio::fs::read_to_string(path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_error(path)(e)),
        };
        let record = serde_json::from_str(&contents).map_err(|source| CacheError::Corrupt {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Some(record))
    }

    /// Write a record to a fresh temporary file next to its final path.
    async fn stage(&self, path: &Path, record: CacheRecord) -> Result<PathBuf, CacheError> {
        let contents = serde_json::to_string(&CachedData::new(record))?;
        let tmp = self.tmp_path(path);
        tokio::fs::write(&tmp, contents).await.map_err(io_error(&tmp))?;
        Ok(tmp)
    }

    /// Contents of an existing entry file, kept so a failed batch can put
    /// it back.
    async fn read_previous(path: &Path) -> Result<Option<Vec<u8>>, CacheError> {
        match tokio::fs::metadata(path).await {
            Ok(meta) if meta.is_file() => tokio::fs::read(path)
                .await
                .map(Some)
                .map_err(io_error(path)),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error(path)(e)),
        }
    }

    /// Move staged files into place. If a rename fails, the entries already
    /// moved are restored and the remaining staged files removed.
    async fn commit(&self, staged: Vec<(PathBuf, PathBuf)>) -> Result<(), CacheError> {
        let mut previous = Vec::with_capacity(staged.len());
        for (_, path) in &staged {
            previous.push(Self::read_previous(path).await?);
        }

        let mut committed = Vec::with_capacity(staged.len());
        let mut pending = staged.into_iter().zip(previous);
        while let Some(((tmp, path), prior)) = pending.next() {
            if let Err(e) = tokio::fs::rename(&tmp, &path).await {
                let _ = tokio::fs::remove_file(&tmp).await;
                for ((tmp, _), _) in pending.by_ref() {
                    let _ = tokio::fs::remove_file(&tmp).await;
                }
                warn!(path = %path.display(), error = %e, "Cache batch failed, rolling back");
                self.roll_back(committed).await;
                return Err(io_error(&path)(e));
            }
            committed.push((path, prior));
        }
        Ok(())
    }

    async fn roll_back(&self, committed: Vec<(PathBuf, Option<Vec<u8>>)>) {
        for (path, prior) in committed.into_iter().rev() {
            let restored = match prior {
                Some(contents) => {
                    let tmp = self.tmp_path(&path);
                    match tokio::fs::write(&tmp, contents).await {
                        Ok(()) => tokio::fs::rename(&tmp, &path).await,
                        Err(e) => Err(e),
                    }
                }
                None => tokio::fs::remove_file(&path).await,
            };
            if let Err(e) = restored {
                warn!(path = %path.display(), error = %e, "Failed to restore cache entry");
            }
        }
    }

    /// All readable records of a cache; unreadable files are skipped.
    async fn records(&self, name: &str) -> Result<Vec<CachedData<CacheRecord>>, CacheError> {
        let dir = self.cache_dir(name)?;
        let mut read_dir = match tokio::fs::read_dir(&dir).await {
            Ok(read_dir) => read_dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_error(&dir)(e)),
        };

        let mut records = Vec::new();
        while let Some(item) = read_dir.next_entry().await.map_err(io_error(&dir))? {
            let path = item.path();
            if path.extension().and_then(|e| e.to_str()) != Some(ENTRY_EXTENSION) {
                continue;
            }
            match Self::read_record(&path).await {
                Ok(Some(record)) => records.push(record),
                Ok(None) => {}
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable cache entry"),
            }
        }
        records.sort_by(|a, b| a.data.key.cmp(&b.data.key));
        Ok(records)
    }

    /// Per-entry status, size and age, for display.
    pub async fn entries(&self, name: &str) -> Result<Vec<EntrySummary>, CacheError> {
        Ok(self
            .records(name)
            .await?
            .into_iter()
            .map(|record| EntrySummary {
                age: record.age_display(),
                status: record.data.response.status,
                size: record.data.response.body.len(),
                key: record.data.key,
            })
            .collect())
    }
}

#[async_trait]
impl CacheStorage for DiskCacheStorage {
    async fn open(&self, name: &str) -> Result<(), CacheError> {
        let dir = self.cache_dir(name)?;
        tokio::fs::create_dir_all(&dir).await.map_err(io_error(&dir))
    }

    async fn has(&self, name: &str) -> Result<bool, CacheError> {
        let dir = self.cache_dir(name)?;
        match tokio::fs::metadata(&dir).await {
            Ok(meta) => Ok(meta.is_dir()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(io_error(&dir)(e)),
        }
    }

    async fn names(&self) -> Result<Vec<String>, CacheError> {
        let mut read_dir = tokio::fs::read_dir(&self.root)
            .await
            .map_err(io_error(&self.root))?;
        let mut names = Vec::new();
        while let Some(item) = read_dir.next_entry().await.map_err(io_error(&self.root))? {
            let is_dir = item.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
            if let (true, Some(name)) = (is_dir, item.file_name().to_str()) {
                if check_name(name).is_ok() {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    async fn delete(&self, name: &str) -> Result<bool, CacheError> {
        let dir = self.cache_dir(name)?;
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(io_error(&dir)(e)),
        }
    }

    async fn get(&self, name: &str, key: &RequestKey) -> Result<Option<Response>, CacheError> {
        let path = self.entry_path(name, key)?;
        Ok(Self::read_record(&path)
            .await?
            .filter(|record| &record.data.key == key)
            .map(|record| record.data.response))
    }

    async fn put(&self, name: &str, key: RequestKey, response: Response) -> Result<(), CacheError> {
        self.open(name).await?;
        let path = self.entry_path(name, &key)?;
        let tmp = self.stage(&path, CacheRecord { key, response }).await?;
        tokio::fs::rename(&tmp, &path).await.map_err(io_error(&path))
    }

    async fn put_all(
        &self,
        name: &str,
        entries: Vec<(RequestKey, Response)>,
    ) -> Result<(), CacheError> {
        self.open(name).await?;

        // Stage every entry before any becomes visible
        let mut staged = Vec::with_capacity(entries.len());
        for (key, response) in entries {
            let path = self.entry_path(name, &key)?;
            match self.stage(&path, CacheRecord { key, response }).await {
                Ok(tmp) => staged.push((tmp, path)),
                Err(e) => {
                    for (tmp, _) in &staged {
                        let _ = tokio::fs::remove_file(tmp).await;
                    }
                    return Err(e);
                }
            }
        }

        debug!(cache = name, count = staged.len(), "Committing cache batch");
        self.commit(staged).await
    }

    async fn keys(&self, name: &str) -> Result<Vec<RequestKey>, CacheError> {
        Ok(self
            .records(name)
            .await?
            .into_iter()
            .map(|record| record.data.key)
            .collect())
    }
}
