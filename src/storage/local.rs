//! Local filesystem storage implementation.
//!
//! Each collection is a JSON document mapping id to record. Nothing is
//! cached: reads load the document, and every mutation re-reads it under
//! an exclusive lock file, applies the change and writes it atomically
//! (temp file, then rename). Several processes can therefore share one
//! storage directory, and a failed write leaves the document unchanged.
//!
//! ## Storage Layout
//!
//! ```text
//! {root}/
//! ├── config.toml           # Pipeline configuration
//! ├── articles.json         # id -> ArticleRecord
//! ├── articles.lock         # present while a writer holds the document
//! ├── queue.json            # article_id -> QueueEntry
//! └── published.json        # id -> PublishedRecord
//! ```

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::error::{AppError, Result};
use crate::models::{ArticleRecord, PublishStatus, PublishedRecord, QueueEntry, QueueStatus};
use crate::storage::{ArticleStore, PublishedStore, QueueStore, page_published, swap_in};

/// How long a writer waits for another one before giving up.
const LOCK_WAIT: Duration = Duration::from_secs(10);
const LOCK_RETRY: Duration = Duration::from_millis(10);
/// A lock file older than this was left behind by a crashed writer.
const LOCK_STALE: Duration = Duration::from_secs(60);

/// Exclusive hold on a document, released when dropped.
struct FileLock {
    path: PathBuf,
}

impl FileLock {
    async fn acquire(path: PathBuf) -> Result<Self> {
        let deadline = tokio::time::Instant::now() + LOCK_WAIT;
        loop {
            match tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(_) => return Ok(Self { path }),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    if lock_is_stale(&path).await {
                        log::warn!("Removing abandoned lock {}", path.display());
                        let _ = tokio::fs::remove_file(&path).await;
                        continue;
                    }
                    if tokio::time::Instant::now() >= deadline {
                        return Err(AppError::store(format!(
                            "timed out waiting for {}",
                            path.display()
                        )));
                    }
                    tokio::time::sleep(LOCK_RETRY).await;
                }
                Err(e) => {
                    return Err(AppError::store(format!(
                        "cannot lock {}: {e}",
                        path.display()
                    )));
                }
            }
        }
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            log::warn!("Failed to release lock {}: {}", self.path.display(), e);
        }
    }
}

async fn lock_is_stale(path: &Path) -> bool {
    let Ok(meta) = tokio::fs::metadata(path).await else {
        return false;
    };
    meta.modified()
        .ok()
        .and_then(|modified| SystemTime::now().duration_since(modified).ok())
        .is_some_and(|age| age > LOCK_STALE)
}

/// One JSON-backed collection.
struct JsonCollection<T> {
    path: PathBuf,
    lock_path: PathBuf,
    /// Serializes writers inside this process; `FileLock` covers the others.
    writer: Mutex<()>,
    _records: PhantomData<fn() -> T>,
}

impl<T> JsonCollection<T>
where
    T: Serialize + DeserializeOwned + Send,
{
    async fn open(path: PathBuf) -> Result<Self> {
        // Fail early on a corrupt document.
        read_json::<BTreeMap<String, T>>(&path).await?;
        Ok(Self {
            lock_path: path.with_extension("lock"),
            path,
            writer: Mutex::new(()),
            _records: PhantomData,
        })
    }

    async fn load(&self) -> Result<BTreeMap<String, T>> {
        Ok(read_json(&self.path).await?.unwrap_or_default())
    }

    async fn read<R>(&self, f: impl FnOnce(&BTreeMap<String, T>) -> R) -> Result<R> {
        let records = self.load().await?;
        Ok(f(&records))
    }

    /// Apply `f` to the current document and persist it if `f` reports a change.
    async fn mutate<R>(
        &self,
        f: impl FnOnce(&mut BTreeMap<String, T>) -> (bool, R),
    ) -> Result<R> {
        let _writer = self.writer.lock().await;
        let _lock = FileLock::acquire(self.lock_path.clone()).await?;

        let mut records = self.load().await?;
        let (changed, result) = f(&mut records);

        if changed {
            write_json(&self.path, &records).await.map_err(|e| {
                AppError::store(format!("failed to write {}: {e}", self.path.display()))
            })?;
        }
        Ok(result)
    }
}

/// File-backed backend for all three collections.
pub struct LocalStore {
    root_dir: PathBuf,
    articles: JsonCollection<ArticleRecord>,
    queue: JsonCollection<QueueEntry>,
    published: JsonCollection<PublishedRecord>,
}

impl LocalStore {
    /// Open (or create) a store rooted at the given directory.
    pub async fn open(root_dir: impl AsRef<Path>) -> Result<Self> {
        let root_dir = root_dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&root_dir)
            .await
            .map_err(|e| AppError::store(format!("cannot create {}: {e}", root_dir.display())))?;

        Ok(Self {
            articles: JsonCollection::open(root_dir.join("articles.json")).await?,
            queue: JsonCollection::open(root_dir.join("queue.json")).await?,
            published: JsonCollection::open(root_dir.join("published.json")).await?,
            root_dir,
        })
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }
}

/// Write JSON atomically (write to temp, then rename).
async fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(value)?;

    let tmp = path.with_extension("tmp");
    let mut file = tokio::fs::File::create(&tmp).await?;
    file.write_all(&bytes).await?;
    file.flush().await?;
    drop(file);

    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

/// Read JSON, returning None if the file doesn't exist.
async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(AppError::store(format!(
            "failed to read {}: {e}",
            path.display()
        ))),
    }
}

#[async_trait]
impl ArticleStore for LocalStore {
    async fn contains_article(&self, id: &str) -> Result<bool> {
        self.articles.read(|r| r.contains_key(id)).await
    }

    async fn get_article(&self, id: &str) -> Result<Option<ArticleRecord>> {
        self.articles.read(|r| r.get(id).cloned()).await
    }

    async fn insert_article(&self, record: &ArticleRecord) -> Result<bool> {
        self.articles
            .mutate(|r| {
                let inserted = swap_in(r, None, record);
                (inserted, inserted)
            })
            .await
    }

    async fn remove_article(&self, id: &str) -> Result<bool> {
        self.articles
            .mutate(|r| {
                let removed = r.remove(id).is_some();
                (removed, removed)
            })
            .await
    }

    async fn article_count(&self) -> Result<usize> {
        self.articles.read(|r| r.len()).await
    }
}

#[async_trait]
impl QueueStore for LocalStore {
    async fn get_entry(&self, article_id: &str) -> Result<Option<QueueEntry>> {
        self.queue.read(|r| r.get(article_id).cloned()).await
    }

    async fn list_entries(&self, status: Option<QueueStatus>) -> Result<Vec<QueueEntry>> {
        self.queue
            .read(|r| {
                r.values()
                    .filter(|e| status.is_none_or(|s| e.status == s))
                    .cloned()
                    .collect()
            })
            .await
    }

    async fn swap_entry(&self, expected: Option<u64>, entry: &QueueEntry) -> Result<bool> {
        self.queue
            .mutate(|r| {
                let swapped = swap_in(r, expected, entry);
                (swapped, swapped)
            })
            .await
    }
}

#[async_trait]
impl PublishedStore for LocalStore {
    async fn get_published(&self, id: &str) -> Result<Option<PublishedRecord>> {
        self.published.read(|r| r.get(id).cloned()).await
    }

    async fn list_published(
        &self,
        status: Option<PublishStatus>,
        skip: usize,
        limit: usize,
    ) -> Result<Vec<PublishedRecord>> {
        self.published
            .read(|r| page_published(r, status, skip, limit))
            .await
    }

    async fn swap_published(
        &self,
        expected: Option<u64>,
        record: &PublishedRecord,
    ) -> Result<bool> {
        self.published
            .mutate(|r| {
                let swapped = swap_in(r, expected, record);
                (swapped, swapped)
            })
            .await
    }
}
