use std::fs;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::sync::Mutex;
use tokio::task;
use tracing::{debug, info, warn};
use crate::core::config::Config;
use crate::core::error::{Error, Result};
use crate::core::stats::StoreHealth;
use crate::core::types::{Book, BookId, Catalog};
use crate::storage::atomic::write_atomic;
use crate::storage::backup::{write_snapshot, BackupPolicy};
use crate::storage::file_lock::FileLock;
use crate::storage::layout::StorageLayout;

/// Result of a read-modify-write closure passed to [`JsonStore::modify`]
pub enum Mutation<T> {
    /// Persist the modified document, then return the value
    Commit(T),
    /// Leave the file untouched
    Skip(T),
}

struct CacheState {
    catalog: Arc<Catalog>,
    loaded_mtime: Option<SystemTime>,
}

/// File-backed document store.
///
/// Readers get a shared snapshot from the in-memory cache, which is refreshed
/// whenever the data file's mtime has moved past the last load. Writers are
/// serialized by an in-process mutex and then by an exclusive `flock` on the
/// lock marker file, and every write is a whole-file atomic replace.
pub struct JsonStore {
    layout: Arc<StorageLayout>,
    cache: RwLock<CacheState>,
    writer: Mutex<()>,
    writes: AtomicU64,
    backups: BackupPolicy,
    max_file_size: u64,
}

impl JsonStore {
    pub fn open(config: &Config) -> Result<Self> {
        let layout = StorageLayout::from_config(config)?;
        Self::open_with(layout, BackupPolicy::from_config(config), config.max_file_size_bytes())
    }

    pub fn open_with(layout: StorageLayout, backups: BackupPolicy, max_file_size: u64) -> Result<Self> {
        let (catalog, loaded_mtime) = ensure_initialized(&layout)?;

        Ok(JsonStore {
            layout: Arc::new(layout),
            cache: RwLock::new(CacheState {
                catalog: Arc::new(catalog),
                loaded_mtime: Some(loaded_mtime),
            }),
            writer: Mutex::new(()),
            writes: AtomicU64::new(0),
            backups,
            max_file_size,
        })
    }

    pub fn layout(&self) -> &StorageLayout {
        &self.layout
    }

    /// Current document, reloaded first if the file changed on disk.
    pub async fn read(&self) -> Result<Arc<Catalog>> {
        let modified = tokio::fs::metadata(&self.layout.data_path).await?.modified()?;
        {
            let cache = self.cache.read();
            if !is_newer(modified, cache.loaded_mtime) {
                return Ok(cache.catalog.clone());
            }
        }

        debug!(path = %self.layout.data_path.display(), "data file changed on disk, reloading");
        self.load(modified).await
    }

    /// Replace the whole document.
    pub async fn write(&self, catalog: Catalog) -> Result<()> {
        let _guard = self.writer.lock().await;
        let _file_lock = self.lock_file().await?;
        self.persist(catalog).await
    }

    pub async fn replace_all(&self, catalog: Catalog) -> Result<()> {
        self.write(catalog).await
    }

    /// Read-modify-write under both writer locks.
    ///
    /// The closure sees the freshest on-disk document, so concurrent writers in
    /// other processes never overwrite each other's changes. An `Err` from the
    /// closure aborts without touching the file.
    pub async fn modify<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Catalog) -> Result<Mutation<T>>,
    {
        let _guard = self.writer.lock().await;
        let _file_lock = self.lock_file().await?;

        // mtime has coarse granularity, so another process's write may not be
        // visible through `read`. Under the file lock we always reload.
        let modified = tokio::fs::metadata(&self.layout.data_path).await?.modified()?;
        let current = self.load(modified).await?;
        let mut next = Catalog::clone(&current);

        match f(&mut next)? {
            Mutation::Commit(value) => {
                self.persist(next).await?;
                Ok(value)
            }
            Mutation::Skip(value) => Ok(value),
        }
    }

    pub async fn get_book(&self, id: &BookId) -> Result<Option<Book>> {
        Ok(self.read().await?.books.get(id).cloned())
    }

    pub async fn upsert_book(&self, book: Book) -> Result<()> {
        self.modify(move |catalog| {
            catalog.books.insert(book.id.clone(), book);
            Ok(Mutation::Commit(()))
        })
        .await
    }

    /// Returns whether the record existed. Nothing is written when it did not.
    pub async fn delete_book(&self, id: &BookId) -> Result<bool> {
        self.modify(|catalog| {
            Ok(match catalog.books.remove(id) {
                Some(_) => Mutation::Commit(true),
                None => Mutation::Skip(false),
            })
        })
        .await
    }

    pub async fn list_books(&self) -> Result<(usize, Arc<Catalog>)> {
        let catalog = self.read().await?;
        Ok((catalog.len(), catalog))
    }

    pub fn health(&self) -> StoreHealth {
        let cache = self.cache.read();
        StoreHealth {
            version: cache.catalog.version,
            data_file: self.layout.data_path.clone(),
            last_loaded: cache.loaded_mtime.map(DateTime::<Utc>::from),
            book_count: cache.catalog.len(),
            writes_since_open: self.writes.load(Ordering::Relaxed),
        }
    }

    async fn lock_file(&self) -> Result<FileLock> {
        let lock_path = self.layout.lock_path.clone();
        task::spawn_blocking(move || FileLock::acquire(&lock_path)).await?
    }

    // `modified` must be sampled before the file is read: if the file is
    // replaced in between, the next read simply reloads again.
    async fn load(&self, modified: SystemTime) -> Result<Arc<Catalog>> {
        let bytes = tokio::fs::read(&self.layout.data_path).await?;
        let catalog = Arc::new(parse_catalog(&bytes)?);

        let mut cache = self.cache.write();
        if cache.loaded_mtime.is_some_and(|loaded| loaded > modified) {
            // A concurrent writer already cached something newer
            return Ok(cache.catalog.clone());
        }
        cache.catalog = catalog.clone();
        cache.loaded_mtime = Some(modified);
        Ok(catalog)
    }

    // Caller holds both writer locks.
    async fn persist(&self, catalog: Catalog) -> Result<()> {
        let data = serde_json::to_vec(&catalog)?;
        if data.len() as u64 > self.max_file_size {
            warn!(
                bytes = data.len(),
                limit = self.max_file_size,
                "data file exceeds advisory size limit"
            );
        }

        let layout = self.layout.clone();
        let (data, modified) = task::spawn_blocking(move || {
            let modified = write_atomic(&layout.data_path, &layout.tmp_path(), &data)?;
            Ok::<_, Error>((data, modified))
        })
        .await??;

        let books = catalog.len();
        {
            let mut cache = self.cache.write();
            cache.catalog = Arc::new(catalog);
            cache.loaded_mtime = Some(modified);
        }

        let writes = self.writes.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(books, bytes = data.len(), writes, "document written");

        if self.backups.is_due(writes) {
            self.snapshot(data).await;
        }
        Ok(())
    }

    // Best effort: a failed snapshot never fails the write that triggered it.
    async fn snapshot(&self, data: Vec<u8>) {
        let layout = self.layout.clone();
        match task::spawn_blocking(move || write_snapshot(&layout, &data)).await {
            Ok(Ok(path)) => info!(path = %path.display(), "backup snapshot written"),
            Ok(Err(err)) => warn!(error = %err, "backup snapshot failed"),
            Err(err) => warn!(error = %err, "backup snapshot task failed"),
        }
    }
}

fn is_newer(modified: SystemTime, loaded: Option<SystemTime>) -> bool {
    loaded.is_none_or(|loaded| modified > loaded)
}

fn parse_catalog(bytes: &[u8]) -> Result<Catalog> {
    Ok(serde_json::from_slice::<Catalog>(bytes)?.with_keyed_ids())
}

/// Create an empty document if none exists, then load it.
fn ensure_initialized(layout: &StorageLayout) -> Result<(Catalog, SystemTime)> {
    let _file_lock = FileLock::acquire(&layout.lock_path)?;

    if !layout.data_path.exists() {
        let empty = serde_json::to_vec(&Catalog::new())?;
        write_atomic(&layout.data_path, &layout.tmp_path(), &empty)?;
        info!(path = %layout.data_path.display(), "created empty data file");
    }

    let modified = fs::metadata(&layout.data_path)?.modified()?;
    let catalog = parse_catalog(&fs::read(&layout.data_path)?)?;
    info!(
        path = %layout.data_path.display(),
        version = catalog.version,
        books = catalog.len(),
        "data file loaded"
    );
    Ok((catalog, modified))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;
    use crate::core::error::ErrorKind;

    fn open_store(dir: &TempDir, backups: BackupPolicy) -> JsonStore {
        let layout = StorageLayout::new(dir.path().to_path_buf(), "books.json", "books.json.lock").unwrap();
        JsonStore::open_with(layout, backups, 10 * 1024 * 1024).unwrap()
    }

    fn book(id: &str, title: &str) -> Book {
        let now = Utc::now();
        Book {
            id: BookId::from(id),
            title: title.to_string(),
            author: "Ursula K. Le Guin".to_string(),
            isbn: None,
            published_year: Some(1969),
            genres: vec!["sci-fi".to_string()],
            total_copies: 1,
            available_copies: 1,
            created_at: now,
            updated_at: now,
        }
    }

    fn backup_files(dir: &TempDir) -> Vec<String> {
        fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .filter(|name| name.contains(".bak-"))
            .collect()
    }

    #[tokio::test]
    async fn open_creates_empty_versioned_document() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir, BackupPolicy::disabled());

        let raw: serde_json::Value =
            serde_json::from_slice(&fs::read(dir.path().join("books.json")).unwrap()).unwrap();
        assert_eq!(raw, serde_json::json!({"version": 1, "books": {}}));

        let health = store.health();
        assert_eq!(health.version, 1);
        assert_eq!(health.book_count, 0);
        assert!(health.last_loaded.is_some());
    }

    #[tokio::test]
    async fn repeated_reads_return_the_same_snapshot() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir, BackupPolicy::disabled());
        store.upsert_book(book("a", "The Dispossessed")).await.unwrap();

        let first = store.read().await.unwrap();
        let second = store.read().await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(*first, *second);
    }

    #[tokio::test]
    async fn external_edit_is_picked_up_on_next_read() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir, BackupPolicy::disabled());
        assert!(store.read().await.unwrap().is_empty());

        let mut edited = Catalog::new();
        let outside = book("ext", "Written elsewhere");
        edited.books.insert(outside.id.clone(), outside);
        let path = dir.path().join("books.json");
        fs::write(&path, serde_json::to_vec(&edited).unwrap()).unwrap();
        let file = fs::File::options().write(true).open(&path).unwrap();
        file.set_modified(SystemTime::now() + Duration::from_secs(5)).unwrap();

        let catalog = store.read().await.unwrap();
        assert_eq!(catalog.len(), 1);
        assert!(catalog.books.contains_key(&BookId::from("ext")));
    }

    #[tokio::test]
    async fn upsert_and_delete_round_through_disk() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir, BackupPolicy::disabled());

        store.upsert_book(book("a", "Lathe of Heaven")).await.unwrap();
        assert_eq!(store.get_book(&BookId::from("a")).await.unwrap().unwrap().title, "Lathe of Heaven");

        let reopened = open_store(&dir, BackupPolicy::disabled());
        assert_eq!(reopened.list_books().await.unwrap().0, 1);

        assert!(store.delete_book(&BookId::from("a")).await.unwrap());
        assert!(store.get_book(&BookId::from("a")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn deleting_missing_record_does_not_write() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir, BackupPolicy::disabled());

        assert!(!store.delete_book(&BookId::from("nope")).await.unwrap());
        assert_eq!(store.health().writes_since_open, 0);
    }

    #[tokio::test]
    async fn failed_mutation_leaves_document_untouched() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir, BackupPolicy::disabled());
        store.upsert_book(book("a", "Tehanu")).await.unwrap();
        let before = fs::read(dir.path().join("books.json")).unwrap();

        let result: Result<()> = store
            .modify(|catalog| {
                catalog.books.clear();
                Err(Error::validation("rejected"))
            })
            .await;

        assert_eq!(result.unwrap_err().kind, ErrorKind::Validation);
        assert_eq!(fs::read(dir.path().join("books.json")).unwrap(), before);
        assert_eq!(store.read().await.unwrap().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_upserts_are_all_kept() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(open_store(&dir, BackupPolicy::disabled()));

        let mut handles = Vec::new();
        for i in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.upsert_book(book(&format!("b{i}"), "Copy")).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(store.read().await.unwrap().len(), 16);
        assert_eq!(store.health().writes_since_open, 16);
    }

    #[tokio::test]
    async fn two_handles_on_one_file_do_not_lose_updates() {
        let dir = TempDir::new().unwrap();
        let left = open_store(&dir, BackupPolicy::disabled());
        let right = open_store(&dir, BackupPolicy::disabled());

        for i in 0..5 {
            left.upsert_book(book(&format!("l{i}"), "Left")).await.unwrap();
            right.upsert_book(book(&format!("r{i}"), "Right")).await.unwrap();
        }

        let reopened = open_store(&dir, BackupPolicy::disabled());
        assert_eq!(reopened.read().await.unwrap().len(), 10);
    }

    #[tokio::test]
    async fn snapshot_taken_on_backup_cadence() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir, BackupPolicy { enabled: true, every_n_writes: 2 });

        store.upsert_book(book("a", "One")).await.unwrap();
        assert!(backup_files(&dir).is_empty());

        store.upsert_book(book("b", "Two")).await.unwrap();
        let backups = backup_files(&dir);
        assert_eq!(backups.len(), 1);

        let snapshot: Catalog =
            serde_json::from_slice(&fs::read(dir.path().join(&backups[0])).unwrap()).unwrap();
        assert_eq!(snapshot.len(), 2);
    }

    #[tokio::test]
    async fn corrupt_file_surfaces_parse_error() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir, BackupPolicy::disabled());
        let path = dir.path().join("books.json");
        fs::write(&path, b"{\"version\":1,\"books\":").unwrap();
        let file = fs::File::options().write(true).open(&path).unwrap();
        file.set_modified(SystemTime::now() + Duration::from_secs(5)).unwrap();

        assert_eq!(store.read().await.unwrap_err().kind, ErrorKind::Parse);
    }

    #[tokio::test]
    async fn record_identity_comes_from_its_key() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("books.json");
        let raw = serde_json::json!({
            "version": 1,
            "books": {
                "k1": {
                    "title": "The Word for World Is Forest",
                    "author": "Ursula K. Le Guin",
                    "created_at": "2024-01-01T00:00:00Z",
                    "updated_at": "2024-01-01T00:00:00Z"
                },
                "k2": {
                    "id": "stale",
                    "title": "Always Coming Home",
                    "author": "Ursula K. Le Guin",
                    "created_at": "2024-01-01T00:00:00Z",
                    "updated_at": "2024-01-01T00:00:00Z"
                }
            }
        });
        fs::write(&path, serde_json::to_vec(&raw).unwrap()).unwrap();

        let store = open_store(&dir, BackupPolicy::disabled());
        let first = store.get_book(&BookId::from("k1")).await.unwrap().unwrap();
        assert_eq!(first.id, BookId::from("k1"));
        assert_eq!(first.total_copies, 1);
        let second = store.get_book(&BookId::from("k2")).await.unwrap().unwrap();
        assert_eq!(second.id, BookId::from("k2"));

        fs::write(&path, serde_json::to_vec(&raw).unwrap()).unwrap();
        let file = fs::File::options().write(true).open(&path).unwrap();
        file.set_modified(SystemTime::now() + Duration::from_secs(5)).unwrap();
        let reloaded = store.read().await.unwrap();
        assert_eq!(reloaded.books[&BookId::from("k1")].id, BookId::from("k1"));
    }

    #[tokio::test]
    async fn whole_document_write_replaces_file_and_cache() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir, BackupPolicy::disabled());
        store.upsert_book(book("old", "Rocannon's World")).await.unwrap();

        let mut replacement = Catalog::new();
        for id in ["x", "y"] {
            let entry = book(id, "Planet of Exile");
            replacement.books.insert(entry.id.clone(), entry);
        }
        store.write(replacement.clone()).await.unwrap();

        let on_disk: Catalog =
            serde_json::from_slice(&fs::read(dir.path().join("books.json")).unwrap()).unwrap();
        assert_eq!(on_disk, replacement);
        assert_eq!(*store.read().await.unwrap(), replacement);
        assert_eq!(store.health().writes_since_open, 2);

        store.replace_all(Catalog::new()).await.unwrap();
        assert!(store.read().await.unwrap().is_empty());
        assert_eq!(store.health().writes_since_open, 3);
        assert_eq!(store.health().book_count, 0);
    }
}
