pub mod core;
pub mod storage;
pub mod index;
pub mod query;
pub mod service;

pub use crate::core::config::Config;
pub use crate::core::error::{Error, ErrorKind, Result};
pub use crate::core::types::{Book, BookId, Catalog};
pub use crate::index::BookIndex;
pub use crate::query::types::{BookFilter, BookQuery, Page, SortKey, SortOrder};
pub use crate::service::{BookPatch, BooksService, NewBook};
pub use crate::storage::JsonStore;

/*
┌──────────────────────────────────────────────────────────────────────────────┐
│                           BOOKSHELF ARCHITECTURE                             │
└──────────────────────────────────────────────────────────────────────────────┘

┌─────────────────────────────── SERVICE LAYER ────────────────────────────────┐
│  struct BooksService                                                         │
│  • store: Arc<JsonStore>          // no state of its own                     │
│  • create / get / update / delete / list / health                           │
│  NewBook ──into_book()──> Book        BookPatch ──apply()──> Book            │
└──────────────────────────────────────────────────────────────────────────────┘
            │ read snapshot                          │ modify(closure)
            ▼                                        ▼
┌──────────────────────────────── INDEX LAYER ─────────────────────────────────┐
│  struct BookIndex  (rebuilt per query, never persisted)                      │
│  • by_author: HashMap<String, Vec<BookId>>                                   │
│  • by_genre:  HashMap<String, Vec<BookId>>                                   │
│  • by_year:   HashMap<i32, Vec<BookId>>                                      │
│  candidates ∩ ──> text filter ──> availability ──> stable sort ──> page      │
└──────────────────────────────────────────────────────────────────────────────┘
            │
            ▼
┌─────────────────────────────── STORAGE LAYER ────────────────────────────────┐
│  struct JsonStore                                                            │
│  • cache: RwLock<{ Arc<Catalog>, loaded mtime }>                             │
│  • writer: tokio Mutex            // in-process writers                      │
│  • FileLock (flock)               // cross-process writers                   │
│  • write_atomic: tmp ──fsync──> rename                                       │
│  • BackupPolicy: snapshot every N writes, best effort                        │
│                                                                              │
│  <data_dir>/books.json         {"version": 1, "books": {<id>: <book>}}      │
│  <data_dir>/books.json.tmp     staging file for atomic replace              │
│  <data_dir>/books.json.lock    flock marker                                 │
│  <data_dir>/books.json.bak-*   snapshots                                     │
└──────────────────────────────────────────────────────────────────────────────┘
*/
