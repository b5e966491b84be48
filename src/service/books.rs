use std::sync::Arc;
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};
use crate::core::config::Config;
use crate::core::error::{Error, Result};
use crate::core::stats::{HealthReport, HealthStatus};
use crate::core::types::{Book, BookId};
use crate::index::BookIndex;
use crate::query::types::{BookQuery, Page};
use crate::service::schemas::{BookPatch, NewBook};
use crate::storage::{JsonStore, Mutation};

const NOT_FOUND: &str = "book not found";

/// Domain operations over the book store.
///
/// Holds no state of its own: every call goes back to the store, and list
/// queries rebuild their indices from the current snapshot.
#[derive(Clone)]
pub struct BooksService {
    store: Arc<JsonStore>,
}

impl BooksService {
    pub fn new(store: Arc<JsonStore>) -> Self {
        BooksService { store }
    }

    pub fn open(config: &Config) -> Result<Self> {
        Ok(Self::new(Arc::new(JsonStore::open(config)?)))
    }

    pub fn store(&self) -> &JsonStore {
        &self.store
    }

    pub async fn list(&self, query: &BookQuery) -> Result<Page<Book>> {
        query.validate()?;

        let (count, catalog) = self.store.list_books().await?;
        let index = BookIndex::build(&catalog);
        let (items, total) = index.query(&catalog, query);
        debug!(scanned = count, matched = total, returned = items.len(), "list query");

        Ok(Page {
            items,
            total,
            limit: query.limit,
            offset: query.offset,
        })
    }

    pub async fn create(&self, input: NewBook) -> Result<Book> {
        let existing = self.store.read().await?;
        let mut id = BookId::generate();
        while existing.books.contains_key(&id) {
            id = BookId::generate();
        }

        let book = input.into_book(id, Utc::now())?;
        self.store.upsert_book(book.clone()).await?;

        info!(id = %book.id, title = %book.title, "book created");
        Ok(book)
    }

    pub async fn get(&self, id: &BookId) -> Result<Book> {
        self.store
            .get_book(id)
            .await?
            .ok_or_else(|| Error::not_found(NOT_FOUND))
    }

    /// Merge `patch` over the stored record. On a validation failure the
    /// stored record is left as it was. An empty patch writes nothing.
    pub async fn update(&self, id: &BookId, patch: &BookPatch) -> Result<Book> {
        let now = Utc::now();
        let updated = self
            .store
            .modify(|catalog| {
                let current = catalog
                    .books
                    .get(id)
                    .ok_or_else(|| Error::not_found(NOT_FOUND))?;
                if patch.is_empty() {
                    return Ok(Mutation::Skip(current.clone()));
                }
                let updated = patch.apply(current, advance(current.updated_at, now))?;
                catalog.books.insert(id.clone(), updated.clone());
                Ok(Mutation::Commit(updated))
            })
            .await?;

        info!(id = %id, "book updated");
        Ok(updated)
    }

    pub async fn delete(&self, id: &BookId) -> Result<()> {
        if !self.store.delete_book(id).await? {
            return Err(Error::not_found(NOT_FOUND));
        }
        info!(id = %id, "book deleted");
        Ok(())
    }

    pub fn health(&self) -> HealthReport {
        HealthReport {
            status: HealthStatus::Ok,
            store: self.store.health(),
        }
    }
}

// `updated_at` moves strictly forward even when the clock has not.
fn advance(previous: DateTime<Utc>, now: DateTime<Utc>) -> DateTime<Utc> {
    if now > previous {
        now
    } else {
        previous + Duration::microseconds(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_time_is_strictly_later() {
        let previous = Utc::now();
        assert_eq!(advance(previous, previous), previous + Duration::microseconds(1));
        assert_eq!(
            advance(previous, previous - Duration::seconds(10)),
            previous + Duration::microseconds(1)
        );
        let later = previous + Duration::seconds(1);
        assert_eq!(advance(previous, later), later);
    }
}
