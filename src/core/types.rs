use serde::{Serialize, Deserialize};
use std::collections::BTreeMap;
use std::fmt;
use chrono::{DateTime, Datelike, Utc};
use uuid::Uuid;
use crate::core::error::{Error, Result};

pub const SCHEMA_VERSION: u32 = 1;
pub const MIN_PUBLISHED_YEAR: i32 = 1000;

/// Opaque record identifier. Freshly generated ids are v4 UUIDs, but any
/// string found in the data file is accepted.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BookId(pub String);

impl BookId {
    pub fn generate() -> Self {
        BookId(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for BookId {
    fn from(id: &str) -> Self {
        BookId(id.to_string())
    }
}

impl From<String> for BookId {
    fn from(id: String) -> Self {
        BookId(id)
    }
}

impl fmt::Display for BookId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn default_copies() -> i64 {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Book {
    /// Mirrors the catalog key; the key wins when they disagree.
    #[serde(default)]
    pub id: BookId,
    pub title: String,
    pub author: String,
    #[serde(default)]
    pub isbn: Option<String>,
    #[serde(default)]
    pub published_year: Option<i32>,
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default = "default_copies")]
    pub total_copies: i64,
    #[serde(default = "default_copies")]
    pub available_copies: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Book {
    /// Check every field-level invariant. Called at each mutation boundary.
    pub fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(Error::validation("title must not be empty"));
        }
        if self.author.trim().is_empty() {
            return Err(Error::validation("author must not be empty"));
        }
        if let Some(year) = self.published_year {
            validate_year(year)?;
        }
        if self.total_copies < 0 {
            return Err(Error::validation("total_copies must not be negative"));
        }
        if self.available_copies < 0 {
            return Err(Error::validation("available_copies must not be negative"));
        }
        if self.available_copies > self.total_copies {
            return Err(Error::validation("available_copies cannot exceed total_copies"));
        }
        Ok(())
    }

    pub fn is_available(&self) -> bool {
        self.available_copies > 0
    }
}

pub fn validate_year(year: i32) -> Result<()> {
    let max_year = Utc::now().year() + 1;
    if year < MIN_PUBLISHED_YEAR || year > max_year {
        return Err(Error::validation(format!(
            "published_year out of range ({}..={})",
            MIN_PUBLISHED_YEAR, max_year
        )));
    }
    Ok(())
}

/// The persisted document: schema version plus the full record map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    pub version: u32,
    #[serde(default)]
    pub books: BTreeMap<BookId, Book>,
}

impl Catalog {
    pub fn new() -> Self {
        Catalog {
            version: SCHEMA_VERSION,
            books: BTreeMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.books.len()
    }

    pub fn is_empty(&self) -> bool {
        self.books.is_empty()
    }

    /// Make every record's `id` agree with the key it is stored under.
    pub fn with_keyed_ids(mut self) -> Self {
        for (id, book) in self.books.iter_mut() {
            if book.id != *id {
                book.id = id.clone();
            }
        }
        self
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new()
    }
}
