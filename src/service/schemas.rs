use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use crate::core::error::{Error, Result};
use crate::core::types::{Book, BookId};

/// Payload for creating a book
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewBook {
    pub title: String,
    pub author: String,
    #[serde(default)]
    pub isbn: Option<String>,
    #[serde(default)]
    pub published_year: Option<i32>,
    #[serde(default)]
    pub genres: Vec<String>,
    /// Defaults to 1
    #[serde(default)]
    pub total_copies: Option<i64>,
    /// Defaults to `total_copies`
    #[serde(default)]
    pub available_copies: Option<i64>,
}

impl NewBook {
    pub fn new(title: impl Into<String>, author: impl Into<String>) -> Self {
        NewBook {
            title: title.into(),
            author: author.into(),
            ..Default::default()
        }
    }

    pub fn into_book(self, id: BookId, now: DateTime<Utc>) -> Result<Book> {
        let total_copies = self.total_copies.unwrap_or(1);
        let book = Book {
            id,
            title: required(self.title, "title")?,
            author: required(self.author, "author")?,
            isbn: self.isbn,
            published_year: self.published_year,
            genres: self.genres,
            total_copies,
            available_copies: self.available_copies.unwrap_or(total_copies),
            created_at: now,
            updated_at: now,
        };
        book.validate()?;
        Ok(book)
    }
}

/// Partial update: `None` leaves a field untouched.
///
/// `isbn` and `published_year` are clearable, so they distinguish an absent
/// key (`None`) from an explicit JSON `null` (`Some(None)`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BookPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub isbn: Option<Option<String>>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub published_year: Option<Option<i32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub genres: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_copies: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub available_copies: Option<i64>,
}

impl BookPatch {
    /// Merge the supplied fields over `current` and re-check every invariant.
    pub fn apply(&self, current: &Book, now: DateTime<Utc>) -> Result<Book> {
        let mut book = current.clone();

        if let Some(title) = &self.title {
            book.title = required(title.clone(), "title")?;
        }
        if let Some(author) = &self.author {
            book.author = required(author.clone(), "author")?;
        }
        if let Some(isbn) = &self.isbn {
            book.isbn = isbn.clone();
        }
        if let Some(year) = self.published_year {
            book.published_year = year;
        }
        if let Some(genres) = &self.genres {
            book.genres = genres.clone();
        }
        if let Some(total) = self.total_copies {
            book.total_copies = total;
        }
        if let Some(available) = self.available_copies {
            book.available_copies = available;
        }

        book.validate()?;
        book.updated_at = now;
        Ok(book)
    }

    pub fn is_empty(&self) -> bool {
        *self == BookPatch::default()
    }
}

fn required(value: String, field: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(Error::validation(format!("{} must not be empty", field)));
    }
    Ok(trimmed.to_string())
}

fn present<'de, T, D>(deserializer: D) -> std::result::Result<Option<T>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    T::deserialize(deserializer).map(Some)
}
