use std::borrow::Borrow;
use std::cmp::Ordering;
use crate::core::types::Book;
use crate::query::types::{SortKey, SortOrder};

/// Case-insensitive substring match against "title author".
pub fn matches_text(book: &Book, needle_lower: &str) -> bool {
    let haystack = format!("{} {}", book.title, book.author).to_lowercase();
    haystack.contains(needle_lower)
}

/// `available` keeps books with copies on the shelf, otherwise the rest.
pub fn matches_availability(book: &Book, available: bool) -> bool {
    book.is_available() == available
}

/// Compare by `key` only. Books without a year sort as year 0.
pub fn compare(a: &Book, b: &Book, key: SortKey) -> Ordering {
    match key {
        SortKey::Title => a.title.to_lowercase().cmp(&b.title.to_lowercase()),
        SortKey::Author => a.author.to_lowercase().cmp(&b.author.to_lowercase()),
        SortKey::Year => a.published_year.unwrap_or(0).cmp(&b.published_year.unwrap_or(0)),
        SortKey::CreatedAt => a.created_at.cmp(&b.created_at),
    }
}

/// Stable sort: equal keys keep their incoming order in both directions.
pub fn sort_books<B: Borrow<Book>>(books: &mut [B], key: SortKey, order: SortOrder) {
    match order {
        SortOrder::Asc => books.sort_by(|a, b| compare(a.borrow(), b.borrow(), key)),
        SortOrder::Desc => books.sort_by(|a, b| compare(b.borrow(), a.borrow(), key)),
    }
}
