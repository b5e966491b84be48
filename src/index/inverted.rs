use std::collections::{BTreeSet, HashMap};
use crate::core::types::{Book, BookId, Catalog};
use crate::query::matcher::{matches_availability, matches_text, sort_books};
use crate::query::types::{BookFilter, BookQuery};

/// Lowercased, trimmed form used for author and genre buckets
pub fn normalize(value: &str) -> String {
    value.trim().to_lowercase()
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

/// Inverted indices over one catalog snapshot.
///
/// Built from scratch for every query and thrown away afterwards, so it can
/// never disagree with the records it was built from.
#[derive(Debug, Default)]
pub struct BookIndex {
    pub by_author: HashMap<String, Vec<BookId>>,
    pub by_genre: HashMap<String, Vec<BookId>>,
    pub by_year: HashMap<i32, Vec<BookId>>,
}

impl BookIndex {
    pub fn build(catalog: &Catalog) -> Self {
        let mut index = BookIndex::default();

        for (id, book) in &catalog.books {
            let author = normalize(&book.author);
            if !author.is_empty() {
                index.by_author.entry(author).or_default().push(id.clone());
            }

            // Repeated genres on one book produce repeated entries; candidate
            // sets dedupe them.
            for genre in &book.genres {
                let genre = normalize(genre);
                if !genre.is_empty() {
                    index.by_genre.entry(genre).or_default().push(id.clone());
                }
            }

            if let Some(year) = book.published_year {
                index.by_year.entry(year).or_default().push(id.clone());
            }
        }

        index
    }

    /// Ids satisfying the indexable filters, or `None` when no indexable
    /// filter was given and every record is a candidate.
    pub fn candidates(&self, filter: &BookFilter) -> Option<BTreeSet<&BookId>> {
        let mut candidates: Option<BTreeSet<&BookId>> = None;

        if let Some(author) = non_blank(&filter.author) {
            candidates = Some(narrow(candidates, self.by_author.get(&normalize(author))));
        }
        if let Some(genre) = non_blank(&filter.genre) {
            candidates = Some(narrow(candidates, self.by_genre.get(&normalize(genre))));
        }
        if let Some(year) = filter.year {
            candidates = Some(narrow(candidates, self.by_year.get(&year)));
        }

        candidates
    }

    /// Resolve a list request against `catalog`, which must be the snapshot
    /// this index was built from. Returns the requested page and the number
    /// of matches before pagination.
    pub fn query(&self, catalog: &Catalog, query: &BookQuery) -> (Vec<Book>, usize) {
        let mut items: Vec<&Book> = match self.candidates(&query.filter) {
            Some(ids) => ids.into_iter().filter_map(|id| catalog.books.get(id)).collect(),
            None => catalog.books.values().collect(),
        };

        if let Some(q) = non_blank(&query.filter.q) {
            let needle = normalize(q);
            items.retain(|book| matches_text(book, &needle));
        }
        if let Some(available) = query.filter.available {
            items.retain(|book| matches_availability(book, available));
        }

        sort_books(&mut items, query.sort, query.order);

        let total = items.len();
        let page = items
            .into_iter()
            .skip(query.offset)
            .take(query.limit)
            .cloned()
            .collect();

        (page, total)
    }
}

fn narrow<'a>(current: Option<BTreeSet<&'a BookId>>, bucket: Option<&'a Vec<BookId>>) -> BTreeSet<&'a BookId> {
    let bucket: BTreeSet<&BookId> = bucket.map(|ids| ids.iter().collect()).unwrap_or_default();
    match current {
        Some(current) => current.intersection(&bucket).copied().collect(),
        None => bucket,
    }
}
