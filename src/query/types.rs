use serde::{Deserialize, Serialize};
use crate::core::error::{Error, Result};

pub const DEFAULT_LIMIT: usize = 20;
pub const MAX_LIMIT: usize = 100;

/// Sort order for query results
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,   // Ascending: 0 → 9, A → Z
    Desc,  // Descending: 9 → 0, Z → A
}

impl SortOrder {
    pub fn parse(raw: &str) -> Result<Self> {
        match raw {
            "asc" => Ok(SortOrder::Asc),
            "desc" => Ok(SortOrder::Desc),
            other => Err(Error::validation(format!("order must be asc or desc, got {:?}", other))),
        }
    }
}

/// Field to sort by
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", from = "String")]
pub enum SortKey {
    Title,
    Author,
    Year,
    #[default]
    CreatedAt,
}

impl SortKey {
    /// Unknown keys sort by creation time.
    pub fn parse(raw: &str) -> Self {
        match raw {
            "title" => SortKey::Title,
            "author" => SortKey::Author,
            "year" => SortKey::Year,
            _ => SortKey::CreatedAt,
        }
    }
}

impl From<String> for SortKey {
    fn from(raw: String) -> Self {
        SortKey::parse(&raw)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BookFilter {
    /// Case-insensitive substring of "title author"
    pub q: Option<String>,
    pub author: Option<String>,
    pub genre: Option<String>,
    pub year: Option<i32>,
    pub available: Option<bool>,
}

impl BookFilter {
    pub fn text(mut self, q: impl Into<String>) -> Self {
        self.q = Some(q.into());
        self
    }

    pub fn author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    pub fn genre(mut self, genre: impl Into<String>) -> Self {
        self.genre = Some(genre.into());
        self
    }

    pub fn year(mut self, year: i32) -> Self {
        self.year = Some(year);
        self
    }

    pub fn available(mut self, available: bool) -> Self {
        self.available = Some(available);
        self
    }
}

/// Filter, sort and pagination for a list request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BookQuery {
    #[serde(flatten)]
    pub filter: BookFilter,
    pub sort: SortKey,
    pub order: SortOrder,
    pub limit: usize,
    pub offset: usize,
}

impl Default for BookQuery {
    fn default() -> Self {
        BookQuery {
            filter: BookFilter::default(),
            sort: SortKey::default(),
            order: SortOrder::default(),
            limit: DEFAULT_LIMIT,
            offset: 0,
        }
    }
}

impl BookQuery {
    pub fn new(filter: BookFilter) -> Self {
        BookQuery { filter, ..Default::default() }
    }

    pub fn sorted(mut self, sort: SortKey, order: SortOrder) -> Self {
        self.sort = sort;
        self.order = order;
        self
    }

    pub fn page(mut self, limit: usize, offset: usize) -> Self {
        self.limit = limit;
        self.offset = offset;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.limit == 0 || self.limit > MAX_LIMIT {
            return Err(Error::validation(format!(
                "limit must be between 1 and {}, got {}",
                MAX_LIMIT, self.limit
            )));
        }
        Ok(())
    }
}

/// One page of results plus the unpaginated match count
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
}
