pub mod schemas;
pub mod books;

pub use books::BooksService;
pub use schemas::{BookPatch, NewBook};
