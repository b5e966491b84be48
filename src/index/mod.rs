pub mod inverted;

pub use inverted::BookIndex;
