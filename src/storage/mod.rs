pub mod layout;
pub mod file_lock;
pub mod atomic;
pub mod backup;
pub mod json_store;

pub use json_store::{JsonStore, Mutation};
