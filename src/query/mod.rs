pub mod types;
pub mod matcher;
