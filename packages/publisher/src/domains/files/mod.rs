pub mod models;

pub use models::{File, FileUpsert};
