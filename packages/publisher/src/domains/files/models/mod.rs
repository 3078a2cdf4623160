pub mod file;

pub use file::{File, FileUpsert, MAX_FILE_NAME_LEN};
