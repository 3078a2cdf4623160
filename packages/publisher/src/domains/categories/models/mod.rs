pub mod category;

pub use category::{Category, CategoryUpsert, MAX_CATEGORY_TITLE_LEN};
