pub mod models;

pub use models::{Post, PostCategory, PostStatus, PostTag, PostUpsert};
