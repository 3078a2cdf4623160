pub mod models;

pub use models::Tag;
