pub mod models;
pub mod resolver;

// Re-export commonly used types
pub use models::{Category, CategoryUpsert};
pub use resolver::{CategoryResolver, ResolvedCategories};
