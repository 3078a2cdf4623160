// Publishing domains
pub mod categories;
pub mod files;
pub mod posts;
pub mod publishing;
pub mod tags;
