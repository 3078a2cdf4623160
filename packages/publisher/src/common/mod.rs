// Common types and utilities shared across the publishing domains

pub mod entity_ids;
pub mod id;
pub mod snowflake;
pub mod utils;

pub use entity_ids::*;
pub use id::Id;
pub use snowflake::{Clock, IdError, IdParts, SnowflakeGenerator, SystemClock};
