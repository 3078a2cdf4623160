// Content Publisher - Core
//
// Publishes posts together with their category path, tags and uploaded files
// into PostgreSQL as one atomic unit. Ids are snowflakes generated in-process.
//
// Domains are organized under domains/*; shared wiring lives in kernel/.

pub mod common;
pub mod config;
pub mod domains;
pub mod kernel;

pub use config::*;
