pub mod tag;

pub use tag::{Tag, MAX_TAG_TITLE_LEN};
