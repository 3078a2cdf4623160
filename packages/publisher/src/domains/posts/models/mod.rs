pub mod post;
pub mod post_category;
pub mod post_tag;

pub use post::*;
pub use post_category::PostCategory;
pub use post_tag::PostTag;
