pub mod media;
pub mod slug;

pub use media::*;
pub use slug::*;
