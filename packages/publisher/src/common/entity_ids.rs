//! Typed ID definitions for all publishing entities.
//!
//! # Example
//!
//! ```rust
//! use publisher_core::common::{CategoryId, PostId};
//!
//! let post_id = PostId::from_i64(1);
//! let category_id = CategoryId::from_i64(2);
//! assert_ne!(post_id.into_i64(), category_id.into_i64());
//!
//! // This would be a compile error:
//! // let wrong: CategoryId = post_id;
//! ```

// Re-export the core Id type
pub use super::id::Id;

// ============================================================================
// Entity marker types
// ============================================================================

/// Marker type for users (owners of posts, categories and files).
pub struct User;

/// Marker type for Post entities (root posts and comments).
pub struct Post;

/// Marker type for Category entities (per-user forest).
pub struct Category;

/// Marker type for Tag entities.
pub struct Tag;

/// Marker type for File entities (uploaded thumbnails and images).
pub struct File;

// ============================================================================
// Type aliases - the primary API
// ============================================================================

/// Typed ID for users.
pub type UserId = Id<User>;

/// Typed ID for Post entities.
pub type PostId = Id<Post>;

/// Typed ID for Category entities.
pub type CategoryId = Id<Category>;

/// Typed ID for Tag entities.
pub type TagId = Id<Tag>;

/// Typed ID for File entities.
pub type FileId = Id<File>;
