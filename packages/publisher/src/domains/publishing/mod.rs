//! Publishing domain: turns a payload into committed post, category, tag and
//! file rows inside one transaction.

pub mod activities;
pub mod content;
pub mod error;
pub mod payload;
pub mod transaction;

pub use activities::{dry_run, publish};
pub use error::{is_transient, AssetKind, AssetWarning, CategoryPosition, PublishError};
pub use payload::{AssetMetadata, PreparedPublication, PublicationPayload, UploadedAsset};
pub use transaction::{Publication, PublicationResult, PublicationState};
