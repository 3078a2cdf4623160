//! Publication input and its pure preparation step.
//!
//! Everything here runs before a connection is taken from the pool: a payload
//! that fails preparation never causes a write.

use serde::{Deserialize, Deserializer, Serialize};
use tracing::warn;

use crate::common::utils::{
    file_extension, generate_slug, image_content_type, is_valid_slug, MAX_EXT_LEN,
};
use crate::common::UserId;
use crate::domains::categories::CategoryResolver;
use crate::domains::files::models::MAX_FILE_NAME_LEN;
use crate::domains::posts::models::{
    PostStatus, MAX_META_DESCRIPTION_LEN, MAX_META_TITLE_LEN, MAX_OG_IMAGE_ALT_LEN, MAX_TITLE_LEN,
};

use super::content::rewrite_asset_links;
use super::error::PublishError;

/// An asset the upload step already put into the object store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedAsset {
    /// Path or name the author used for the file locally.
    pub local_reference: String,
    pub original_filename: String,
    /// Unique-per-owner name the asset was stored under.
    pub stored_name: String,
    /// Public (CDN) URL readers fetch.
    pub object_store_uri: String,
    #[serde(default)]
    pub object_store_key: Option<String>,
    #[serde(default)]
    pub file_size: Option<i64>,
    #[serde(default)]
    pub is_thumbnail: bool,
}

/// Column values derived from an asset that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetMetadata {
    pub ext: String,
    pub content_type: &'static str,
    pub file_size: Option<i32>,
}

impl UploadedAsset {
    /// Check that the asset can be recorded. The error is a human readable
    /// reason suitable for an asset warning.
    pub fn validate(&self) -> Result<AssetMetadata, String> {
        let ext = file_extension(&self.local_reference)
            .or_else(|| file_extension(&self.original_filename))
            .ok_or_else(|| "file has no extension".to_string())?;

        if ext.len() > MAX_EXT_LEN {
            return Err(format!("extension exceeds {} characters", MAX_EXT_LEN));
        }
        let content_type = image_content_type(&ext)
            .ok_or_else(|| format!("unsupported file type \".{}\"", ext))?;

        if !(self.object_store_uri.starts_with("https://")
            || self.object_store_uri.starts_with("http://"))
        {
            return Err(format!(
                "object store URI \"{}\" is not an http(s) URL",
                self.object_store_uri
            ));
        }

        for (field, value) in [
            ("stored_name", &self.stored_name),
            ("original_filename", &self.original_filename),
        ] {
            if value.trim().is_empty() {
                return Err(format!("{} is empty", field));
            }
            if value.chars().count() > MAX_FILE_NAME_LEN {
                return Err(format!("{} exceeds {} characters", field, MAX_FILE_NAME_LEN));
            }
        }

        let file_size = self
            .file_size
            .map(|size| {
                i32::try_from(size).map_err(|_| format!("file size {} out of range", size))
            })
            .transpose()?;

        Ok(AssetMetadata {
            ext: ext.to_ascii_lowercase(),
            content_type,
            file_size,
        })
    }
}

/// What a caller hands the publisher.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PublicationPayload {
    /// Owner; falls back to the configured default owner when absent.
    #[serde(default)]
    pub user_id: Option<UserId>,
    /// Owner's public handle, only used to build `published_url`.
    #[serde(default)]
    pub username: Option<String>,
    /// Display name; slugified into the handle when `username` is absent.
    #[serde(default)]
    pub author: Option<String>,
    pub title: String,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default, alias = "summary")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "lenient_status")]
    pub status: PostStatus,
    #[serde(default)]
    pub meta_title: Option<String>,
    #[serde(default)]
    pub meta_description: Option<String>,
    #[serde(default)]
    pub og_image_url: Option<String>,
    #[serde(default)]
    pub og_image_alt: Option<String>,
    /// Category path, root first.
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub thumbnail: Option<UploadedAsset>,
    #[serde(default)]
    pub images: Vec<UploadedAsset>,
}

/// A validated payload with every default applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedPublication {
    pub user_id: UserId,
    pub username: Option<String>,
    pub slug: String,
    pub title: String,
    pub content: Option<String>,
    pub description: Option<String>,
    pub status: PostStatus,
    pub meta_title: Option<String>,
    pub meta_description: Option<String>,
    pub og_image_url: Option<String>,
    pub og_image_alt: Option<String>,
    pub categories: Vec<String>,
    /// Trimmed, non-empty, first occurrence wins.
    pub tags: Vec<String>,
    /// Thumbnail first (flagged), then images in payload order (unflagged).
    pub assets: Vec<UploadedAsset>,
}

impl PublicationPayload {
    /// Validate the payload and apply defaults. Performs no I/O.
    pub fn prepare(self, default_user: UserId) -> Result<PreparedPublication, PublishError> {
        let user_id = self.user_id.unwrap_or(default_user);
        if user_id.into_i64() <= 0 {
            return Err(PublishError::validation(format!(
                "user_id must be positive, got {}",
                user_id
            )));
        }

        let title = self.title.trim().to_string();
        if title.is_empty() {
            return Err(PublishError::validation("title is empty"));
        }
        check_len("title", &title, MAX_TITLE_LEN)?;

        let slug = match self.slug.as_deref().map(str::trim) {
            Some(slug) if !slug.is_empty() => {
                if !is_valid_slug(slug) {
                    return Err(PublishError::validation(format!(
                        "slug \"{}\" must be lowercase letters, digits, '-' or '_'",
                        slug
                    )));
                }
                slug.to_string()
            }
            _ => generate_slug(&title),
        };

        // Explicit SEO values are validated; derived ones are cut to fit
        let description = non_empty(self.description);
        let meta_title = match non_empty(self.meta_title) {
            Some(value) => {
                check_len("meta_title", &value, MAX_META_TITLE_LEN)?;
                value
            }
            None => truncate_chars(&title, MAX_META_TITLE_LEN),
        };
        let meta_description = match non_empty(self.meta_description) {
            Some(value) => {
                check_len("meta_description", &value, MAX_META_DESCRIPTION_LEN)?;
                Some(value)
            }
            None => description
                .as_deref()
                .map(|text| truncate_chars(text, MAX_META_DESCRIPTION_LEN)),
        };
        let og_image_alt = match non_empty(self.og_image_alt) {
            Some(value) => {
                check_len("og_image_alt", &value, MAX_OG_IMAGE_ALT_LEN)?;
                value
            }
            None => truncate_chars(&format!("{} thumbnail", title), MAX_OG_IMAGE_ALT_LEN),
        };

        let username = non_empty(self.username).or_else(|| {
            non_empty(self.author).map(|author| author.to_lowercase().replace(' ', "-"))
        });

        let categories = CategoryResolver::normalize_path(&self.categories)?;

        let mut tags: Vec<String> = Vec::with_capacity(self.tags.len());
        for tag in &self.tags {
            let tag = tag.trim();
            if !tag.is_empty() && !tags.iter().any(|seen| seen == tag) {
                tags.push(tag.to_string());
            }
        }

        // An image flagged as thumbnail stands in when the slot is empty
        let mut images = self.images;
        let thumbnail = match self.thumbnail {
            Some(thumbnail) => Some(thumbnail),
            None => images
                .iter()
                .position(|image| image.is_thumbnail)
                .map(|index| images.remove(index)),
        };

        let mut assets = Vec::with_capacity(images.len() + 1);
        if let Some(thumbnail) = &thumbnail {
            assets.push(UploadedAsset {
                is_thumbnail: true,
                ..thumbnail.clone()
            });
        }
        assets.extend(images.into_iter().map(|image| UploadedAsset {
            is_thumbnail: false,
            ..image
        }));

        let content = self
            .content
            .map(|content| rewrite_asset_links(&content, &assets));

        let og_image_url = non_empty(self.og_image_url).or_else(|| {
            thumbnail
                .as_ref()
                .map(|thumbnail| thumbnail.object_store_uri.clone())
                .filter(|uri| !uri.is_empty())
        });

        Ok(PreparedPublication {
            user_id,
            username,
            slug,
            title,
            content,
            description,
            status: self.status,
            meta_title: Some(meta_title),
            meta_description,
            og_image_url,
            og_image_alt: Some(og_image_alt),
            categories,
            tags,
            assets,
        })
    }
}

/// Unknown or misspelled statuses publish as `Public` instead of failing
/// the whole payload.
fn lenient_status<'de, D>(deserializer: D) -> Result<PostStatus, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(raw) = Option::<String>::deserialize(deserializer)? else {
        return Ok(PostStatus::default());
    };
    Ok(raw.parse().unwrap_or_else(|_| {
        warn!(status = %raw, "Invalid post status, publishing as public");
        PostStatus::Public
    }))
}

fn truncate_chars(value: &str, max: usize) -> String {
    match value.char_indices().nth(max) {
        Some((cut, _)) => value[..cut].trim_end().to_string(),
        None => value.to_string(),
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn check_len(field: &str, value: &str, max: usize) -> Result<(), PublishError> {
    let len = value.chars().count();
    if len > max {
        return Err(PublishError::validation(format!(
            "{} is {} characters, max {}",
            field, len, max
        )));
    }
    Ok(())
}
