//! Test fixtures for building payloads and inspecting stored rows.

use anyhow::Result;
use publisher_core::common::UserId;
use publisher_core::domains::publishing::{PublicationPayload, UploadedAsset};
use sqlx::PgPool;

pub const CDN: &str = "https://cdn.example.com";

/// An uploaded image as the upload step reports it
pub fn uploaded(owner: UserId, slug: &str, file_name: &str) -> UploadedAsset {
    let stored_name = format!("{}-{}", slug, file_name);
    UploadedAsset {
        local_reference: format!("./posts/{}/{}", slug, file_name),
        original_filename: file_name.to_string(),
        stored_name: stored_name.clone(),
        object_store_uri: format!("{}/{}/{}/{}", CDN, owner, slug, stored_name),
        object_store_key: Some(format!("{}/{}/{}", owner, slug, stored_name)),
        file_size: Some(2048),
        is_thumbnail: false,
    }
}

/// Minimal payload with a category path and no assets
pub fn payload(owner: UserId, slug: &str, categories: &[&str]) -> PublicationPayload {
    PublicationPayload {
        user_id: Some(owner),
        username: Some(format!("author{}", owner)),
        title: format!("Post {}", slug),
        slug: Some(slug.to_string()),
        content: Some(format!("# {}\n\nBody text.", slug)),
        categories: categories.iter().map(|c| c.to_string()).collect(),
        ..Default::default()
    }
}

/// Tag titles are global, so tests scope them to their owner.
pub fn tag(owner: UserId, name: &str) -> String {
    format!("{}-{}", name, owner.into_i64() % 1_000_000_000)
}

/// Row counts for one owner across every publishing table
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct OwnerRows {
    pub posts: i64,
    pub categories: i64,
    pub files: i64,
    pub post_categories: i64,
    pub post_tags: i64,
}

pub async fn owner_rows(owner: UserId, pool: &PgPool) -> Result<OwnerRows> {
    let (posts, categories, files, post_categories, post_tags) =
        sqlx::query_as::<_, (i64, i64, i64, i64, i64)>(
            r#"
            SELECT
                (SELECT COUNT(*) FROM posts WHERE user_id = $1),
                (SELECT COUNT(*) FROM categories WHERE user_id = $1),
                (SELECT COUNT(*) FROM files WHERE user_id = $1),
                (SELECT COUNT(*) FROM post_categories pc
                    JOIN posts p ON p.id = pc.post_id WHERE p.user_id = $1),
                (SELECT COUNT(*) FROM post_tags pt
                    JOIN posts p ON p.id = pt.post_id WHERE p.user_id = $1)
            "#,
        )
        .bind(owner)
        .fetch_one(pool)
        .await?;

    Ok(OwnerRows {
        posts,
        categories,
        files,
        post_categories,
        post_tags,
    })
}

pub async fn count_tags(titles: &[String], pool: &PgPool) -> Result<i64> {
    let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM tags WHERE title = ANY($1)")
        .bind(titles)
        .fetch_one(pool)
        .await?;
    Ok(count)
}
