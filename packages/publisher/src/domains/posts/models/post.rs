use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgPool};

use crate::common::{CategoryId, PostId, SnowflakeGenerator, UserId};

/// Post - a published article (level 0) or a reply in its thread (level >= 1)
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Post {
    pub id: PostId,

    // Thread structure: root posts have group_id = id and no parent
    pub group_id: Option<PostId>,
    pub level: i32,
    pub parent_id: Option<PostId>,
    pub priority: i32,

    // Content
    pub slug: String,
    pub title: String,
    pub content: Option<String>,
    pub description: Option<String>,
    pub category_id: Option<CategoryId>, // deepest category of the resolved path
    pub status: PostStatus,

    // SEO
    pub meta_title: Option<String>,
    pub meta_description: Option<String>,
    pub og_image_url: Option<String>,
    pub og_image_alt: Option<String>,

    pub user_id: UserId,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

// =============================================================================
// Enums for type-safe edges
// =============================================================================

/// Post visibility
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "post_status", rename_all = "snake_case")]
pub enum PostStatus {
    #[default]
    Public,
    Private,
    Follower,
}

impl std::fmt::Display for PostStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PostStatus::Public => write!(f, "public"),
            PostStatus::Private => write!(f, "private"),
            PostStatus::Follower => write!(f, "follower"),
        }
    }
}

impl std::str::FromStr for PostStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "public" => Ok(PostStatus::Public),
            "private" => Ok(PostStatus::Private),
            "follower" => Ok(PostStatus::Follower),
            _ => Err(anyhow::anyhow!("Invalid post status: {}", s)),
        }
    }
}

/// Column limits enforced before any write
pub const MAX_TITLE_LEN: usize = 255;
pub const MAX_META_TITLE_LEN: usize = 70;
pub const MAX_META_DESCRIPTION_LEN: usize = 170;
pub const MAX_OG_IMAGE_ALT_LEN: usize = 125;

/// Values written by a publication. `id` is only used when the
/// (user_id, slug) row does not exist yet.
#[derive(Debug, Clone)]
pub struct PostUpsert<'a> {
    pub id: PostId,
    pub user_id: UserId,
    pub slug: &'a str,
    pub title: &'a str,
    pub content: Option<&'a str>,
    pub description: Option<&'a str>,
    pub category_id: Option<CategoryId>,
    pub status: PostStatus,
    pub meta_title: Option<&'a str>,
    pub meta_description: Option<&'a str>,
    pub og_image_url: Option<&'a str>,
    pub og_image_alt: Option<&'a str>,
}

// =============================================================================
// Writes (join the caller's transaction)
// =============================================================================

impl Post {
    /// Insert a root post or update the live (user_id, slug) row in place.
    /// Returns the id of the surviving row.
    pub async fn upsert(input: &PostUpsert<'_>, conn: &mut PgConnection) -> sqlx::Result<PostId> {
        sqlx::query_scalar::<_, PostId>(
            r#"
            INSERT INTO posts (
                id, group_id, level, parent_id, user_id, title, slug, content, description,
                category_id, status, meta_title, meta_description, og_image_url, og_image_alt
            )
            VALUES ($1, $1, 0, NULL, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (user_id, slug) WHERE deleted_at IS NULL DO UPDATE SET
                title = EXCLUDED.title,
                content = EXCLUDED.content,
                description = EXCLUDED.description,
                category_id = EXCLUDED.category_id,
                status = EXCLUDED.status,
                meta_title = EXCLUDED.meta_title,
                meta_description = EXCLUDED.meta_description,
                og_image_url = EXCLUDED.og_image_url,
                og_image_alt = EXCLUDED.og_image_alt,
                updated_at = now()
            RETURNING id
            "#,
        )
        .bind(input.id)
        .bind(input.user_id)
        .bind(input.title)
        .bind(input.slug)
        .bind(input.content)
        .bind(input.description)
        .bind(input.category_id)
        .bind(input.status)
        .bind(input.meta_title)
        .bind(input.meta_description)
        .bind(input.og_image_url)
        .bind(input.og_image_alt)
        .fetch_one(&mut *conn)
        .await
    }

    /// Reply to a post or comment. Thread position is derived from the parent.
    pub async fn create_comment(
        user_id: UserId,
        parent_id: PostId,
        title: &str,
        content: &str,
        slug: Option<&str>,
        ids: &SnowflakeGenerator,
        pool: &PgPool,
    ) -> Result<Self> {
        let parent = Self::find_by_id(parent_id, pool)
            .await?
            .with_context(|| format!("Parent post {} not found", parent_id))?;

        let id: PostId = ids.next()?;
        let slug = slug
            .map(str::to_string)
            .unwrap_or_else(|| format!("comment-{}", id));

        let comment = sqlx::query_as::<_, Post>(
            r#"
            INSERT INTO posts (id, group_id, level, parent_id, user_id, title, slug, content, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 'public')
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(parent.group_id.unwrap_or(parent.id))
        .bind(parent.level + 1)
        .bind(parent.id)
        .bind(user_id)
        .bind(title)
        .bind(slug)
        .bind(content)
        .fetch_one(pool)
        .await?;

        Ok(comment)
    }
}

// =============================================================================
// Queries
// =============================================================================

impl Post {
    pub async fn find_by_id(id: PostId, pool: &PgPool) -> Result<Option<Self>> {
        sqlx::query_as::<_, Post>("SELECT * FROM posts WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
            .map_err(Into::into)
    }

    /// Find the live post an owner published under `slug`
    pub async fn find_by_slug(user_id: UserId, slug: &str, pool: &PgPool) -> Result<Option<Self>> {
        sqlx::query_as::<_, Post>(
            "SELECT * FROM posts WHERE user_id = $1 AND slug = $2 AND deleted_at IS NULL",
        )
        .bind(user_id)
        .bind(slug)
        .fetch_optional(pool)
        .await
        .map_err(Into::into)
    }

    /// Root posts of a user, newest first
    pub async fn find_by_user(
        user_id: UserId,
        status: Option<PostStatus>,
        limit: i64,
        offset: i64,
        pool: &PgPool,
    ) -> Result<Vec<Self>> {
        sqlx::query_as::<_, Post>(
            r#"
            SELECT * FROM posts
            WHERE user_id = $1
              AND level = 0
              AND deleted_at IS NULL
              AND ($2::post_status IS NULL OR status = $2)
            ORDER BY created_at DESC, id DESC
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(user_id)
        .bind(status)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await
        .map_err(Into::into)
    }

    /// Root posts whose primary category is `category_id`
    pub async fn find_by_category(
        category_id: CategoryId,
        limit: i64,
        offset: i64,
        pool: &PgPool,
    ) -> Result<Vec<Self>> {
        sqlx::query_as::<_, Post>(
            r#"
            SELECT * FROM posts
            WHERE category_id = $1 AND level = 0 AND deleted_at IS NULL
            ORDER BY created_at DESC, id DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(category_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await
        .map_err(Into::into)
    }

    /// Replies in a thread, oldest first
    pub async fn find_comments(root_id: PostId, pool: &PgPool) -> Result<Vec<Self>> {
        sqlx::query_as::<_, Post>(
            r#"
            SELECT * FROM posts
            WHERE group_id = $1 AND id <> $1 AND deleted_at IS NULL
            ORDER BY created_at, id
            "#,
        )
        .bind(root_id)
        .fetch_all(pool)
        .await
        .map_err(Into::into)
    }

    pub async fn count_by_user(user_id: UserId, pool: &PgPool) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM posts WHERE user_id = $1 AND level = 0 AND deleted_at IS NULL",
        )
        .bind(user_id)
        .fetch_one(pool)
        .await?;
        Ok(count)
    }
}
