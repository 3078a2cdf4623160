use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgPool};

use crate::common::{FileId, PostId, UserId};

/// Longest `original_filename` / `stored_name` the columns accept.
pub const MAX_FILE_NAME_LEN: usize = 255;

/// File - record of an object already uploaded to the object store.
///
/// `stored_uri` is the public (CDN) URL readers fetch; `s3_key` is the
/// object-store key kept for housekeeping.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct File {
    pub id: FileId,
    pub user_id: Option<UserId>,
    pub post_id: Option<PostId>,
    pub content_type: Option<String>,
    pub ext: Option<String>,
    pub original_filename: String,
    pub stored_name: String, // unique per user
    pub s3_key: Option<String>,
    pub stored_uri: String,
    pub file_size: Option<i32>,
    pub is_thumbnail: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct FileUpsert<'a> {
    pub id: FileId,
    pub user_id: UserId,
    pub post_id: PostId,
    pub original_filename: &'a str,
    pub stored_name: &'a str,
    pub stored_uri: &'a str,
    pub s3_key: Option<&'a str>,
    pub content_type: Option<&'a str>,
    pub ext: Option<&'a str>,
    pub file_size: Option<i32>,
    pub is_thumbnail: bool,
}

// =============================================================================
// Writes (join the caller's transaction)
// =============================================================================

impl File {
    /// Insert a file record or update the live (user_id, stored_name) row.
    pub async fn upsert(input: &FileUpsert<'_>, conn: &mut PgConnection) -> sqlx::Result<FileId> {
        sqlx::query_scalar::<_, FileId>(
            r#"
            INSERT INTO files (
                id, user_id, post_id, original_filename, stored_name, stored_uri,
                s3_key, content_type, ext, file_size, is_thumbnail
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (user_id, stored_name) WHERE deleted_at IS NULL DO UPDATE SET
                post_id = EXCLUDED.post_id,
                original_filename = EXCLUDED.original_filename,
                stored_uri = EXCLUDED.stored_uri,
                s3_key = EXCLUDED.s3_key,
                content_type = EXCLUDED.content_type,
                ext = EXCLUDED.ext,
                file_size = EXCLUDED.file_size,
                is_thumbnail = EXCLUDED.is_thumbnail,
                updated_at = now()
            RETURNING id
            "#,
        )
        .bind(input.id)
        .bind(input.user_id)
        .bind(input.post_id)
        .bind(input.original_filename)
        .bind(input.stored_name)
        .bind(input.stored_uri)
        .bind(input.s3_key)
        .bind(input.content_type)
        .bind(input.ext)
        .bind(input.file_size)
        .bind(input.is_thumbnail)
        .fetch_one(&mut *conn)
        .await
    }

    /// Make `file_id` the post's only thumbnail. Passing `None` clears the flag
    /// on every file of the post.
    pub async fn set_thumbnail(
        post_id: PostId,
        file_id: Option<FileId>,
        conn: &mut PgConnection,
    ) -> sqlx::Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE files
            SET is_thumbnail = (id IS NOT DISTINCT FROM $2), updated_at = now()
            WHERE post_id = $1
              AND deleted_at IS NULL
              AND is_thumbnail <> (id IS NOT DISTINCT FROM $2)
            "#,
        )
        .bind(post_id)
        .bind(file_id)
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected())
    }
}

// =============================================================================
// Queries
// =============================================================================

impl File {
    pub async fn find_by_id(id: FileId, pool: &PgPool) -> Result<Option<Self>> {
        sqlx::query_as::<_, File>("SELECT * FROM files WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
            .map_err(Into::into)
    }

    /// Files of a post, thumbnail first then upload order
    pub async fn find_for_post(post_id: PostId, pool: &PgPool) -> Result<Vec<Self>> {
        sqlx::query_as::<_, File>(
            r#"
            SELECT * FROM files
            WHERE post_id = $1 AND deleted_at IS NULL
            ORDER BY is_thumbnail DESC, id
            "#,
        )
        .bind(post_id)
        .fetch_all(pool)
        .await
        .map_err(Into::into)
    }

    pub async fn find_thumbnail(post_id: PostId, pool: &PgPool) -> Result<Option<Self>> {
        sqlx::query_as::<_, File>(
            r#"
            SELECT * FROM files
            WHERE post_id = $1 AND is_thumbnail AND deleted_at IS NULL
            ORDER BY updated_at DESC
            LIMIT 1
            "#,
        )
        .bind(post_id)
        .fetch_optional(pool)
        .await
        .map_err(Into::into)
    }

    pub async fn find_by_s3_key(s3_key: &str, pool: &PgPool) -> Result<Option<Self>> {
        sqlx::query_as::<_, File>(
            "SELECT * FROM files WHERE s3_key = $1 AND deleted_at IS NULL LIMIT 1",
        )
        .bind(s3_key)
        .fetch_optional(pool)
        .await
        .map_err(Into::into)
    }

    pub async fn count_for_user(user_id: UserId, pool: &PgPool) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM files WHERE user_id = $1 AND deleted_at IS NULL",
        )
        .bind(user_id)
        .fetch_one(pool)
        .await?;
        Ok(count)
    }
}
