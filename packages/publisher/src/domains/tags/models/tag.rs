use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgPool};

use crate::common::{PostId, TagId};

/// Longest title the `tags.title` column accepts.
pub const MAX_TAG_TITLE_LEN: usize = 50;

/// Tag - a flat label shared by all owners, keyed by its title
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Tag {
    pub id: TagId,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Tag {
    /// Insert a tag or touch the existing one. `id` is only used when the
    /// title is new. Returns the title, which is what post_tags references.
    pub async fn upsert(title: &str, id: TagId, conn: &mut PgConnection) -> sqlx::Result<String> {
        sqlx::query_scalar::<_, String>(
            r#"
            INSERT INTO tags (id, title)
            VALUES ($1, $2)
            ON CONFLICT (title) DO UPDATE SET updated_at = now()
            RETURNING title
            "#,
        )
        .bind(id)
        .bind(title)
        .fetch_one(&mut *conn)
        .await
    }

    pub async fn find_by_title(title: &str, pool: &PgPool) -> Result<Option<Self>> {
        sqlx::query_as::<_, Tag>("SELECT * FROM tags WHERE title = $1")
            .bind(title)
            .fetch_optional(pool)
            .await
            .map_err(Into::into)
    }

    /// Tags linked to a post, alphabetically
    pub async fn find_for_post(post_id: PostId, pool: &PgPool) -> Result<Vec<Self>> {
        sqlx::query_as::<_, Tag>(
            r#"
            SELECT t.* FROM tags t
            INNER JOIN post_tags pt ON pt.tag_title = t.title
            WHERE pt.post_id = $1 AND pt.deleted_at IS NULL
            ORDER BY t.title
            "#,
        )
        .bind(post_id)
        .fetch_all(pool)
        .await
        .map_err(Into::into)
    }
}
