use anyhow::Result;
use sqlx::{PgConnection, PgPool};

use crate::common::PostId;

/// Link between a post and a tag, keyed by the tag's title
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PostTag;

impl PostTag {
    pub async fn link(post_id: PostId, tag_title: &str, conn: &mut PgConnection) -> sqlx::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO post_tags (post_id, tag_title)
            VALUES ($1, $2)
            ON CONFLICT (post_id, tag_title) DO UPDATE SET updated_at = now()
            "#,
        )
        .bind(post_id)
        .bind(tag_title)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    pub async fn find_titles_for_post(post_id: PostId, pool: &PgPool) -> Result<Vec<String>> {
        sqlx::query_scalar::<_, String>(
            r#"
            SELECT tag_title FROM post_tags
            WHERE post_id = $1 AND deleted_at IS NULL
            ORDER BY tag_title
            "#,
        )
        .bind(post_id)
        .fetch_all(pool)
        .await
        .map_err(Into::into)
    }
}
